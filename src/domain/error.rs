use serde::Serialize;
use thiserror::Error;

/// Failures raised by a transport while opening or driving a channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Network timeout connecting to {0}")]
    NetworkTimeout(String),

    #[error("Address in use: {0}")]
    AddressInUse(String),

    #[error("Failed to open transport: {0}")]
    OpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Connection closed unexpectedly: {0}")]
    UnexpectedClose(String),
}

impl TransportError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::PortNotFound(_) => "port_not_found",
            TransportError::PermissionDenied(_) => "permission_denied",
            TransportError::NetworkTimeout(_) => "network_timeout",
            TransportError::AddressInUse(_) => "address_in_use",
            TransportError::OpenFailed(_) => "open_failed",
            TransportError::ReadFailed(_) => "read_failed",
            TransportError::WriteFailed(_) => "write_failed",
            TransportError::UnexpectedClose(_) => "unexpected_close",
        }
    }

    /// True for errors raised while establishing the channel
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            TransportError::PortNotFound(_)
                | TransportError::PermissionDenied(_)
                | TransportError::NetworkTimeout(_)
                | TransportError::AddressInUse(_)
                | TransportError::OpenFailed(_)
        )
    }

    /// Map a socket level error raised during open
    pub fn from_connect_io(target: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => TransportError::NetworkTimeout(target.to_string()),
            std::io::ErrorKind::AddrInUse => TransportError::AddressInUse(target.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                TransportError::PermissionDenied(format!("{}: {}", target, err))
            }
            _ => TransportError::OpenFailed(format!("{}: {}", target, err)),
        }
    }
}

/// Errors surfaced by the connection manager
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("A connection is already active")]
    AlreadyConnected,

    #[error("Device not connected")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Reconnect gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Connect cancelled by disconnect")]
    Cancelled,

    #[error("Connection manager has shut down")]
    Shutdown,
}

impl ConnectionError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionError::Configuration(_) => "configuration",
            ConnectionError::AlreadyConnected => "already_connected",
            ConnectionError::NotConnected => "not_connected",
            ConnectionError::Transport(e) => e.kind(),
            ConnectionError::ReconnectExhausted { .. } => "reconnect_exhausted",
            ConnectionError::Cancelled => "cancelled",
            ConnectionError::Shutdown => "shutdown",
        }
    }

    /// Kind plus human-readable detail, for handing to an outer UI
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            kind: self.kind().to_string(),
            detail: self.to_string(),
        }
    }
}

/// Serializable error summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub detail: String,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Application level error used by the binary and config layer
#[derive(Error, Debug)]
pub enum TermLinkError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(String),
}

pub type TermLinkResult<T> = Result<T, TermLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_kinds() {
        assert_eq!(TransportError::PortNotFound("COM9".into()).kind(), "port_not_found");
        assert!(TransportError::NetworkTimeout("h:1".into()).is_open_error());
        assert!(!TransportError::UnexpectedClose("eof".into()).is_open_error());
    }

    #[test]
    fn test_connect_io_mapping() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(
            TransportError::from_connect_io("10.0.0.1:23", &err),
            TransportError::NetworkTimeout("10.0.0.1:23".into())
        );

        let err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
        assert!(matches!(
            TransportError::from_connect_io("x", &err),
            TransportError::AddressInUse(_)
        ));

        let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nope");
        assert!(matches!(
            TransportError::from_connect_io("x", &err),
            TransportError::OpenFailed(_)
        ));
    }

    #[test]
    fn test_connection_error_info() {
        let err = ConnectionError::from(TransportError::WriteFailed("broken pipe".into()));
        let info = err.info();
        assert_eq!(info.kind, "write_failed");
        assert!(info.detail.contains("broken pipe"));

        let err = ConnectionError::ReconnectExhausted { attempts: 2 };
        assert_eq!(err.kind(), "reconnect_exhausted");
        assert!(err.to_string().contains('2'));
    }
}
