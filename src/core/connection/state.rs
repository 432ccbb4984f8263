use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection status enumeration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No transport is open
    #[default]
    Disconnected,
    /// Opening, or waiting to reopen after an unexpected close
    Connecting,
    /// Transport is open and the reader is running
    Connected,
    /// Transient failure state; always followed by `Disconnected`
    Error(String),
}

impl ConnectionStatus {
    /// Whether moving from `self` to `next` is a legal edge of the
    /// connection state machine
    pub fn can_transition_to(&self, next: &ConnectionStatus) -> bool {
        use ConnectionStatus::*;

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error(_))
                | (Connecting, Disconnected)
                | (Connected, Connecting)
                | (Connected, Error(_))
                | (Connected, Disconnected)
                | (Error(_), Disconnected)
        )
    }

    /// True while a session is open or being established
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Connected)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error(_) => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Error(reason) => write!(f, "error: {}", reason),
            other => write!(f, "{}", other.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error() -> ConnectionStatus {
        ConnectionStatus::Error("boom".into())
    }

    #[test]
    fn test_allowed_edges() {
        use ConnectionStatus::*;

        assert!(Disconnected.can_transition_to(&Connecting));
        assert!(Connecting.can_transition_to(&Connected));
        assert!(Connecting.can_transition_to(&error()));
        assert!(Connected.can_transition_to(&Connecting));
        assert!(Connected.can_transition_to(&Disconnected));
        assert!(error().can_transition_to(&Disconnected));
    }

    #[test]
    fn test_rejected_edges() {
        use ConnectionStatus::*;

        assert!(!Disconnected.can_transition_to(&Connected));
        assert!(!Disconnected.can_transition_to(&error()));
        assert!(!Disconnected.can_transition_to(&Disconnected));
        assert!(!error().can_transition_to(&Connected));
        assert!(!error().can_transition_to(&Connecting));
        assert!(!Connected.can_transition_to(&Connected));
    }

    #[test]
    fn test_display_and_serde() {
        assert_eq!(error().to_string(), "error: boom");
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");

        let json = serde_json::to_string(&error()).unwrap();
        assert_eq!(json, r#"{"state":"error","reason":"boom"}"#);
        let json = serde_json::to_string(&ConnectionStatus::Connecting).unwrap();
        assert_eq!(json, r#"{"state":"connecting"}"#);
    }
}
