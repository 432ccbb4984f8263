use crate::core::connection::state::ConnectionStatus;
use crate::core::message::TerminalMessage;
use crate::infrastructure::transport::ReadEvent;
use serde::Serialize;

/// Notifications broadcast to every subscriber of a connection manager
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ConnectionEvent {
    /// A chunk arrived from the device and was appended to the log
    MessageReceived { message: TerminalMessage },
    /// The manager moved to a new status
    StatusChanged {
        status: ConnectionStatus,
        detail: Option<String>,
    },
}

impl ConnectionEvent {
    pub fn status(status: ConnectionStatus, detail: Option<String>) -> Self {
        ConnectionEvent::StatusChanged { status, detail }
    }

    /// Status carried by a `StatusChanged` event
    pub fn as_status(&self) -> Option<&ConnectionStatus> {
        match self {
            ConnectionEvent::StatusChanged { status, .. } => Some(status),
            ConnectionEvent::MessageReceived { .. } => None,
        }
    }
}

/// Work item for a manager's event processor
#[derive(Debug)]
pub(crate) enum ProcessorInput {
    /// Output of a read loop, tagged with its session generation
    Read { session: u64, event: ReadEvent },
    /// A payload that was written, or failed to be
    Sent(TerminalMessage),
    Shutdown,
}
