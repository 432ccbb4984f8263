//! TermLink Library
//!
//! Terminal session core for embedded devices: one serial or TCP
//! connection at a time, a bounded message log, command history,
//! automatic TCP reconnect and export of the captured traffic.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::core::connection::{ConnectionEvent, ConnectionManager, ConnectionStatus, ManagerOptions};
pub use crate::core::message::{MessageDirection, TerminalMessage};
pub use domain::config::{ConnectionConfig, SerialConfig, TcpConfig, TermLinkConfig};
pub use domain::error::{ConnectionError, TermLinkError, TermLinkResult, TransportError};
