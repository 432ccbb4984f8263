// Core module - session core: codec, histories and the connection manager
pub mod buffer;
pub mod codec;
pub mod command_history;
pub mod connection;
pub mod export;
pub mod message;
pub mod message_log;

pub use codec::{DisplayMode, InputMode, LineEnding};
pub use command_history::CommandHistory;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionStatus, ManagerOptions};
pub use export::{ExportFormat, ExportOptions};
pub use message::{MessageDirection, MessageQuery, TerminalMessage};
pub use message_log::MessageLog;
