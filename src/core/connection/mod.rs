// Connection module - session lifecycle, events and reconnect policy
pub mod events;
pub mod manager;
pub mod reconnect;
pub mod state;

pub use events::ConnectionEvent;
pub use manager::{ConnectionManager, ManagerOptions};
pub use reconnect::ReconnectPolicy;
pub use state::ConnectionStatus;
