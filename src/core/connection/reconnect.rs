//! Retry policy applied after a TCP session closes unexpectedly.

use crate::domain::config::{ConnectionConfig, TransportConfig};
use std::time::Duration;

/// How often and how many times to retry a lost connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Policy for `config`, or `None` when it must not reconnect.
    /// Serial sessions never reconnect automatically.
    ///
    /// NOTE: `max_reconnect_attempts == 0` means unlimited retries, not
    /// "never retry". Use `auto_reconnect = false` to disable.
    pub fn from_config(config: &ConnectionConfig) -> Option<Self> {
        match &config.transport {
            TransportConfig::Tcp(tcp) if tcp.auto_reconnect => Some(Self {
                interval: tcp.reconnect_interval(),
                max_attempts: match tcp.max_reconnect_attempts {
                    0 => None,
                    n => Some(n),
                },
            }),
            _ => None,
        }
    }

    /// Whether the 1-based `attempt` may run
    pub fn allows(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt <= max,
            None => true,
        }
    }
}
