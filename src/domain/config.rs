use crate::core::codec::{DisplayMode, InputMode, LineEnding};
use crate::domain::error::ConnectionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TermLink configuration file contents
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TermLinkConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
    /// Saved connection profiles
    #[serde(default)]
    pub profiles: Vec<ConnectionConfig>,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Maximum number of messages kept in memory
    #[serde(default = "default_message_log_capacity")]
    pub message_log_capacity: usize,
    /// Maximum number of commands kept in the history
    #[serde(default = "default_command_history_capacity")]
    pub command_history_capacity: usize,
    /// Line ending appended to interactive input
    #[serde(default)]
    pub line_ending: LineEnding,
    /// How interactive input is interpreted
    #[serde(default)]
    pub input_mode: InputMode,
    /// How received data is rendered
    #[serde(default)]
    pub display_mode: DisplayMode,
}

/// A connection the core can open
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    pub id: String,
    pub name: String,
    pub transport: TransportConfig,
}

/// Transport specific parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TransportConfig {
    #[serde(rename = "serial")]
    Serial(SerialConfig),
    #[serde(rename = "tcp")]
    Tcp(TcpConfig),
}

/// Serial connection parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: ParityConfig,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub flow_control: FlowControlConfig,
    /// Upper bound for a single blocking read
    #[serde(default = "default_serial_timeout_ms")]
    pub timeout_ms: u64,
}

/// TCP connection parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_connect_timeout_sec")]
    pub connect_timeout_sec: u64,
    #[serde(default = "default_read_timeout_sec")]
    pub read_timeout_sec: u64,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
    #[serde(default = "default_keep_alive_interval_sec")]
    pub keep_alive_interval_sec: u64,
    #[serde(default)]
    pub auto_reconnect: bool,
    #[serde(default = "default_reconnect_interval_sec")]
    pub reconnect_interval_sec: u64,
    /// Retry budget after an unexpected close. Zero means retry forever.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

/// Parity configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    #[default]
    None,
    Odd,
    Even,
}

/// Flow control configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlowControlConfig {
    #[default]
    None,
    Hardware,
    Software,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_message_log_capacity() -> usize {
    1000
}

fn default_command_history_capacity() -> usize {
    100
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_serial_timeout_ms() -> u64 {
    1000
}

fn default_connect_timeout_sec() -> u64 {
    5
}

fn default_read_timeout_sec() -> u64 {
    30
}

fn default_keep_alive() -> bool {
    true
}

fn default_keep_alive_interval_sec() -> u64 {
    30
}

fn default_reconnect_interval_sec() -> u64 {
    5
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            message_log_capacity: default_message_log_capacity(),
            command_history_capacity: default_command_history_capacity(),
            line_ending: LineEnding::default(),
            input_mode: InputMode::default(),
            display_mode: DisplayMode::default(),
        }
    }
}

/// Upper bound for every timeout and interval setting, in seconds
pub const MAX_INTERVAL_SEC: u64 = 24 * 60 * 60;

fn check_seconds(name: &str, value: u64) -> Result<(), ConnectionError> {
    if value == 0 || value > MAX_INTERVAL_SEC {
        return Err(ConnectionError::Configuration(format!(
            "{} must be between 1 and {} seconds",
            name, MAX_INTERVAL_SEC
        )));
    }
    Ok(())
}

impl SerialConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: default_data_bits(),
            parity: ParityConfig::None,
            stop_bits: default_stop_bits(),
            flow_control: FlowControlConfig::None,
            timeout_ms: default_serial_timeout_ms(),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<(), ConnectionError> {
        if self.port.trim().is_empty() {
            return Err(ConnectionError::Configuration(
                "serial port must not be empty".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(ConnectionError::Configuration(
                "baud rate must be greater than zero".to_string(),
            ));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ConnectionError::Configuration(format!(
                "invalid data bits: {} (expected 5-8)",
                self.data_bits
            )));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(ConnectionError::Configuration(format!(
                "invalid stop bits: {} (expected 1 or 2)",
                self.stop_bits
            )));
        }
        if self.timeout_ms == 0 || self.timeout_ms > MAX_INTERVAL_SEC * 1000 {
            return Err(ConnectionError::Configuration(format!(
                "serial read timeout must be between 1 and {} ms",
                MAX_INTERVAL_SEC * 1000
            )));
        }
        Ok(())
    }
}

impl TcpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout_sec: default_connect_timeout_sec(),
            read_timeout_sec: default_read_timeout_sec(),
            keep_alive: default_keep_alive(),
            keep_alive_interval_sec: default_keep_alive_interval_sec(),
            auto_reconnect: false,
            reconnect_interval_sec: default_reconnect_interval_sec(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_sec)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_sec)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_sec)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_sec)
    }

    fn validate(&self) -> Result<(), ConnectionError> {
        if self.host.trim().is_empty() {
            return Err(ConnectionError::Configuration(
                "TCP host must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConnectionError::Configuration(
                "TCP port must be between 1 and 65535".to_string(),
            ));
        }
        check_seconds("connect timeout", self.connect_timeout_sec)?;
        check_seconds("read timeout", self.read_timeout_sec)?;
        if self.keep_alive {
            check_seconds("keep-alive interval", self.keep_alive_interval_sec)?;
        }
        if self.auto_reconnect {
            check_seconds("reconnect interval", self.reconnect_interval_sec)?;
        }
        Ok(())
    }
}

impl ConnectionConfig {
    pub fn serial(name: impl Into<String>, serial: SerialConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            transport: TransportConfig::Serial(serial),
        }
    }

    pub fn tcp(name: impl Into<String>, tcp: TcpConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            transport: TransportConfig::Tcp(tcp),
        }
    }

    /// Check the parameters before any transport is touched
    pub fn validate(&self) -> Result<(), ConnectionError> {
        match &self.transport {
            TransportConfig::Serial(serial) => serial.validate(),
            TransportConfig::Tcp(tcp) => tcp.validate(),
        }
    }

    /// One-line human readable summary
    pub fn describe(&self) -> String {
        match &self.transport {
            TransportConfig::Serial(serial) => format!(
                "Serial: {} @ {} baud, {}-{}-{}",
                serial.port,
                serial.baud_rate,
                serial.data_bits,
                match serial.parity {
                    ParityConfig::None => "N",
                    ParityConfig::Even => "E",
                    ParityConfig::Odd => "O",
                },
                serial.stop_bits
            ),
            TransportConfig::Tcp(tcp) => format!(
                "TCP: {} (timeout: {}s, keep-alive: {}, auto-reconnect: {})",
                tcp.address(),
                tcp.connect_timeout_sec,
                tcp.keep_alive,
                tcp.auto_reconnect
            ),
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.transport {
            TransportConfig::Serial(_) => "serial",
            TransportConfig::Tcp(_) => "tcp",
        }
    }
}
