use crate::cli::args::OutputFormat;
use crate::core::codec::{self, DisplayMode};
use crate::core::message::TerminalMessage;
use crate::domain::config::{ConnectionConfig, TermLinkConfig, TransportConfig};
use crate::infrastructure::serial::SerialPortInfo;
use std::io;
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_ports(&self, ports: &[SerialPortInfo]) -> Result<(), OutputError>;
    fn write_profiles(&self, profiles: &[ConnectionConfig]) -> Result<(), OutputError>;
    fn write_profile(&self, profile: &ConnectionConfig) -> Result<(), OutputError>;
    fn write_config(&self, config: &TermLinkConfig) -> Result<(), OutputError>;
    fn write_messages(&self, messages: &[TerminalMessage], display: DisplayMode) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::TermLinkError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

/// One line per message, as shown in the interactive terminal
pub fn format_message(message: &TerminalMessage, display: DisplayMode) -> String {
    let line = format!(
        "{} {} {}",
        message.timestamp.format("%H:%M:%S%.3f"),
        message.direction,
        codec::render(&message.data, display)
    );
    match &message.error {
        Some(error) => format!("{} [failed: {}]", line, error),
        None => line,
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_ports(&self, ports: &[SerialPortInfo]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                if ports.is_empty() {
                    println!("No serial ports found");
                }
                for port in ports {
                    println!("{} ({})", port.port_name, port.port_type);
                    if let Some(product) = &port.product {
                        println!("  Product: {}", product);
                    }
                    if let Some(manufacturer) = &port.manufacturer {
                        println!("  Manufacturer: {}", manufacturer);
                    }
                    if let Some(serial_number) = &port.serial_number {
                        println!("  Serial number: {}", serial_number);
                    }
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(ports)?);
            }
            OutputFormat::Table => {
                let rows: Vec<PortTableRow> = ports.iter().map(PortTableRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
        Ok(())
    }

    fn write_profiles(&self, profiles: &[ConnectionConfig]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                if profiles.is_empty() {
                    println!("No saved profiles");
                }
                for profile in profiles {
                    println!("{}: {}", profile.name, profile.describe());
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(profiles)?);
            }
            OutputFormat::Table => {
                let rows: Vec<ProfileTableRow> = profiles.iter().map(ProfileTableRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
        Ok(())
    }

    fn write_profile(&self, profile: &ConnectionConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(profile)?);
            }
            OutputFormat::Table => {
                println!("{}", Table::new(vec![ProfileTableRow::from(profile)]));
            }
            OutputFormat::Text => {
                println!("Profile: {}", profile.name);
                println!("  ID: {}", profile.id);
                match &profile.transport {
                    TransportConfig::Serial(serial) => {
                        println!("  Port: {}", serial.port);
                        println!("  Baud rate: {}", serial.baud_rate);
                        println!("  Data bits: {}", serial.data_bits);
                        println!("  Parity: {:?}", serial.parity);
                        println!("  Stop bits: {}", serial.stop_bits);
                        println!("  Flow control: {:?}", serial.flow_control);
                        println!("  Read timeout: {}ms", serial.timeout_ms);
                    }
                    TransportConfig::Tcp(tcp) => {
                        println!("  Address: {}", tcp.address());
                        println!("  Connect timeout: {}s", tcp.connect_timeout_sec);
                        println!("  Read timeout: {}s", tcp.read_timeout_sec);
                        println!(
                            "  Keep-alive: {} (every {}s)",
                            tcp.keep_alive, tcp.keep_alive_interval_sec
                        );
                        println!(
                            "  Auto reconnect: {} (every {}s, {} attempts)",
                            tcp.auto_reconnect,
                            tcp.reconnect_interval_sec,
                            match tcp.max_reconnect_attempts {
                                0 => "unlimited".to_string(),
                                n => n.to_string(),
                            }
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn write_config(&self, config: &TermLinkConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
            _ => {
                println!("TermLink Configuration:");
                println!("  Log level: {}", config.global.log_level);
                println!("  Message log capacity: {}", config.global.message_log_capacity);
                println!("  Command history capacity: {}", config.global.command_history_capacity);
                println!("  Input mode: {}", config.global.input_mode);
                println!("  Line ending: {}", config.global.line_ending);
                println!("  Profiles: {}", config.profiles.len());
            }
        }
        Ok(())
    }

    fn write_messages(&self, messages: &[TerminalMessage], display: DisplayMode) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(messages)?);
            }
            OutputFormat::Table => {
                let rows: Vec<MessageTableRow> = messages
                    .iter()
                    .map(|m| MessageTableRow::new(m, display))
                    .collect();
                println!("{}", Table::new(rows));
            }
            OutputFormat::Text => {
                for message in messages {
                    println!("{}", format_message(message, display));
                }
            }
        }
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "message": message,
                    "level": "info"
                });
                println!("{}", serde_json::to_string(&output)?);
            }
            _ => {
                println!("{}", message);
            }
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "error": error,
                    "level": "error"
                });
                eprintln!("{}", serde_json::to_string(&output)?);
            }
            _ => {
                eprintln!("Error: {}", error);
            }
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct PortTableRow {
    port: String,
    #[tabled(rename = "type")]
    kind: String,
    manufacturer: String,
    product: String,
}

impl From<&SerialPortInfo> for PortTableRow {
    fn from(port: &SerialPortInfo) -> Self {
        Self {
            port: port.port_name.clone(),
            kind: port.port_type.clone(),
            manufacturer: port.manufacturer.clone().unwrap_or_default(),
            product: port.product.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct ProfileTableRow {
    name: String,
    transport: String,
    summary: String,
}

impl From<&ConnectionConfig> for ProfileTableRow {
    fn from(profile: &ConnectionConfig) -> Self {
        Self {
            name: profile.name.clone(),
            transport: profile.kind().to_string(),
            summary: profile.describe(),
        }
    }
}

#[derive(Tabled)]
struct MessageTableRow {
    time: String,
    direction: String,
    content: String,
}

impl MessageTableRow {
    fn new(message: &TerminalMessage, display: DisplayMode) -> Self {
        Self {
            time: message.timestamp.format("%H:%M:%S%.3f").to_string(),
            direction: message.direction.to_string(),
            content: codec::render(&message.data, display),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::InputMode;

    #[test]
    fn test_format_message_uses_display_mode() {
        let message = TerminalMessage::received(b"OK\r\n".to_vec());
        let text = format_message(&message, DisplayMode::Text);
        assert!(text.ends_with("RECV OK\u{240D}\u{240A}"));

        let message = TerminalMessage::sent(vec![0x01, 0xFF], InputMode::Hex);
        let hex = format_message(&message, DisplayMode::Hex);
        assert!(hex.ends_with("SENT 01 FF"));
    }

    #[test]
    fn test_profile_row() {
        let profile = ConnectionConfig::tcp(
            "bench",
            crate::domain::config::TcpConfig::new("127.0.0.1", 7),
        );
        let row = ProfileTableRow::from(&profile);
        assert_eq!(row.transport, "tcp");
        assert!(row.summary.starts_with("TCP: 127.0.0.1:7"));
    }
}
