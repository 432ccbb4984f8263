use crate::core::codec::{DisplayMode, InputMode, LineEnding};
use crate::domain::config::{FlowControlConfig, ParityConfig, SerialConfig, TcpConfig};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line arguments for TermLink
#[derive(Parser, Debug)]
#[command(
    name = "termlink",
    version = env!("CARGO_PKG_VERSION"),
    about = "Serial and TCP terminal for embedded devices",
    long_about = "A line based terminal that talks to embedded devices over a serial port or a TCP socket, with hex input, searchable history, reconnect and export."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available serial ports
    Ports,
    /// Open a serial terminal
    Serial(SerialArgs),
    /// Open a TCP terminal
    Tcp(TcpArgs),
    /// Run a local TCP echo server
    EchoServer {
        /// Bind address
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Saved connection profiles
    Profile(ProfileArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

/// Options shared by every terminal session
#[derive(ClapArgs, Debug, Clone)]
pub struct SessionArgs {
    /// Send this once, print the reply and exit
    #[arg(short, long)]
    pub send: Option<String>,

    /// How input is interpreted
    #[arg(short, long, value_enum)]
    pub mode: Option<InputModeArg>,

    /// Line ending appended to every line sent
    #[arg(short, long, value_enum)]
    pub line_ending: Option<LineEndingArg>,

    /// How received data is printed
    #[arg(short, long, value_enum)]
    pub display: Option<DisplayModeArg>,

    /// With --send, how long to wait for a reply
    #[arg(long, default_value = "500")]
    pub wait_ms: u64,

    /// Write the session log here on exit (format from the extension)
    #[arg(short, long)]
    pub export: Option<PathBuf>,
}

/// Serial terminal arguments
#[derive(ClapArgs, Debug)]
pub struct SerialArgs {
    /// Serial port path
    pub port: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    pub baud: u32,

    /// Data bits
    #[arg(long, default_value = "8")]
    pub data_bits: u8,

    /// Stop bits
    #[arg(long, default_value = "1")]
    pub stop_bits: u8,

    /// Parity (none, even, odd)
    #[arg(long, value_enum, default_value = "none")]
    pub parity: ParityArg,

    /// Flow control (none, software, hardware)
    #[arg(long, value_enum, default_value = "none")]
    pub flow_control: FlowControlArg,

    /// Read timeout in milliseconds
    #[arg(long, default_value = "1000")]
    pub timeout_ms: u64,

    #[command(flatten)]
    pub session: SessionArgs,
}

/// TCP terminal arguments
#[derive(ClapArgs, Debug)]
pub struct TcpArgs {
    /// Host address
    pub host: String,

    /// Port number
    pub port: u16,

    /// Connection timeout in seconds
    #[arg(long, default_value = "5")]
    pub connect_timeout: u64,

    /// Read timeout in seconds
    #[arg(long, default_value = "30")]
    pub read_timeout: u64,

    /// Disable TCP keep-alive
    #[arg(long)]
    pub no_keep_alive: bool,

    /// Keep-alive probe interval in seconds
    #[arg(long, default_value = "30")]
    pub keep_alive_interval: u64,

    /// Reconnect automatically when the connection drops
    #[arg(long)]
    pub auto_reconnect: bool,

    /// Seconds to wait before each reconnect attempt
    #[arg(long, default_value = "5")]
    pub reconnect_interval: u64,

    /// Reconnect attempts before giving up (0 = unlimited)
    #[arg(long, default_value = "3")]
    pub max_reconnect_attempts: u32,

    #[command(flatten)]
    pub session: SessionArgs,
}

/// Profile management arguments
#[derive(ClapArgs, Debug)]
pub struct ProfileArgs {
    /// Profile subcommand
    #[command(subcommand)]
    pub command: ProfileCommand,
}

/// Profile subcommands
#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// List saved profiles
    List,
    /// Show one profile
    Show {
        /// Profile name or id
        name: String,
    },
    /// Save a serial profile
    AddSerial {
        /// Profile name
        name: String,
        /// Serial port path
        port: String,
        /// Baud rate
        #[arg(short, long, default_value = "115200")]
        baud: u32,
    },
    /// Save a TCP profile
    AddTcp {
        /// Profile name
        name: String,
        /// Host address
        host: String,
        /// Port number
        port: u16,
        /// Reconnect automatically when the connection drops
        #[arg(long)]
        auto_reconnect: bool,
    },
    /// Delete a profile
    Remove {
        /// Profile name or id
        name: String,
    },
    /// Open a terminal using a saved profile
    Connect {
        /// Profile name or id
        name: String,
        #[command(flatten)]
        session: SessionArgs,
    },
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Create a starter configuration
    Init,
    /// Print the configuration file location
    Path,
}

/// Parity configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ParityArg {
    None,
    Even,
    Odd,
}

/// Flow control configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum FlowControlArg {
    None,
    Software,
    Hardware,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum InputModeArg {
    Text,
    Hex,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum LineEndingArg {
    None,
    Cr,
    Lf,
    Crlf,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum DisplayModeArg {
    Text,
    Hex,
}

impl From<ParityArg> for ParityConfig {
    fn from(parity: ParityArg) -> Self {
        match parity {
            ParityArg::None => Self::None,
            ParityArg::Even => Self::Even,
            ParityArg::Odd => Self::Odd,
        }
    }
}

impl From<FlowControlArg> for FlowControlConfig {
    fn from(flow_control: FlowControlArg) -> Self {
        match flow_control {
            FlowControlArg::None => Self::None,
            FlowControlArg::Software => Self::Software,
            FlowControlArg::Hardware => Self::Hardware,
        }
    }
}

impl From<InputModeArg> for InputMode {
    fn from(mode: InputModeArg) -> Self {
        match mode {
            InputModeArg::Text => Self::Text,
            InputModeArg::Hex => Self::Hex,
        }
    }
}

impl From<LineEndingArg> for LineEnding {
    fn from(line_ending: LineEndingArg) -> Self {
        match line_ending {
            LineEndingArg::None => Self::None,
            LineEndingArg::Cr => Self::Cr,
            LineEndingArg::Lf => Self::Lf,
            LineEndingArg::Crlf => Self::CrLf,
        }
    }
}

impl From<DisplayModeArg> for DisplayMode {
    fn from(mode: DisplayModeArg) -> Self {
        match mode {
            DisplayModeArg::Text => Self::Text,
            DisplayModeArg::Hex => Self::Hex,
        }
    }
}

impl From<&SerialArgs> for SerialConfig {
    fn from(args: &SerialArgs) -> Self {
        Self {
            data_bits: args.data_bits,
            stop_bits: args.stop_bits,
            parity: args.parity.into(),
            flow_control: args.flow_control.into(),
            timeout_ms: args.timeout_ms,
            ..SerialConfig::new(args.port.clone(), args.baud)
        }
    }
}

impl From<&TcpArgs> for TcpConfig {
    fn from(args: &TcpArgs) -> Self {
        Self {
            connect_timeout_sec: args.connect_timeout,
            read_timeout_sec: args.read_timeout,
            keep_alive: !args.no_keep_alive,
            keep_alive_interval_sec: args.keep_alive_interval,
            auto_reconnect: args.auto_reconnect,
            reconnect_interval_sec: args.reconnect_interval,
            max_reconnect_attempts: args.max_reconnect_attempts,
            ..TcpConfig::new(args.host.clone(), args.port)
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
        }
    }
}
