use crate::cli::args::{
    Args, Command, ConfigCommand, OutputFormat, ProfileCommand, SessionArgs,
};
use crate::cli::output::{format_message, ConsoleWriter, OutputWriter};
use crate::core::codec::{DisplayMode, InputMode, LineEnding};
use crate::core::connection::{ConnectionEvent, ConnectionManager, ConnectionStatus, ManagerOptions};
use crate::core::export::{ExportFormat, ExportOptions};
use crate::domain::config::{ConnectionConfig, GlobalConfig, SerialConfig, TcpConfig, TermLinkConfig};
use crate::domain::error::{ConnectionError, TermLinkError, TermLinkResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging;
use crate::infrastructure::serial::list_serial_ports;
use crate::infrastructure::tcp::EchoServer;
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const HELP: &str = "\
Lines are sent as typed. Commands:
  :hex / :text        switch input mode
  :le <none|cr|lf|crlf>  change the line ending
  :history            list sent commands
  :prev / :next       walk the command history
  :send               send the recalled command
  :find <text>        search the message log
  :export <fmt> <file>  write the message log (txt, csv, json)
  :clear              clear the message log
  :status             show the connection status
  :quit               disconnect and exit
Start a line with :: to send a literal ':'.";

/// Execute CLI command
pub async fn execute_command(args: Args) -> TermLinkResult<()> {
    let writer = ConsoleWriter::new(args.output);

    let config_manager = match &args.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new()?,
    };
    let config = config_manager.load_config()?;

    setup_logging(&config.global, args.verbose, args.quiet)?;

    match args.command {
        Command::Ports => {
            let ports = list_serial_ports().map_err(ConnectionError::from)?;
            writer.write_ports(&ports)?;
            Ok(())
        }
        Command::Serial(serial_args) => {
            let profile = ConnectionConfig::serial(
                format!("serial-{}", serial_args.port),
                SerialConfig::from(&serial_args),
            );
            run_session(profile, &serial_args.session, &writer, &config.global).await
        }
        Command::Tcp(tcp_args) => {
            let tcp = TcpConfig::from(&tcp_args);
            let profile = ConnectionConfig::tcp(format!("tcp-{}", tcp.address()), tcp);
            run_session(profile, &tcp_args.session, &writer, &config.global).await
        }
        Command::EchoServer { bind } => run_echo_server(&bind, &writer).await,
        Command::Profile(profile_args) => {
            execute_profile_command(profile_args.command, &writer, &config, &config_manager).await
        }
        Command::Config(config_args) => {
            execute_config_command(config_args.command, &writer, &config, &config_manager)
        }
        Command::Version => {
            writer.write_message(&format!("termlink {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

async fn execute_profile_command(
    command: ProfileCommand,
    writer: &ConsoleWriter,
    config: &TermLinkConfig,
    config_manager: &ConfigManager,
) -> TermLinkResult<()> {
    match command {
        ProfileCommand::List => {
            writer.write_profiles(&config.profiles)?;
        }
        ProfileCommand::Show { name } => {
            let profile = config_manager.find_profile(&name)?;
            writer.write_profile(&profile)?;
        }
        ProfileCommand::AddSerial { name, port, baud } => {
            let profile = ConnectionConfig::serial(name, SerialConfig::new(port, baud));
            let summary = format!("Saved profile '{}' ({})", profile.name, profile.describe());
            config_manager.add_profile(profile)?;
            writer.write_message(&summary)?;
        }
        ProfileCommand::AddTcp {
            name,
            host,
            port,
            auto_reconnect,
        } => {
            let tcp = TcpConfig {
                auto_reconnect,
                ..TcpConfig::new(host, port)
            };
            let profile = ConnectionConfig::tcp(name, tcp);
            let summary = format!("Saved profile '{}' ({})", profile.name, profile.describe());
            config_manager.add_profile(profile)?;
            writer.write_message(&summary)?;
        }
        ProfileCommand::Remove { name } => {
            let removed = config_manager.remove_profile(&name)?;
            writer.write_message(&format!("Removed profile '{}'", removed.name))?;
        }
        ProfileCommand::Connect { name, session } => {
            let profile = config_manager.find_profile(&name)?;
            return run_session(profile, &session, writer, &config.global).await;
        }
    }
    Ok(())
}

fn execute_config_command(
    command: ConfigCommand,
    writer: &ConsoleWriter,
    config: &TermLinkConfig,
    config_manager: &ConfigManager,
) -> TermLinkResult<()> {
    match command {
        ConfigCommand::Show => {
            writer.write_config(config)?;
        }
        ConfigCommand::Init => {
            config_manager.init_config()?;
            writer.write_message(&format!(
                "Configuration created at {}",
                config_manager.config_path().display()
            ))?;
        }
        ConfigCommand::Path => {
            writer.write_message(&config_manager.config_path().display().to_string())?;
        }
    }
    Ok(())
}

async fn run_echo_server(bind: &str, writer: &ConsoleWriter) -> TermLinkResult<()> {
    let mut server = EchoServer::bind(bind).await.map_err(ConnectionError::from)?;
    server.start().map_err(ConnectionError::from)?;
    writer.write_message(&format!(
        "Echo server listening on {} (Ctrl+C to stop)",
        server.local_addr()
    ))?;

    tokio::signal::ctrl_c().await?;

    let stats = server.stats().await;
    server.stop().await;
    writer.write_message(&format!(
        "Echo server stopped, {} bytes echoed",
        stats.total_bytes_echoed
    ))?;
    Ok(())
}

/// Input and display settings of one terminal session
#[derive(Debug, Clone, PartialEq)]
struct SessionSettings {
    mode: InputMode,
    line_ending: LineEnding,
    display: DisplayMode,
    /// Command picked with `:prev` / `:next`
    recalled: Option<String>,
}

impl SessionSettings {
    fn resolve(args: &SessionArgs, global: &GlobalConfig) -> Self {
        Self {
            mode: args.mode.map(Into::into).unwrap_or(global.input_mode),
            line_ending: args.line_ending.map(Into::into).unwrap_or(global.line_ending),
            display: args.display.map(Into::into).unwrap_or(global.display_mode),
            recalled: None,
        }
    }
}

async fn run_session(
    profile: ConnectionConfig,
    args: &SessionArgs,
    writer: &ConsoleWriter,
    global: &GlobalConfig,
) -> TermLinkResult<()> {
    let manager = ConnectionManager::new(ManagerOptions::from(global));
    let mut settings = SessionSettings::resolve(args, global);
    let printer = spawn_event_printer(manager.subscribe(), writer.format(), settings.display);

    info!("Opening {}", profile.describe());
    let result = match manager.connect(profile).await {
        Ok(()) => match &args.send {
            Some(data) => send_once(&manager, data, &settings, Duration::from_millis(args.wait_ms)).await,
            None => interactive(&manager, &mut settings, writer).await,
        },
        Err(e) => Err(e.into()),
    };

    if let Some(path) = &args.export {
        if let Err(e) = export_to_file(&manager, path, None).await {
            writer.write_error(&e.to_string())?;
        }
    }

    if let Err(e) = manager.shutdown().await {
        warn!("Shutdown failed: {}", e);
    }
    drop(manager);
    // The printer ends once the last manager handle is gone
    if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
        debug!("Event printer did not finish in time");
    }

    result
}

fn spawn_event_printer(
    mut events: broadcast::Receiver<ConnectionEvent>,
    format: OutputFormat,
    display: DisplayMode,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event, format, display),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Terminal fell behind, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &ConnectionEvent, format: OutputFormat, display: DisplayMode) {
    if format == OutputFormat::Json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
        return;
    }

    match event {
        ConnectionEvent::MessageReceived { message } => {
            println!("{}", format_message(message, display));
        }
        ConnectionEvent::StatusChanged { status, detail } => match detail {
            Some(detail) => eprintln!("[{}] {}", status, detail),
            None => eprintln!("[{}]", status),
        },
    }
}

async fn send_once(
    manager: &ConnectionManager,
    data: &str,
    settings: &SessionSettings,
    wait: Duration,
) -> TermLinkResult<()> {
    manager.send_text(data, settings.mode, settings.line_ending).await?;
    tokio::time::sleep(wait).await;
    Ok(())
}

/// Lines read from stdin on a dedicated thread. A blocking read would
/// otherwise hold up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

async fn interactive(
    manager: &ConnectionManager,
    settings: &mut SessionSettings,
    writer: &ConsoleWriter,
) -> TermLinkResult<()> {
    let target = manager.connection_info().await.unwrap_or_default();
    writer.write_message(&format!(
        "Connected to {}. Type :help for commands, :quit to exit.",
        target
    ))?;

    let mut lines = spawn_stdin_reader();
    let mut status = manager.watch_status();

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                let line = line?;
                match parse_input(&line) {
                    Input::Data(text) => {
                        if let Err(e) = manager.send_text(text, settings.mode, settings.line_ending).await {
                            writer.write_error(&e.to_string())?;
                        }
                    }
                    Input::Command(command) => {
                        match handle_command(command, manager, settings, writer).await {
                            Ok(Flow::Quit) => break,
                            Ok(Flow::Continue) => {}
                            Err(e) => writer.write_error(&e.to_string())?,
                        }
                    }
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current == ConnectionStatus::Disconnected {
                    let reason = manager
                        .last_error()
                        .await
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "closed".to_string());
                    writer.write_message(&format!("Connection lost: {}", reason))?;
                    break;
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Data(&'a str),
    Command(SessionCommand<'a>),
}

#[derive(Debug, PartialEq, Eq)]
enum SessionCommand<'a> {
    Quit,
    Help,
    Mode(InputMode),
    LineEnding(&'a str),
    History,
    Previous,
    Next,
    SendRecalled,
    Find(&'a str),
    Export { format: &'a str, path: &'a str },
    Clear,
    Status,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    if line.starts_with("::") {
        return Input::Data(&line[1..]);
    }
    let Some(command) = line.strip_prefix(':') else {
        return Input::Data(line);
    };

    let command = command.trim();
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    let parsed = match name {
        "q" | "quit" | "exit" => SessionCommand::Quit,
        "help" | "?" => SessionCommand::Help,
        "hex" => SessionCommand::Mode(InputMode::Hex),
        "text" => SessionCommand::Mode(InputMode::Text),
        "le" => SessionCommand::LineEnding(rest),
        "history" => SessionCommand::History,
        "prev" => SessionCommand::Previous,
        "next" => SessionCommand::Next,
        "send" => SessionCommand::SendRecalled,
        "find" => SessionCommand::Find(rest),
        "export" => match rest.split_once(char::is_whitespace) {
            Some((format, path)) => SessionCommand::Export {
                format,
                path: path.trim(),
            },
            None => SessionCommand::Unknown(command),
        },
        "clear" => SessionCommand::Clear,
        "status" => SessionCommand::Status,
        _ => SessionCommand::Unknown(command),
    };
    Input::Command(parsed)
}

async fn handle_command(
    command: SessionCommand<'_>,
    manager: &ConnectionManager,
    settings: &mut SessionSettings,
    writer: &ConsoleWriter,
) -> TermLinkResult<Flow> {
    match command {
        SessionCommand::Quit => return Ok(Flow::Quit),
        SessionCommand::Help => writer.write_message(HELP)?,
        SessionCommand::Mode(mode) => {
            settings.mode = mode;
            writer.write_message(&format!("Input mode: {}", mode))?;
        }
        SessionCommand::LineEnding(value) => {
            settings.line_ending = value
                .parse::<LineEnding>()
                .map_err(|e| TermLinkError::InvalidInput(e.to_string()))?;
            writer.write_message(&format!("Line ending: {}", settings.line_ending))?;
        }
        SessionCommand::History => {
            let history = manager.command_history().await;
            if history.is_empty() {
                writer.write_message("History is empty")?;
            }
            for (index, command) in history.iter().enumerate() {
                writer.write_message(&format!("{:>4}  {}", index + 1, command))?;
            }
        }
        SessionCommand::Previous => {
            settings.recalled = manager.previous_command().await;
            match &settings.recalled {
                Some(command) => writer.write_message(&format!("> {}", command))?,
                None => writer.write_message("History is empty")?,
            }
        }
        SessionCommand::Next => {
            settings.recalled = manager.next_command().await.filter(|c| !c.is_empty());
            match &settings.recalled {
                Some(command) => writer.write_message(&format!("> {}", command))?,
                None => writer.write_message(">")?,
            }
        }
        SessionCommand::SendRecalled => {
            let command = settings
                .recalled
                .take()
                .ok_or_else(|| TermLinkError::InvalidInput("nothing recalled, use :prev first".to_string()))?;
            manager
                .send_text(&command, settings.mode, settings.line_ending)
                .await?;
        }
        SessionCommand::Find(query) => {
            if query.is_empty() {
                return Err(TermLinkError::InvalidInput("usage: :find <text>".to_string()));
            }
            let found = manager.filter_messages(query, false).await;
            writer.write_message(&format!("{} matching messages", found.len()))?;
            writer.write_messages(&found, settings.display)?;
        }
        SessionCommand::Export { format, path } => {
            let format: ExportFormat = format.parse()?;
            let count = export_to_file(manager, Path::new(path), Some(format)).await?;
            writer.write_message(&format!("Exported {} messages to {}", count, path))?;
        }
        SessionCommand::Clear => {
            manager.clear_messages().await;
            writer.write_message("Message log cleared")?;
        }
        SessionCommand::Status => {
            writer.write_message(&format!("Status: {}", manager.status()))?;
            if let Some(info) = manager.connection_info().await {
                writer.write_message(&format!("Connection: {}", info))?;
            }
            if let Some(error) = manager.last_error().await {
                writer.write_message(&format!("Last error: {}", error))?;
            }
        }
        SessionCommand::Unknown(command) => {
            return Err(TermLinkError::InvalidInput(format!(
                "unknown command ':{}', try :help",
                command
            )));
        }
    }
    Ok(Flow::Continue)
}

/// Write the message log to `path`. Without an explicit format it is taken
/// from the file extension. Returns the number of messages in the log.
async fn export_to_file(
    manager: &ConnectionManager,
    path: &Path,
    format: Option<ExportFormat>,
) -> TermLinkResult<usize> {
    let format = match format {
        Some(format) => format,
        None => path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("txt")
            .parse()?,
    };

    let count = manager.messages().await.len();
    let content = manager.export_messages(&ExportOptions::new(format)).await?;
    tokio::fs::write(path, content).await?;

    info!("Exported {} messages to {}", count, path.display());
    Ok(count)
}

fn setup_logging(global: &GlobalConfig, verbose: bool, quiet: bool) -> TermLinkResult<()> {
    let directive = logging::filter_directive(verbose, quiet, &global.log_level);
    logging::init_logging(&directive).map_err(|e| TermLinkError::Config {
        message: format!("Failed to initialize logging: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{InputModeArg, LineEndingArg};

    #[test]
    fn test_parse_input_data_and_escape() {
        assert_eq!(parse_input("AT+GMR"), Input::Data("AT+GMR"));
        assert_eq!(parse_input(""), Input::Data(""));
        assert_eq!(parse_input("::quit"), Input::Data(":quit"));
    }

    #[test]
    fn test_parse_input_commands() {
        assert_eq!(parse_input(":quit"), Input::Command(SessionCommand::Quit));
        assert_eq!(parse_input(":hex"), Input::Command(SessionCommand::Mode(InputMode::Hex)));
        assert_eq!(parse_input(":find  ERROR "), Input::Command(SessionCommand::Find("ERROR")));
        assert_eq!(parse_input(":le crlf"), Input::Command(SessionCommand::LineEnding("crlf")));
        assert_eq!(
            parse_input(":export csv /tmp/log.csv"),
            Input::Command(SessionCommand::Export {
                format: "csv",
                path: "/tmp/log.csv"
            })
        );
        assert_eq!(parse_input(":export csv"), Input::Command(SessionCommand::Unknown("export csv")));
        assert_eq!(parse_input(":bogus"), Input::Command(SessionCommand::Unknown("bogus")));
    }

    #[test]
    fn test_session_settings_prefer_flags_over_config() {
        let global = GlobalConfig::default();
        let args = SessionArgs {
            send: None,
            mode: Some(InputModeArg::Hex),
            line_ending: Some(LineEndingArg::Lf),
            display: None,
            wait_ms: 0,
            export: None,
        };

        let settings = SessionSettings::resolve(&args, &global);
        assert_eq!(settings.mode, InputMode::Hex);
        assert_eq!(settings.line_ending, LineEnding::Lf);
        assert_eq!(settings.display, global.display_mode);
    }

    #[tokio::test]
    async fn test_session_commands_against_echo_server() {
        let mut server = EchoServer::bind("127.0.0.1:0").await.unwrap();
        server.start().unwrap();
        let addr = server.local_addr();

        let manager = ConnectionManager::default();
        manager
            .connect(ConnectionConfig::tcp("echo", TcpConfig::new("127.0.0.1", addr.port())))
            .await
            .unwrap();

        let writer = ConsoleWriter::new(OutputFormat::Text);
        let mut settings = SessionSettings::resolve(
            &SessionArgs {
                send: None,
                mode: None,
                line_ending: Some(LineEndingArg::None),
                display: None,
                wait_ms: 0,
                export: None,
            },
            &GlobalConfig::default(),
        );

        manager.send_text("ping", settings.mode, settings.line_ending).await.unwrap();

        let flow = handle_command(SessionCommand::Previous, &manager, &mut settings, &writer)
            .await
            .unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(settings.recalled.as_deref(), Some("ping"));

        handle_command(SessionCommand::SendRecalled, &manager, &mut settings, &writer)
            .await
            .unwrap();
        assert!(settings.recalled.is_none());
        assert!(handle_command(SessionCommand::SendRecalled, &manager, &mut settings, &writer)
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let count = export_to_file(&manager, &path, None).await.unwrap();
        assert!(count >= 3);
        let exported: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(exported.as_array().is_some());

        assert_eq!(
            handle_command(SessionCommand::Quit, &manager, &mut settings, &writer)
                .await
                .unwrap(),
            Flow::Quit
        );

        manager.shutdown().await.unwrap();
        server.stop().await;
    }
}
