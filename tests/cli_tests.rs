use std::path::Path;
use std::process::{Command, Output};
use std::str;
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_termlink");

/// Run the binary against a private config file
fn termlink(config: &Path, args: &[&str]) -> Output {
    Command::new(BIN)
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("Failed to execute termlink")
}

fn stdout(output: &Output) -> &str {
    str::from_utf8(&output.stdout).expect("Invalid UTF-8")
}

/// CLI interface tests
#[cfg(test)]
mod cli_tests {
    use super::*;
    use termlink::infrastructure::tcp::EchoServer;

    #[test]
    fn test_cli_help() {
        let output = Command::new(BIN).arg("--help").output().unwrap();
        let stdout = stdout(&output);

        assert!(output.status.success());
        assert!(stdout.contains("Usage:"));
        assert!(stdout.contains("Commands:"));
        for command in ["ports", "serial", "tcp", "echo-server", "profile", "config"] {
            assert!(stdout.contains(command), "help is missing {}", command);
        }
    }

    #[test]
    fn test_cli_version() {
        let dir = TempDir::new().unwrap();
        let output = termlink(&dir.path().join("config.toml"), &["version"]);

        assert!(output.status.success());
        assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_cli_tcp_help_lists_reconnect_options() {
        let output = Command::new(BIN).args(["tcp", "--help"]).output().unwrap();
        let stdout = stdout(&output);

        assert!(stdout.contains("--auto-reconnect"));
        assert!(stdout.contains("--max-reconnect-attempts"));
        assert!(stdout.contains("--send"));
    }

    #[test]
    fn test_cli_invalid_command() {
        let output = Command::new(BIN).arg("invalid-command").output().unwrap();
        assert!(!output.status.success());
    }

    #[test]
    fn test_cli_invalid_port_number() {
        let output = Command::new(BIN).args(["tcp", "localhost", "99999"]).output().unwrap();
        assert!(!output.status.success());
    }

    #[test]
    fn test_config_init_and_path() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("termlink").join("config.toml");

        let output = termlink(&config, &["config", "path"]);
        assert!(output.status.success());
        assert!(stdout(&output).contains("config.toml"));

        let output = termlink(&config, &["config", "init"]);
        assert!(output.status.success());
        assert!(config.exists());

        let output = termlink(&config, &["config", "init"]);
        assert!(!output.status.success());

        let output = termlink(&config, &["--output", "json", "config", "show"]);
        assert!(output.status.success());
        let shown: serde_json::Value = serde_json::from_str(stdout(&output)).unwrap();
        assert_eq!(shown["profiles"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_profile_management() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config.toml");

        let output = termlink(&config, &["profile", "add-tcp", "bench", "127.0.0.1", "7000", "--auto-reconnect"]);
        assert!(output.status.success());

        let output = termlink(&config, &["profile", "add-serial", "board", "/dev/ttyUSB0", "--baud", "9600"]);
        assert!(output.status.success());

        let output = termlink(&config, &["profile", "add-tcp", "bench", "127.0.0.1", "7001"]);
        assert!(!output.status.success(), "duplicate profile names are rejected");

        let output = termlink(&config, &["--output", "json", "profile", "list"]);
        let profiles: serde_json::Value = serde_json::from_str(stdout(&output)).unwrap();
        let names: Vec<&str> = profiles
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["bench", "board"]);

        let output = termlink(&config, &["--output", "json", "profile", "show", "bench"]);
        let profile: serde_json::Value = serde_json::from_str(stdout(&output)).unwrap();
        assert_eq!(profile["transport"]["type"], "tcp");
        assert_eq!(profile["transport"]["auto_reconnect"], true);

        let output = termlink(&config, &["profile", "remove", "bench"]);
        assert!(output.status.success());

        let output = termlink(&config, &["profile", "show", "bench"]);
        assert!(!output.status.success());
    }

    #[tokio::test]
    async fn test_tcp_one_shot_send_prints_echo() {
        let mut server = EchoServer::bind("127.0.0.1:0").await.unwrap();
        server.start().unwrap();
        let port = server.local_addr().port().to_string();

        let dir = TempDir::new().unwrap();
        let export = dir.path().join("session.csv");
        let output = tokio::process::Command::new(BIN)
            .arg("--config")
            .arg(dir.path().join("config.toml"))
            .args(["tcp", "127.0.0.1", &port, "--send", "hello", "--line-ending", "none"])
            .args(["--wait-ms", "500", "--export"])
            .arg(&export)
            .output()
            .await
            .unwrap();

        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(stdout(&output).contains("RECV hello"));

        let csv = std::fs::read_to_string(&export).unwrap();
        assert!(csv.starts_with("timestamp,direction,content,encoding"));
        assert!(csv.contains("SENT,\"hello\",UTF-8"));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_tcp_refused_connection_fails() {
        let server = EchoServer::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().port().to_string();
        drop(server);

        let dir = TempDir::new().unwrap();
        let output = tokio::process::Command::new(BIN)
            .arg("--config")
            .arg(dir.path().join("config.toml"))
            .args(["tcp", "127.0.0.1", &port, "--send", "x"])
            .output()
            .await
            .unwrap();

        assert!(!output.status.success());
    }

    #[test]
    fn test_serial_missing_port_fails() {
        let dir = TempDir::new().unwrap();
        let output = termlink(
            &dir.path().join("config.toml"),
            &["serial", "/dev/termlink-does-not-exist", "--send", "AT"],
        );
        assert!(!output.status.success());
    }
}
