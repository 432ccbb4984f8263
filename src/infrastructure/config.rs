use crate::domain::config::{ConnectionConfig, SerialConfig, TcpConfig, TermLinkConfig};
use crate::domain::error::{TermLinkError, TermLinkResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads and stores `config.toml`: global defaults plus connection profiles
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for the per-user file, `~/.config/termlink/config.toml`
    pub fn new() -> TermLinkResult<Self> {
        Ok(Self {
            config_path: Self::default_config_path()?,
        })
    }

    /// Manager for an explicit file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    fn default_config_path() -> TermLinkResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| TermLinkError::Config {
            message: "Could not determine home directory".to_string(),
        })?;

        Ok(home.join(".config").join("termlink").join("config.toml"))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration. A missing file yields the defaults.
    pub fn load_config(&self) -> TermLinkResult<TermLinkConfig> {
        if !self.config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                self.config_path.display()
            );
            return Ok(TermLinkConfig::default());
        }
        Self::load_config_from_path(&self.config_path)
    }

    pub fn save_config(&self, config: &TermLinkConfig) -> TermLinkResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| TermLinkError::Config {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }
        Self::save_config_to_path(&self.config_path, config)
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(path: &Path) -> TermLinkResult<TermLinkConfig> {
        let content = fs::read_to_string(path).map_err(|e| TermLinkError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| TermLinkError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(path: &Path, config: &TermLinkConfig) -> TermLinkResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| TermLinkError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| TermLinkError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }

    /// Write a starter configuration with two example profiles
    pub fn init_config(&self) -> TermLinkResult<()> {
        if self.config_path.exists() {
            return Err(TermLinkError::Config {
                message: format!(
                    "Configuration already exists at {}",
                    self.config_path.display()
                ),
            });
        }

        let config = TermLinkConfig {
            global: Default::default(),
            profiles: vec![
                ConnectionConfig::serial("example_serial", SerialConfig::new("/dev/ttyUSB0", 115200)),
                ConnectionConfig::tcp("example_tcp", TcpConfig::new("192.168.1.100", 8080)),
            ],
        };
        self.save_config(&config)?;

        info!("Created configuration at {}", self.config_path.display());
        Ok(())
    }

    /// Store a new profile. Profile names are unique.
    pub fn add_profile(&self, profile: ConnectionConfig) -> TermLinkResult<()> {
        profile.validate()?;

        let mut config = self.load_config()?;
        if config.profiles.iter().any(|p| p.name == profile.name) {
            return Err(TermLinkError::Config {
                message: format!("Profile '{}' already exists", profile.name),
            });
        }

        info!("Adding profile '{}'", profile.name);
        config.profiles.push(profile);
        self.save_config(&config)
    }

    /// Remove a profile by name or id, returning it
    pub fn remove_profile(&self, name_or_id: &str) -> TermLinkResult<ConnectionConfig> {
        let mut config = self.load_config()?;
        let index = config
            .profiles
            .iter()
            .position(|p| p.name == name_or_id || p.id == name_or_id)
            .ok_or_else(|| TermLinkError::Config {
                message: format!("Profile '{}' not found", name_or_id),
            })?;

        let removed = config.profiles.remove(index);
        self.save_config(&config)?;

        info!("Removed profile '{}'", removed.name);
        Ok(removed)
    }

    /// Look up a profile by name or id
    pub fn find_profile(&self, name_or_id: &str) -> TermLinkResult<ConnectionConfig> {
        self.load_config()?
            .profiles
            .into_iter()
            .find(|p| p.name == name_or_id || p.id == name_or_id)
            .ok_or_else(|| TermLinkError::Config {
                message: format!("Profile '{}' not found", name_or_id),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> ConfigManager {
        ConfigManager::with_path(dir.path().join("nested").join("config.toml"))
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = manager(&dir).load_config().unwrap();

        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.global.message_log_capacity, 1000);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_init_config() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        manager.init_config().unwrap();
        assert!(manager.config_path().exists());

        let config = manager.load_config().unwrap();
        assert_eq!(config.profiles.len(), 2);

        // refuses to overwrite
        assert!(manager.init_config().is_err());
    }

    #[test]
    fn test_profile_lifecycle() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let profile = ConnectionConfig::tcp("bench", TcpConfig::new("127.0.0.1", 7000));
        let id = profile.id.clone();
        manager.add_profile(profile.clone()).unwrap();

        let duplicate = ConnectionConfig::tcp("bench", TcpConfig::new("127.0.0.1", 7001));
        assert!(manager.add_profile(duplicate).is_err());

        assert_eq!(manager.find_profile("bench").unwrap(), profile);
        assert_eq!(manager.find_profile(&id).unwrap().name, "bench");

        let removed = manager.remove_profile("bench").unwrap();
        assert_eq!(removed.id, id);
        assert!(manager.find_profile("bench").is_err());
        assert!(manager.remove_profile("bench").is_err());
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let dir = TempDir::new().unwrap();
        let profile = ConnectionConfig::serial("bad", SerialConfig::new("", 9600));

        let err = manager(&dir).add_profile(profile).unwrap_err();
        assert!(matches!(err, TermLinkError::Connection(_)));
    }

    #[test]
    fn test_corrupt_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "global = [not toml").unwrap();

        let err = ConfigManager::with_path(&path).load_config().unwrap_err();
        assert!(matches!(err, TermLinkError::Config { .. }));
    }
}
