//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults, then applies
//!     environment overrides (`PORT`, `DATA_DIR`).
//!
//! structure:
//!     - ServerConfig: where the http/websocket listener binds.
//!     - StorageConfig: data directory, save timer, retention, seeding.
//!     - PagesConfig: directory the dashboard html is served from.
//!     - LoggingConfig: default log level and per-reading logging.
//!
//! defaults:
//!     every section and field has a default, so a partial file is fine.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::store::StoreOptions;

pub const DEFAULT_PORT: u16 = 9100;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HostConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub pages: PagesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub persist_interval_seconds: u64,
    /// unset keeps every reading forever
    pub max_readings_per_zone: Option<usize>,
    pub seed_on_empty: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PagesConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// log every ingested reading at info level
    pub show_readings: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), port: DEFAULT_PORT }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            persist_interval_seconds: 5 * 60,
            max_readings_per_zone: None,
            seed_on_empty: true,
        }
    }
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self { root: PathBuf::from(".") }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_readings: true }
    }
}

/// where the active configuration came from
///
/// the loader runs before logging is set up, so it records what happened
/// and main.rs reports it once the subscriber exists.
#[derive(Debug, Default)]
pub struct ConfigSource {
    pub file: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl ConfigSource {
    pub fn report(&self) {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
        match &self.file {
            Some(path) => info!(path = %path.display(), "configuration loaded"),
            None => info!("no config file found, using defaults"),
        }
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    pub fn load_or_default() -> (Self, ConfigSource) {
        let paths = [
            PathBuf::from("config").join("host.toml"),
            PathBuf::from("..").join("config").join("host.toml"),
        ];
        let mut source = ConfigSource::default();

        for path in paths {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => {
                        source.file = Some(path);
                        return (config, source);
                    }
                    Err(e) => {
                        source.warnings.push(format!("failed to load {}: {}", path.display(), e));
                    }
                }
            }
        }

        (Self::default(), source)
    }

    /// apply `PORT` and `DATA_DIR` from the process environment
    pub fn apply_env_overrides(&mut self, source: &mut ConfigSource) {
        self.apply_overrides(std::env::var("PORT").ok(), std::env::var("DATA_DIR").ok(), source);
    }

    fn apply_overrides(&mut self, port: Option<String>, data_dir: Option<String>, source: &mut ConfigSource) {
        if let Some(port) = port {
            match port.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => source.warnings.push(format!("ignoring invalid PORT value {:?}", port)),
            }
        }
        if let Some(dir) = data_dir.filter(|dir| !dir.trim().is_empty()) {
            self.storage.data_dir = PathBuf::from(dir);
        }
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.storage.persist_interval_seconds.max(1))
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_readings_per_zone: self.storage.max_readings_per_zone,
            seed_on_empty: self.storage.seed_on_empty,
        }
    }

    /// log configuration summary
    pub fn log_summary(&self) {
        info!(
            bind = %self.server.bind_address,
            port = self.server.port,
            data_dir = %self.storage.data_dir.display(),
            persist_every_s = self.storage.persist_interval_seconds,
            max_readings = ?self.storage.max_readings_per_zone,
            pages = %self.pages.root.display(),
            log_level = %self.logging.level,
            "host configuration"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let config = HostConfig::default();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
        assert_eq!(config.persist_interval(), Duration::from_secs(300));
        assert!(config.storage.max_readings_per_zone.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = HostConfig::parse(
            r#"
            [storage]
            max_readings_per_zone = 5000

            [logging]
            show_readings = false
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.max_readings_per_zone, Some(5000));
        assert!(!config.logging.show_readings);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn env_overrides_port_and_data_dir() {
        let mut config = HostConfig::default();
        let mut source = ConfigSource::default();

        config.apply_overrides(Some("8080".into()), Some("/var/lib/tents".into()), &mut source);

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/tents"));
        assert!(source.warnings.is_empty());
    }

    #[test]
    fn invalid_port_is_ignored_with_warning() {
        let mut config = HostConfig::default();
        let mut source = ConfigSource::default();

        config.apply_overrides(Some("ninety-one".into()), None, &mut source);

        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(source.warnings.len(), 1);
    }
}
