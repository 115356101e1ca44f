//! Configuration for the corkboard server, read from `corkboard.toml`.
//!
//! Layering: defaults → file → environment → CLI flags. Environment
//! overrides are `CORKBOARD_HOST`, `CORKBOARD_PORT`, `CORKBOARD_DB_PATH`
//! and `CORKBOARD_LOG_JSON`; `RUST_LOG` replaces the log filter at
//! subscriber init.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 4173
//! db_path = ".corkboard/board.db"
//! dev_mode = false
//! event_buffer = 256
//!
//! [logging]
//! filter = "info"
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::board::server::ServerConfig;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "corkboard.toml";

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Permissive CORS for a local front-end dev server
    #[serde(default)]
    pub dev_mode: bool,
    /// Realtime event channel capacity
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4173
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".corkboard/board.db")
}

fn default_event_buffer() -> usize {
    256
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
            event_buffer: default_event_buffer(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `tracing_subscriber::EnvFilter` directive
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

/// Root of `corkboard.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorkboardToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl CorkboardToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse corkboard.toml")
    }

    /// Load from `path`, or return defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize corkboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `CORKBOARD_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CORKBOARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CORKBOARD_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid CORKBOARD_PORT '{}'", port))?;
        }
        if let Some(path) = lookup("CORKBOARD_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }
        if let Some(json) = lookup("CORKBOARD_LOG_JSON") {
            self.logging.json = matches!(json.trim(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0: the OS will pick a random port".to_string());
        }
        if self.server.event_buffer == 0 {
            warnings.push("server.event_buffer must be at least 1; using 1".to_string());
        }
        if self.server.host.trim().is_empty() {
            warnings.push("server.host is empty".to_string());
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.filter).is_err() {
            warnings.push(format!(
                "Invalid logging.filter '{}': not a tracing filter directive",
                self.logging.filter
            ));
        }

        warnings
    }

    /// Server settings as consumed by `board::server::start_server`.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            db_path: self.server.db_path.clone(),
            dev_mode: self.server.dev_mode,
            event_buffer: self.server.event_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = CorkboardToml::parse("").unwrap();
        assert_eq!(config, CorkboardToml::default());
        assert_eq!(config.server.port, 4173);
        assert_eq!(config.server.db_path, PathBuf::from(".corkboard/board.db"));
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_parse_partial_sections() {
        let config = CorkboardToml::parse(
            r#"
            [server]
            port = 8080
            dev_mode = true

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.server.dev_mode);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.logging.json);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        let err = CorkboardToml::parse("[server]\nport = \"eighty\"").unwrap_err();
        assert!(err.to_string().contains("corkboard.toml"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = CorkboardToml::default();
        config.server.port = 9000;
        config.logging.filter = "corkboard=debug".to_string();
        config.save(&path).unwrap();

        let loaded = CorkboardToml::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = CorkboardToml::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, CorkboardToml::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CORKBOARD_HOST", "0.0.0.0"),
            ("CORKBOARD_PORT", "5000"),
            ("CORKBOARD_DB_PATH", "/tmp/cork.db"),
            ("CORKBOARD_LOG_JSON", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = CorkboardToml::default();
        config
            .apply_env_with(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.db_path, PathBuf::from("/tmp/cork.db"));
        assert!(config.logging.json);
    }

    #[test]
    fn test_env_invalid_port_is_error() {
        let mut config = CorkboardToml::default();
        let result = config.apply_env_with(|key| {
            (key == "CORKBOARD_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
        assert_eq!(config.server.port, 4173);
    }

    #[test]
    fn test_validate_warnings() {
        assert!(CorkboardToml::default().validate().is_empty());

        let mut config = CorkboardToml::default();
        config.server.event_buffer = 0;
        config.logging.filter = "[[[".to_string();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_server_config_mirrors_section() {
        let mut config = CorkboardToml::default();
        config.server.dev_mode = true;
        config.server.event_buffer = 32;
        let server = config.server_config();
        assert!(server.dev_mode);
        assert_eq!(server.event_buffer, 32);
        assert_eq!(server.port, 4173);
    }
}
