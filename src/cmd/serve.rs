//! Board server command: `corkboard serve`.

use anyhow::Result;
use std::path::PathBuf;

use corkboard::board::server::{ServerConfig, start_server};
use corkboard::config::CorkboardToml;

/// Flags given on the command line; they win over file and environment.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub db_path: Option<PathBuf>,
    pub dev: bool,
}

impl ServeOverrides {
    fn apply(self, mut server: ServerConfig) -> ServerConfig {
        if let Some(port) = self.port {
            server.port = port;
        }
        if let Some(host) = self.host {
            server.host = host;
        }
        if let Some(db_path) = self.db_path {
            server.db_path = db_path;
        }
        server.dev_mode |= self.dev;
        server
    }
}

pub async fn cmd_serve(config: &CorkboardToml, overrides: ServeOverrides) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let server = overrides.apply(config.server_config());
    start_server(server).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_override_config() {
        let overrides = ServeOverrides {
            port: Some(9999),
            host: None,
            db_path: Some(PathBuf::from("/tmp/x.db")),
            dev: true,
        };
        let server = overrides.apply(ServerConfig::default());
        assert_eq!(server.port, 9999);
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.db_path, PathBuf::from("/tmp/x.db"));
        assert!(server.dev_mode);
    }

    #[test]
    fn test_dev_flag_does_not_clear_config_dev_mode() {
        let server = ServerConfig {
            dev_mode: true,
            ..ServerConfig::default()
        };
        let server = ServeOverrides::default().apply(server);
        assert!(server.dev_mode);
    }
}
