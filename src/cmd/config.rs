//! Configuration view and validation commands: `corkboard config`.

use anyhow::Result;
use std::path::Path;

use corkboard::config::CorkboardToml;

use super::super::ConfigCommands;

/// `effective` is the file merged with environment overrides.
pub fn cmd_config(
    config_path: &Path,
    effective: &CorkboardToml,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Corkboard Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No corkboard.toml found at {}", config_path.display());
                println!("Using defaults. Run 'corkboard config init' to create one.");
            }
            println!();

            println!("Effective values (with env overrides):");
            println!("[server]");
            println!("  host = \"{}\"", effective.server.host);
            println!("  port = {}", effective.server.port);
            println!("  db_path = \"{}\"", effective.server.db_path.display());
            println!("  dev_mode = {}", effective.server.dev_mode);
            println!("  event_buffer = {}", effective.server.event_buffer);
            println!();
            println!("[logging]");
            println!("  filter = \"{}\"", effective.logging.filter);
            println!("  json = {}", effective.logging.json);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No corkboard.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = CorkboardToml::load(config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("corkboard.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            CorkboardToml::default().save(config_path)?;

            println!("Created corkboard.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, db_path, dev_mode");
            println!("  - [logging] filter, json");
            println!();
        }
    }

    Ok(())
}
