//! Database initialization command: `corkboard init`.

use anyhow::Result;
use std::path::PathBuf;

use corkboard::board::server::open_database;
use corkboard::config::CorkboardToml;

pub fn cmd_init(config: &CorkboardToml, db_path: Option<PathBuf>) -> Result<()> {
    let db_path = db_path.unwrap_or_else(|| config.server.db_path.clone());
    open_database(&db_path)?;
    tracing::debug!(db = %db_path.display(), "Migrations applied");
    println!("Board database initialized at {}", db_path.display());
    Ok(())
}
