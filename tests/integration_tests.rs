//! Integration tests for the corkboard CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const ENV_VARS: [&str; 5] = [
    "CORKBOARD_HOST",
    "CORKBOARD_PORT",
    "CORKBOARD_DB_PATH",
    "CORKBOARD_LOG_JSON",
    "RUST_LOG",
];

/// Helper to create a corkboard Command running in `dir` with a clean env
fn corkboard(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("corkboard");
    cmd.current_dir(dir.path());
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = TempDir::new().unwrap();
        corkboard(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("init"))
            .stdout(predicate::str::contains("config"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        corkboard(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("corkboard"));
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        let dir = TempDir::new().unwrap();
        corkboard(&dir).arg("frobnicate").assert().failure();
    }
}

// =============================================================================
// Database Init
// =============================================================================

mod init {
    use super::*;

    #[test]
    fn test_init_creates_database_at_path() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("data").join("board.db");

        corkboard(&dir)
            .arg("init")
            .arg("--db-path")
            .arg(&db_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("Board database initialized"));

        assert!(db_path.exists());
    }

    #[test]
    fn test_init_defaults_to_configured_path() {
        let dir = TempDir::new().unwrap();

        corkboard(&dir).arg("init").assert().success();

        assert!(dir.path().join(".corkboard/board.db").exists());
    }

    #[test]
    fn test_init_honours_env_db_path() {
        let dir = TempDir::new().unwrap();

        corkboard(&dir)
            .env("CORKBOARD_DB_PATH", "from-env.db")
            .arg("init")
            .assert()
            .success();

        assert!(dir.path().join("from-env.db").exists());
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        corkboard(&dir).arg("init").assert().success();
        corkboard(&dir).arg("init").assert().success();
    }
}

// =============================================================================
// Config
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_writes_default_file() {
        let dir = TempDir::new().unwrap();

        corkboard(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created corkboard.toml"));

        let content = fs::read_to_string(dir.path().join("corkboard.toml")).unwrap();
        assert!(content.contains("[server]"));
        assert!(content.contains("port = 4173"));
        assert!(content.contains("[logging]"));
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("corkboard.toml"), "[server]\nport = 9000\n").unwrap();

        corkboard(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join("corkboard.toml")).unwrap();
        assert!(content.contains("port = 9000"));
    }

    #[test]
    fn test_config_show_defaults_without_file() {
        let dir = TempDir::new().unwrap();

        corkboard(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No corkboard.toml found"))
            .stdout(predicate::str::contains("port = 4173"));
    }

    #[test]
    fn test_config_show_reads_file_and_env() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("corkboard.toml"),
            "[server]\nport = 9000\nhost = \"0.0.0.0\"\n",
        )
        .unwrap();

        corkboard(&dir)
            .env("CORKBOARD_PORT", "9100")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 9100"))
            .stdout(predicate::str::contains("host = \"0.0.0.0\""));
    }

    #[test]
    fn test_config_flag_selects_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("alt.toml"), "[server]\nport = 7777\n").unwrap();

        corkboard(&dir)
            .args(["--config", "alt.toml", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 7777"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("corkboard.toml"),
            "[server]\nevent_buffer = 0\n",
        )
        .unwrap();

        corkboard(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("event_buffer"));
    }

    #[test]
    fn test_malformed_config_file_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("corkboard.toml"), "[server\nport = ").unwrap();

        corkboard(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("corkboard.toml"));
    }

    #[test]
    fn test_invalid_env_port_fails() {
        let dir = TempDir::new().unwrap();

        corkboard(&dir)
            .env("CORKBOARD_PORT", "not-a-port")
            .arg("serve")
            .assert()
            .failure()
            .stderr(predicate::str::contains("CORKBOARD_PORT"));
    }
}
