//! `postdesk` server entry point.
//!
//! # Responsibility
//! - Parse flags and `POSTDESK_*` environment fallbacks.
//! - Initialize logging, open the store, and run the HTTP server.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;
use postdesk_core::db::open_db;
use postdesk_core::{core_version, default_log_level, init_logging, LoggingConfig};
use postdesk_http::{serve, AppState, ServerConfig};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "postdesk", version, about = "Blog post store over HTTP")]
struct Cli {
    /// SQLite database file; `:memory:` keeps data in memory only
    #[arg(long, env = "POSTDESK_DB_PATH", default_value = "postdesk.sqlite3")]
    db_path: PathBuf,

    /// Address to bind the HTTP listener to
    #[arg(long, env = "POSTDESK_BIND", default_value = "127.0.0.1")]
    bind: String,

    #[arg(long, env = "POSTDESK_PORT", default_value_t = 8080)]
    port: u16,

    /// trace|debug|info|warn|error
    #[arg(long, env = "POSTDESK_LOG_LEVEL", default_value = default_log_level())]
    log_level: String,

    /// Absolute directory for rolling log files; logs go to stderr when unset
    #[arg(long, env = "POSTDESK_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind.clone(),
            port: self.port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.logging_config())
        .map_err(|err| anyhow!(err))
        .context("failed to initialize logging")?;
    info!(
        "event=cli_start module=cli status=ok version={} db_path={}",
        core_version(),
        cli.db_path.display()
    );

    let conn = open_db(&cli.db_path)
        .with_context(|| format!("failed to open database `{}`", cli.db_path.display()))?;

    let config = cli.server_config();
    serve(&config, AppState::new(conn))
        .await
        .with_context(|| format!("server on {} failed", config.address()))
}
