// Electoral Intelligence Engine - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use electoral_intelligence::api::{router, AppState};
use electoral_intelligence::{open_database, table_counts, AppConfig};

#[derive(Parser, Debug)]
#[command(name = "electoral-server", version, about = "Electoral intelligence REST API")]
struct Args {
    /// JSON config file
    #[arg(long, env = "ELECTORAL_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the config file)
    #[arg(long, env = "ELECTORAL_DB")]
    db: Option<PathBuf>,

    /// Listen address (overrides the config file)
    #[arg(long, env = "ELECTORAL_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(db) = args.db {
        config.database_path = db;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    if !config.database_path.exists() {
        anyhow::bail!(
            "database not found at {:?}; run `electoral-intelligence init` and import data first",
            config.database_path
        );
    }

    // Schema check once at startup; requests open their own connections
    let conn = open_database(&config.database_path)?;
    let counts = table_counts(&conn)?;
    drop(conn);
    info!(database = ?config.database_path, ?counts, "database opened");

    let app = router(AppState::new(&config));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "🚀 server running");
    info!(
        cache_enabled = config.engine.cache_enabled,
        ttl_secs = config.engine.cache_ttl_secs,
        "result cache"
    );

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
