//! Gateline engine daemon.
//!
//! Opens the admission database and runs the background expiry workers
//! until interrupted.

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use gateline_core::config::load_config;
use gateline_core::tracing_init::init_tracing;
use gateline_engine::engine::Engine;
use gateline_engine::storage::Database;
use gateline_engine::workers;

#[derive(Parser, Debug)]
#[command(name = "gateline-engine")]
#[command(version, about = "Gateline admission engine daemon")]
struct Args {
    /// Path to SQLite database file.
    #[arg(long, env = "GATELINE_DATABASE_PATH")]
    db_path: Option<PathBuf>,

    /// Path to JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing("gateline=info", args.log_json);

    let config = load_config(args.config.as_deref())?;

    let db_path = args
        .db_path
        .or_else(|| config.daemon.database_path.clone())
        .ok_or_else(|| anyhow::anyhow!("No database path: pass --db-path or set it in config"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        path = %db_path.display(),
        "Starting gateline-engine"
    );

    let db = Database::open(&db_path).await?;
    let engine = Engine::new(db, &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interval = config.expiry.sweep_interval();

    let handles = [
        workers::spawn_registration_reaper(engine.clone(), interval, shutdown_rx.clone()),
        workers::spawn_claim_token_reaper(engine.clone(), interval, shutdown_rx.clone()),
        workers::spawn_rate_limit_reaper(engine, interval, shutdown_rx),
    ];

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    shutdown_tx.send(true)?;
    for handle in handles {
        handle.await?;
    }

    info!("Engine stopped");
    Ok(())
}
