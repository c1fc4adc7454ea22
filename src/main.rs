//! Mission Control
//!
//! Kanban board that dispatches tasks to gateway agent sessions and
//! reconciles them back to the board when the sessions finish.

use anyhow::{Context, Result};
use clap::Parser;
use mission_control::board::Board;
use mission_control::cli::{Cli, Command};
use mission_control::config::{Config, ConfigLoader};
use mission_control::dashboard::{self, DashboardServer};
use mission_control::db::Database;
use mission_control::gateway::{Gateway, HttpGateway};
use mission_control::logging::{LogTarget, init_logging};
use mission_control::reconcile::{ReconciliationEngine, spawn_scheduler};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut config = ConfigLoader::load(cli.config.as_deref())?.into_config();
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    config.ensure_db_dir()?;
    let db = Database::open(&config.server.db_path)
        .with_context(|| format!("opening database {}", config.server.db_path.display()))?;
    let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(&config.gateway)?);
    let engine = ReconciliationEngine::new(db.clone(), Arc::clone(&gateway), config.reconcile.clone());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db, gateway, engine).await,
        Command::Sync => {
            let report = engine.run().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

/// Run the REST server and the reconciliation scheduler until ctrl-c.
async fn serve(
    config: Config,
    db: Database,
    gateway: Arc<dyn Gateway>,
    engine: ReconciliationEngine,
) -> Result<()> {
    info!("Starting Mission Control v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {:?}", config.server.db_path);
    info!("Gateway: {}", config.gateway.url);
    info!(
        "Completion policy: {:?}, grace window {}s",
        config.reconcile.completion_policy, config.reconcile.grace_window_secs
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = if config.reconcile.enabled {
        Some(spawn_scheduler(engine.clone(), shutdown_rx))
    } else {
        info!("Reconciliation loop disabled; use POST /api/tasks/sync");
        None
    };

    let board = Board::new(db, gateway, config.gateway.clone());
    let server = dashboard::start_server_with_retry(DashboardServer::new(board, engine), &config.server);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    server.shutdown().await;
    if let Some(scheduler) = scheduler {
        let _ = scheduler.await;
    }

    Ok(())
}
