//! HTTP server lifecycle: shared state, binding, and bind retry.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::routes::build_router;
use crate::board::Board;
use crate::config::ServerConfig;
use crate::reconcile::ReconciliationEngine;

/// State shared across handlers.
#[derive(Clone)]
pub struct DashboardServer {
    board: Board,
    engine: ReconciliationEngine,
}

impl DashboardServer {
    pub fn new(board: Board, engine: ReconciliationEngine) -> Self {
        Self { board, engine }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }
}

/// A listener that is accepting requests.
pub struct BoundServer {
    pub addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl BoundServer {
    /// Stop accepting and wait for in-flight requests to drain.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "REST server task failed");
        }
    }
}

/// Bind `host:port` and serve the board API in the background.
pub async fn start_server(state: DashboardServer, host: &str, port: u16) -> anyhow::Result<BoundServer> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let addr = listener.local_addr()?;
    let app = build_router(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        match served {
            Ok(()) => info!(%addr, "REST server stopped"),
            Err(e) => error!(%addr, error = %e, "REST server error"),
        }
    });

    info!(%addr, "REST server listening");
    Ok(BoundServer {
        addr,
        shutdown_tx,
        task,
    })
}

/// Bind-retry schedule: the base delay grows by `multiplier` up to `max_ms`,
/// each wait is jittered by up to `±jitter_ms` and never below one second.
#[derive(Debug, Clone)]
struct Backoff {
    base_ms: u64,
    jitter_ms: u64,
    max_ms: u64,
    multiplier: f64,
}

impl Backoff {
    const FLOOR_MS: u64 = 1_000;

    fn from_config(config: &ServerConfig) -> Self {
        Self {
            base_ms: config.retry_initial_ms,
            jitter_ms: config.retry_jitter_ms,
            max_ms: config.retry_max_ms,
            multiplier: config.retry_multiplier,
        }
    }

    /// Wait before the next attempt, given a pseudo-random `seed`; advances
    /// the base delay.
    fn next_delay(&mut self, seed: u64) -> Duration {
        let offset = match self.jitter_ms {
            0 => 0,
            j => (seed % (2 * j + 1)) as i64 - j as i64,
        };
        let wait = (self.base_ms as i64).saturating_add(offset).max(Self::FLOOR_MS as i64) as u64;
        self.base_ms = ((self.base_ms as f64 * self.multiplier) as u64).min(self.max_ms);
        Duration::from_millis(wait)
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0)
}

/// Shutdown handle for [`start_server_with_retry`].
pub struct DashboardHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl DashboardHandle {
    /// Cancel a pending retry or stop the running server, then wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

/// Serve the board API, retrying the bind in the background while the port
/// is taken. Never fails; bind errors are logged and retried.
pub fn start_server_with_retry(state: DashboardServer, config: &ServerConfig) -> DashboardHandle {
    let host = config.host.clone();
    let port = config.port;
    let mut backoff = Backoff::from_config(config);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        loop {
            match start_server(state.clone(), &host, port).await {
                Ok(server) => {
                    let _ = shutdown_rx.await;
                    server.stop().await;
                    return;
                }
                Err(e) => {
                    let delay = backoff.next_delay(clock_seed());
                    warn!(
                        %host,
                        port,
                        error = %e,
                        retry_in_secs = delay.as_secs_f64(),
                        "Could not bind REST server"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = &mut shutdown_rx => {
                            info!("Bind retry cancelled");
                            return;
                        }
                    }
                }
            }
        }
    });

    DashboardHandle { shutdown_tx, task }
}
