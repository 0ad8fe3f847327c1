//! HTTP server lifecycle

use std::{sync::Arc, time::Duration};

use axum::Router;
use lostfound_core::StatusTracker;
use tokio::{net::TcpListener, task::JoinHandle, time::MissedTickBehavior};
use tracing::info;

use crate::{routes::all_routes, state::AppState};

/// Lost-and-found API server
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Router with all routes and middleware applied.
    pub fn router(&self) -> Router {
        all_routes(self.state.clone())
    }

    /// Serve on `listener` until ctrl-c.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        info!("Listening on {}", listener.local_addr()?);
        let interval = Duration::from_secs(self.state.config.status.prune_interval_seconds.max(1));
        let pruner = spawn_prune_task(self.state.status.clone(), interval);

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;
        pruner.abort();
        result
    }

    /// Bind the configured address and serve.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.state.config.server.bind).await?;
        self.serve(listener).await
    }
}

/// Periodically prune stale ingestion status entries.
pub fn spawn_prune_task(status: Arc<StatusTracker>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            status.prune();
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
