//! Axum-based HTTP server.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::broadcast;

use crate::error::RpcError;
use crate::handlers::{self, ApiState};

/// Every route of the API over `state`.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/votes", post(handlers::submit_vote))
        .route("/ledger/info", get(handlers::ledger_info))
        .route("/ledger/results", get(handlers::ledger_results))
        .route("/ledger/transactions/:hash", get(handlers::verify_transaction))
        .route("/ledger/transactions/:hash/wait", get(handlers::wait_for_receipt))
        .route("/nodes", get(handlers::node_status))
        .route("/election", get(handlers::election_state))
        .route("/election/:action", post(handlers::election_transition))
        .route("/emergency/stats", get(handlers::emergency_stats))
        .route("/admin/reset", post(handlers::reset_voting_data))
        .route("/admin/force-reset", post(handlers::force_reset))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}

pub struct RpcServer {
    pub addr: SocketAddr,
    pub state: ApiState,
}

impl RpcServer {
    pub fn new(addr: SocketAddr, state: ApiState) -> Self {
        Self { addr, state }
    }

    /// Serve until `shutdown` fires.
    pub async fn start(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), RpcError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| RpcError::Server(format!("bind {}: {e}", self.addr)))?;
        tracing::info!(addr = %self.addr, "HTTP API listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP API shutting down");
            })
            .await
            .map_err(|e| RpcError::Server(e.to_string()))
    }
}
