//! HTTP API error types and their JSON rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ballotguard_election::ElectionError;
use ballotguard_failover::FailoverError;
use ballotguard_replicator::ReplicatorError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Replicator(#[from] ReplicatorError),

    #[error(transparent)]
    Election(#[from] ElectionError),

    #[error("metrics error: {0}")]
    Metrics(String),

    #[error("server error: {0}")]
    Server(String),
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: Vec<String>,
}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Election(ElectionError::UnknownAction(_)) => StatusCode::BAD_REQUEST,
            Self::Election(_) => StatusCode::CONFLICT,
            Self::Metrics(_) | Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Replicator(e) => match e {
                ReplicatorError::InvalidBallot(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ReplicatorError::UnknownNode(_) => StatusCode::BAD_REQUEST,
                ReplicatorError::ElectionNotFinished { .. } => StatusCode::CONFLICT,
                ReplicatorError::Election(ElectionError::UnknownAction(_)) => StatusCode::BAD_REQUEST,
                ReplicatorError::Election(_) => StatusCode::CONFLICT,
                ReplicatorError::VoteNotRecorded { .. }
                | ReplicatorError::Failover(FailoverError::NoNodesAvailable { .. })
                | ReplicatorError::Node(_)
                | ReplicatorError::Receipt(_) => StatusCode::SERVICE_UNAVAILABLE,
                ReplicatorError::Failover(_)
                | ReplicatorError::Emergency(_)
                | ReplicatorError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Underlying per-subsystem failures, when the error aggregates some.
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Replicator(ReplicatorError::VoteNotRecorded { errors }) => errors.clone(),
            Self::Replicator(ReplicatorError::Failover(FailoverError::NoNodesAvailable {
                failures,
            })) => failures.iter().map(ToString::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, "request failed: {self}");
        } else {
            tracing::debug!(%status, "request rejected: {self}");
        }
        let body = ErrorBody {
            error: self.to_string(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}
