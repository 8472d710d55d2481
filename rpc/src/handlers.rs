//! Request handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use ballotguard_election::ElectionAction;
use ballotguard_failover::NodeStatusReport;
use ballotguard_replicator::{ResetReport, SubmitOutcome, VoteReplicator};
use ballotguard_types::{
    Ballot, ChainInfo, ElectionResults, ElectionState, LedgerReceipt, NodeId, Selection, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::RpcError;

/// Shared state behind every route.
#[derive(Clone)]
pub struct ApiState {
    pub replicator: Arc<VoteReplicator>,
    /// Salt for voter hashes derived on behalf of callers that omit one.
    pub voter_hash_salt: Arc<str>,
}

impl ApiState {
    pub fn new(replicator: Arc<VoteReplicator>, voter_hash_salt: &str) -> Self {
        Self {
            replicator,
            voter_hash_salt: Arc::from(voter_hash_salt),
        }
    }
}

// ── Votes ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub voter_id: String,
    /// Derived from the voter id and the configured salt when absent.
    #[serde(default)]
    pub voter_hash: Option<String>,
    pub ballot_id: String,
    pub selections: Vec<Selection>,
    #[serde(default)]
    pub empty_positions: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

impl VoteRequest {
    pub fn into_ballot(self, salt: &str) -> Ballot {
        let voter_hash = self
            .voter_hash
            .unwrap_or_else(|| ballotguard_crypto::voter_hash(&self.voter_id, salt.as_bytes()));
        Ballot {
            voter_id: self.voter_id,
            voter_hash,
            ballot_id: self.ballot_id,
            selections: self.selections,
            empty_positions: self.empty_positions,
            timestamp: self.timestamp.unwrap_or_else(Timestamp::now),
        }
    }
}

/// POST /votes
pub async fn submit_vote(
    State(state): State<ApiState>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<SubmitOutcome>, RpcError> {
    let ballot = request.into_ballot(&state.voter_hash_salt);
    let outcome = state.replicator.submit_vote(ballot).await?;
    Ok(Json(outcome))
}

// ── Ledger queries ───────────────────────────────────────────────────────

/// GET /ledger/info
pub async fn ledger_info(State(state): State<ApiState>) -> Result<Json<ChainInfo>, RpcError> {
    Ok(Json(state.replicator.get_blockchain_info().await?))
}

/// GET /ledger/results
pub async fn ledger_results(
    State(state): State<ApiState>,
) -> Result<Json<ElectionResults>, RpcError> {
    Ok(Json(state.replicator.get_election_results().await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionLookup {
    pub tx_hash: String,
    /// False while the transaction is unknown to the active node or not
    /// yet mined.
    pub found: bool,
    pub receipt: Option<LedgerReceipt>,
}

/// GET /ledger/transactions/:hash
pub async fn verify_transaction(
    State(state): State<ApiState>,
    Path(tx_hash): Path<String>,
) -> Result<Json<TransactionLookup>, RpcError> {
    let receipt = state.replicator.verify_transaction(&tx_hash).await?;
    Ok(Json(TransactionLookup {
        tx_hash,
        found: receipt.is_some(),
        receipt,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WaitQuery {
    pub node: Option<String>,
}

/// GET /ledger/transactions/:hash/wait?node=
pub async fn wait_for_receipt(
    State(state): State<ApiState>,
    Path(tx_hash): Path<String>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<LedgerReceipt>, RpcError> {
    let node = query.node.map(NodeId::new);
    let receipt = state
        .replicator
        .wait_for_receipt(node.as_ref(), &tx_hash, None)
        .await?;
    Ok(Json(receipt))
}

// ── Status ───────────────────────────────────────────────────────────────

/// GET /nodes
pub async fn node_status(State(state): State<ApiState>) -> Json<NodeStatusReport> {
    Json(state.replicator.get_node_status())
}

/// GET /emergency/stats
pub async fn emergency_stats(State(state): State<ApiState>) -> Result<impl IntoResponse, RpcError> {
    Ok(Json(state.replicator.emergency_stats().await?))
}

// ── Election ─────────────────────────────────────────────────────────────

/// GET /election
pub async fn election_state(State(state): State<ApiState>) -> Json<ElectionState> {
    Json(state.replicator.election_state())
}

/// POST /election/:action
pub async fn election_transition(
    State(state): State<ApiState>,
    Path(action): Path<String>,
) -> Result<Json<ElectionState>, RpcError> {
    let action: ElectionAction = action.parse()?;
    let next = state
        .replicator
        .election()
        .apply(action, Timestamp::now())?;
    Ok(Json(next))
}

// ── Administration ───────────────────────────────────────────────────────

/// POST /admin/reset
pub async fn reset_voting_data(
    State(state): State<ApiState>,
) -> Result<Json<ResetReport>, RpcError> {
    tracing::warn!("administrative reset requested");
    Ok(Json(state.replicator.reset_voting_data().await?))
}

/// POST /admin/force-reset
pub async fn force_reset(State(state): State<ApiState>) -> Result<Json<ResetReport>, RpcError> {
    tracing::warn!("forced reset of finished election requested");
    Ok(Json(state.replicator.force_reset_when_finished().await?))
}

/// GET /metrics
pub async fn metrics(State(state): State<ApiState>) -> Result<impl IntoResponse, RpcError> {
    let text = state
        .replicator
        .metrics()
        .encode()
        .map_err(|e| RpcError::Metrics(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text))
}
