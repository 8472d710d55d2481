use ballotguard_types::NodeId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerNodeError {
    #[error("node {node} unreachable: {reason}")]
    Unreachable { node: NodeId, reason: String },

    #[error("node {node} did not answer within {after_ms}ms")]
    Timeout { node: NodeId, after_ms: u64 },

    #[error("node {node} RPC error {code}: {message}")]
    Rpc {
        node: NodeId,
        code: i64,
        message: String,
    },

    #[error("node {node} returned an invalid response: {reason}")]
    InvalidResponse { node: NodeId, reason: String },

    /// The node's contract already recorded this ballot.
    #[error("node {node} already recorded ballot {ballot_id}")]
    DuplicateBallot {
        node: NodeId,
        ballot_id: String,
        tx_hash: Option<String>,
    },

    /// The node's contract has no entry point for this call.
    #[error("node {node} does not support {method}")]
    Unsupported { node: NodeId, method: String },

    #[error("node {node} rejected the transaction: {reason}")]
    Rejected { node: NodeId, reason: String },
}

impl LedgerNodeError {
    pub fn node(&self) -> &NodeId {
        match self {
            Self::Unreachable { node, .. }
            | Self::Timeout { node, .. }
            | Self::Rpc { node, .. }
            | Self::InvalidResponse { node, .. }
            | Self::DuplicateBallot { node, .. }
            | Self::Unsupported { node, .. }
            | Self::Rejected { node, .. } => node,
        }
    }

    /// Whether the failure says something about the node's liveness rather
    /// than about the request.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReceiptError {
    #[error(
        "transaction {tx_hash} not mined on node {node} after {attempts} polls over {waited_ms}ms; \
         it may still be pending, may have been dropped for a low fee, \
         or the node may be partitioned from the network"
    )]
    TransactionNotMined {
        tx_hash: String,
        node: NodeId,
        attempts: u32,
        waited_ms: u64,
    },
}
