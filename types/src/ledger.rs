//! Values reported by ledger nodes: receipts, chain info, tallies, votes.

use serde::{Deserialize, Serialize};

use crate::{NodeId, Quantity, Selection, Timestamp};

/// Execution status bit of a mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// A node's proof that a vote transaction was accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub node_id: NodeId,
    pub tx_hash: String,
    /// `None` while the transaction is accepted but not yet mined.
    #[serde(default)]
    pub block_number: Option<Quantity>,
    #[serde(default)]
    pub gas_used: Option<Quantity>,
    pub status: ReceiptStatus,
}

impl LedgerReceipt {
    pub fn is_mined(&self) -> bool {
        self.block_number.is_some()
    }
}

/// Chain-level information about one node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub node_id: NodeId,
    pub chain_id: Quantity,
    pub latest_block: Quantity,
    pub peer_count: Quantity,
    pub contract_address: String,
}

/// Votes counted for one candidate in one position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub position: String,
    pub candidate_id: String,
    pub votes: Quantity,
}

/// Tallies as read from one node's voting contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub node_id: NodeId,
    pub total_votes: Quantity,
    pub tallies: Vec<CandidateTally>,
}

/// A vote as recorded by a node's contract. The contract only ever sees the
/// voter hash, never the voter id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerVote {
    pub ballot_id: String,
    pub voter_hash: String,
    pub selections: Vec<Selection>,
    #[serde(default)]
    pub empty_positions: Vec<String>,
    pub timestamp: Timestamp,
    pub tx_hash: String,
    #[serde(default)]
    pub block_number: Option<Quantity>,
}
