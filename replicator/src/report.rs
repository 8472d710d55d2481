//! What the replicator's operations report back to callers.

use ballotguard_failover::NodeFailure;
use ballotguard_types::{LedgerReceipt, NodeId, Provenance};
use serde::Serialize;

/// Outcome of the emergency backstop write for one vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmergencyWrite {
    pub saved: bool,
    /// Tag the record was stored under.
    pub provenance: Option<Provenance>,
}

/// A successfully recorded vote. Only returned when at least one node or
/// the emergency ledger accepted it; `errors` lists what failed on the way.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    pub ballot_id: String,
    pub ledger_receipts: Vec<LedgerReceipt>,
    pub emergency: EmergencyWrite,
    pub errors: Vec<String>,
}

impl SubmitOutcome {
    pub fn on_ledger(&self) -> bool {
        !self.ledger_receipts.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another reconciliation pass holds the guard.
    AlreadyRunning,
    /// The election is not voting or paused.
    ElectionClosed,
}

/// Result of one emergency-to-node pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub skipped: Option<SkipReason>,
    /// Pending records when the pass started.
    pub pending: usize,
    /// Records that reached `blockchain_synced`.
    pub synced: usize,
    /// Records that gained receipts but still miss some node.
    pub partially_synced: usize,
    /// The election closed or a reset started mid-pass.
    pub stopped_early: bool,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }
}

/// Result of one node-to-emergency pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub skipped: Option<SkipReason>,
    /// Votes seen across every queried node.
    pub seen: usize,
    /// Ballots that were missing locally and were inserted.
    pub inserted: usize,
    pub errors: Vec<String>,
}

impl BackfillReport {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub restored_primary: bool,
    pub to_nodes: SyncReport,
    pub from_nodes: BackfillReport,
}

/// What an administrative reset actually cleared.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub emergency_cleared: bool,
    pub emergency_error: Option<String>,
    pub nodes_reset: Vec<NodeId>,
    /// Nodes whose tallies survive, each with the reason.
    pub nodes_not_reset: Vec<NodeFailure>,
    /// Set by the force reset once the election is back to not_started.
    pub election_reset: bool,
}

impl ResetReport {
    pub fn fully_reset(&self) -> bool {
        self.emergency_cleared && self.nodes_not_reset.is_empty()
    }
}
