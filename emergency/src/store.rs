use async_trait::async_trait;
use ballotguard_types::{ElectionState, LedgerReceipt, NodeId, Timestamp, VoteRecord};
use serde::Serialize;

use crate::{EmergencyError, LedgerContents};

/// Operational summary of the emergency ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmergencyStats {
    pub total_votes: usize,
    pub pending_votes: usize,
    pub last_updated: Option<Timestamp>,
    pub file_exists: bool,
    pub location: String,
}

/// Durable local store of vote records.
///
/// Upserts match on ballot id OR voter id, first match wins, so retried
/// writes of the same vote never produce a second record.
#[async_trait]
pub trait EmergencyStore: Send + Sync {
    /// Upsert `record`, returning the record as stored.
    async fn try_save_vote(&self, record: VoteRecord) -> Result<VoteRecord, EmergencyError>;

    /// Insert `record` only if no stored record matches it. Returns whether
    /// it was inserted.
    async fn insert_if_absent(&self, record: VoteRecord) -> Result<bool, EmergencyError>;

    /// Attach receipts to the record currently stored for `ballot_id`,
    /// marking it `blockchain_synced` once every node in `required` holds
    /// one. Never inserts: returns `None` if the ballot is no longer stored.
    async fn record_receipts(
        &self,
        ballot_id: &str,
        receipts: Vec<LedgerReceipt>,
        required: &[NodeId],
    ) -> Result<Option<VoteRecord>, EmergencyError>;

    async fn all_votes(&self) -> Result<LedgerContents, EmergencyError>;

    /// Records not yet confirmed by every node.
    async fn pending_votes(&self) -> Result<Vec<VoteRecord>, EmergencyError>;

    /// Drop every record, keeping the election snapshot.
    async fn clear(&self) -> Result<(), EmergencyError>;

    async fn stats(&self) -> Result<EmergencyStats, EmergencyError>;

    /// Election lifecycle as last persisted.
    async fn election_snapshot(&self) -> ElectionState;

    /// Infallible upsert for callers that only need a yes/no.
    async fn save_vote(&self, record: VoteRecord) -> bool {
        let ballot_id = record.ballot_id.clone();
        match self.try_save_vote(record).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(ballot_id = %ballot_id, "emergency write failed: {e}");
                false
            }
        }
    }
}
