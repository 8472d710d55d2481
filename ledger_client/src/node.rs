//! The ledger node seam.

use async_trait::async_trait;
use ballotguard_types::{
    Ballot, ChainInfo, ElectionResults, LedgerNodeDescriptor, LedgerReceipt, LedgerVote, NodeId,
    Quantity,
};

use crate::LedgerNodeError;

/// Async access to one independently operated ledger node and the voting
/// contract deployed on it.
///
/// Implementations must not retry internally; failover and retry cadence
/// belong to the caller.
#[async_trait]
pub trait LedgerNode: Send + Sync {
    fn descriptor(&self) -> &LedgerNodeDescriptor;

    fn id(&self) -> &NodeId {
        &self.descriptor().id
    }

    /// Cheap liveness probe. Returns the node's latest block number.
    async fn probe(&self) -> Result<Quantity, LedgerNodeError>;

    /// Record a ballot on this node's contract. Only the voter hash leaves
    /// the process; the voter id never does.
    async fn submit_vote(&self, ballot: &Ballot) -> Result<LedgerReceipt, LedgerNodeError>;

    /// `Ok(None)` while the transaction is unknown or not yet mined.
    async fn transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<LedgerReceipt>, LedgerNodeError>;

    async fn chain_info(&self) -> Result<ChainInfo, LedgerNodeError>;

    async fn election_results(&self) -> Result<ElectionResults, LedgerNodeError>;

    /// Every vote the contract has recorded.
    async fn recorded_votes(&self) -> Result<Vec<LedgerVote>, LedgerNodeError>;

    /// Ask the contract to clear its tallies. Contracts without a reset
    /// entry point answer [`LedgerNodeError::Unsupported`].
    async fn reset_votes(&self) -> Result<(), LedgerNodeError>;
}
