use ballotguard_election::ElectionError;
use ballotguard_emergency::EmergencyError;
use ballotguard_failover::FailoverError;
use ballotguard_ledger_client::{LedgerNodeError, ReceiptError};
use ballotguard_types::{ElectionStatus, NodeId, TypesError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicatorError {
    #[error("invalid ballot: {0}")]
    InvalidBallot(TypesError),

    /// Neither a ledger node nor the emergency ledger accepted the vote.
    #[error("vote not recorded: {}", .errors.join("; "))]
    VoteNotRecorded { errors: Vec<String> },

    #[error(transparent)]
    Failover(#[from] FailoverError),

    #[error(transparent)]
    Node(#[from] LedgerNodeError),

    #[error(transparent)]
    Emergency(#[from] EmergencyError),

    #[error(transparent)]
    Election(#[from] ElectionError),

    #[error(transparent)]
    Receipt(#[from] ReceiptError),

    #[error("election is {status}; force reset requires a finished election")]
    ElectionNotFinished { status: ElectionStatus },

    #[error("unknown ledger node {0}")]
    UnknownNode(NodeId),

    #[error("config error: {0}")]
    Config(String),
}
