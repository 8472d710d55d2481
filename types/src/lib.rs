//! Shared data model for the ballot replication workspace.
//!
//! Every other crate speaks in these types: ledger node descriptors, vote
//! records and their provenance tags, ledger receipts, hex quantities,
//! election lifecycle state, and millisecond timestamps.

pub mod election;
pub mod error;
pub mod ledger;
pub mod node;
pub mod quantity;
pub mod time;
pub mod vote;

pub use election::{ElectionState, ElectionStatus};
pub use error::TypesError;
pub use ledger::{CandidateTally, ChainInfo, ElectionResults, LedgerReceipt, LedgerVote, ReceiptStatus};
pub use node::{LedgerNodeDescriptor, NodeHealth, NodeId};
pub use quantity::Quantity;
pub use time::Timestamp;
pub use vote::{Ballot, Provenance, Selection, VoteRecord};
