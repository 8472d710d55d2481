//! The emergency ledger: an encrypted, upsert-safe local store of vote
//! records that works regardless of ledger node availability.
//!
//! [`EmergencyStore`] is the seam the replicator programs against;
//! [`EmergencyLedger`] is the file-backed implementation. It keeps the
//! authoritative record set in memory and rewrites the whole encrypted
//! container as a checkpoint after every mutation.

pub mod container;
pub mod error;
pub mod ledger;
pub mod store;

pub use container::{LedgerContents, LedgerMetadata, SealedContainer};
pub use error::EmergencyError;
pub use ledger::{attach_receipts, upsert_vote, EmergencyLedger};
pub use store::{EmergencyStats, EmergencyStore};
