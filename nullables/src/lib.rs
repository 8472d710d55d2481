//! Nullable infrastructure for deterministic testing.
//!
//! Ledger nodes and the emergency store sit behind traits. This crate
//! provides in-memory implementations that:
//! - Never touch the network or the filesystem
//! - Can be scripted programmatically (reachability, hangs, failures)
//! - Count every call so tests can assert what was attempted
//!
//! Usage: hand these to the health monitor and replicator in place of
//! `RpcLedgerNode` and `EmergencyLedger`.

pub mod emergency;
pub mod ledger_node;

pub use emergency::NullEmergencyStore;
pub use ledger_node::{NodeCalls, NullLedgerNode};
