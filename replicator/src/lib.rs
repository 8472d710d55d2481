//! Vote replication core.
//!
//! [`VoteReplicator`] composes the health monitor, the emergency ledger and
//! the election state machine:
//! - `submit_vote` sends a ballot to every healthy node and always backstops
//!   it in the emergency ledger
//! - a background loop reconciles both directions while the election is
//!   open
//! - queries and administrative resets go through the same node selection
//!
//! The crate also carries the daemon's ambient pieces: configuration,
//! logging, Prometheus metrics and the shutdown controller.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod replicator;
pub mod report;
pub mod shutdown;
mod sync;

pub use config::ReplicatorConfig;
pub use error::ReplicatorError;
pub use logging::{filter_directives, init_logging, LogFormat};
pub use metrics::ReplicatorMetrics;
pub use replicator::{ReplicatorParts, ReplicatorSettings, VoteReplicator};
pub use report::{
    BackfillReport, EmergencyWrite, ReconcileReport, ResetReport, SkipReason, SubmitOutcome,
    SyncReport,
};
pub use shutdown::{ShutdownController, ShutdownSignal};
