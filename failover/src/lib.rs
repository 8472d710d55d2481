//! Node health tracking and active-node selection.
//!
//! The [`NodeRoster`] fixes the priority order of enabled nodes once; the
//! [`NodeHealthMonitor`] probes them with a bounded timeout, keeps the
//! shared health table, and answers "which node do I use" for both the
//! write path ([`NodeHealthMonitor::submission_targets`]) and queries
//! ([`NodeHealthMonitor::select_active_node`]).

pub mod error;
pub mod monitor;
pub mod roster;

pub use error::{FailoverError, NodeFailure};
pub use monitor::{
    HealthTable, NodeHealthMonitor, NodeStatusEntry, NodeStatusReport, SubmissionTargets,
};
pub use roster::NodeRoster;
