use std::fmt;

use ballotguard_types::NodeId;
use serde::Serialize;
use thiserror::Error;

/// Why one node could not be used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    pub node: NodeId,
    pub reason: String,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, self.reason)
    }
}

fn list(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FailoverError {
    #[error("no ledger node available ({})", list(.failures))]
    NoNodesAvailable { failures: Vec<NodeFailure> },

    #[error("no enabled ledger node configured")]
    EmptyRoster,

    #[error("ledger node {0} configured twice")]
    DuplicateNode(NodeId),
}
