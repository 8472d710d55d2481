//! Ledger node descriptors and per-node health bookkeeping.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Timestamp;

/// Stable identifier of a configured ledger node (e.g. `"primary"`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Static configuration of one ledger node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerNodeDescriptor {
    pub id: NodeId,
    /// JSON-RPC endpoint, e.g. `http://10.0.0.5:8545`.
    pub rpc_url: String,
    /// Address of the voting contract deployed on this node. Contracts on
    /// different nodes are independent deployments.
    pub contract_address: String,
    /// Lower rank is preferred. Rank order defines primary, backup, ...
    pub priority: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Liveness bookkeeping for one node. Only the health monitor mutates it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub healthy: bool,
    pub last_checked_at: Option<Timestamp>,
    pub consecutive_failures: u32,
    pub last_response_time_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl NodeHealth {
    pub fn record_success(&mut self, at: Timestamp, response_time_ms: u64) {
        self.healthy = true;
        self.last_checked_at = Some(at);
        self.consecutive_failures = 0;
        self.last_response_time_ms = Some(response_time_ms);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, at: Timestamp, reason: impl Into<String>) {
        self.healthy = false;
        self.last_checked_at = Some(at);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(reason.into());
    }
}
