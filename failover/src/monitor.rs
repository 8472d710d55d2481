//! Per-node liveness and active-node selection.
//!
//! Probes carry their own timeout, so a hung node is reported unhealthy
//! instead of stalling selection. A failed probe is never retried inline:
//! the next request or reconciliation tick probes again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ballotguard_ledger_client::LedgerNode;
use ballotguard_types::{LedgerNodeDescriptor, NodeHealth, NodeId, Timestamp};
use serde::Serialize;
use tokio::time::Instant;

use crate::{FailoverError, NodeFailure, NodeRoster};

/// Process-wide health table, injected so tests can fabricate any state.
pub type HealthTable = Arc<Mutex<HashMap<NodeId, NodeHealth>>>;

/// Healthy nodes a vote should be sent to, best first, plus every node
/// found unusable on the way.
pub struct SubmissionTargets {
    pub targets: Vec<Arc<dyn LedgerNode>>,
    pub failures: Vec<NodeFailure>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeStatusEntry {
    pub descriptor: LedgerNodeDescriptor,
    pub health: NodeHealth,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeStatusReport {
    pub failed_over: bool,
    pub active: Option<NodeId>,
    pub nodes: Vec<NodeStatusEntry>,
}

pub struct NodeHealthMonitor {
    roster: NodeRoster,
    health: HealthTable,
    probe_timeout: Duration,
    failed_over: AtomicBool,
    active: Mutex<Option<NodeId>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NodeHealthMonitor {
    pub fn new(roster: NodeRoster, health: HealthTable, probe_timeout: Duration) -> Self {
        {
            let mut table = lock(&health);
            for id in roster.ids() {
                table.entry(id).or_default();
            }
        }
        Self {
            roster,
            health,
            probe_timeout,
            failed_over: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    pub fn roster(&self) -> &NodeRoster {
        &self.roster
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn is_failed_over(&self) -> bool {
        self.failed_over.load(Ordering::SeqCst)
    }

    pub fn active_node_id(&self) -> Option<NodeId> {
        lock(&self.active).clone()
    }

    pub fn health_of(&self, id: &NodeId) -> Option<NodeHealth> {
        lock(&self.health).get(id).cloned()
    }

    /// Probe `node` once within the probe timeout. Never fails: any error
    /// or timeout is recorded as unhealthy.
    pub async fn check_health(&self, node: &dyn LedgerNode) -> bool {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.probe_timeout, node.probe()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(block)) => {
                tracing::debug!(node = %node.id(), block = %block.as_hex(), elapsed_ms, "probe ok");
                self.update(node.id(), |h| h.record_success(Timestamp::now(), elapsed_ms));
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(node = %node.id(), elapsed_ms, "probe failed: {e}");
                self.record_failure(node.id(), &e.to_string());
                false
            }
            Err(_) => {
                let reason = format!("probe timed out after {}ms", self.probe_timeout.as_millis());
                tracing::warn!(node = %node.id(), "{reason}");
                self.record_failure(node.id(), &reason);
                false
            }
        }
    }

    /// Mark `node` unhealthy, e.g. after a failed submission.
    pub fn record_failure(&self, node: &NodeId, reason: &str) {
        self.update(node, |h| h.record_failure(Timestamp::now(), reason));
    }

    fn update(&self, node: &NodeId, f: impl FnOnce(&mut NodeHealth)) {
        let mut table = lock(&self.health);
        f(table.entry(node.clone()).or_default());
    }

    fn last_error(&self, node: &NodeId) -> String {
        self.health_of(node)
            .and_then(|h| h.last_error)
            .unwrap_or_else(|| "unhealthy".into())
    }

    /// First healthy node in priority order, with the failures of every
    /// node ahead of it.
    async fn select(&self) -> (Option<usize>, Vec<NodeFailure>) {
        let mut failures = Vec::new();
        for (index, node) in self.roster.nodes().iter().enumerate() {
            if self.check_health(node.as_ref()).await {
                self.activate(index);
                return (Some(index), failures);
            }
            failures.push(NodeFailure {
                node: node.id().clone(),
                reason: self.last_error(node.id()),
            });
        }
        (None, failures)
    }

    fn activate(&self, index: usize) {
        let id = self.roster.nodes()[index].id().clone();
        let failed_over = index > 0;
        let was = self.failed_over.swap(failed_over, Ordering::SeqCst);
        let previous = lock(&self.active).replace(id.clone());

        if failed_over && !was {
            tracing::warn!(
                active = %id,
                primary = %self.roster.primary().id(),
                "primary unavailable, failed over"
            );
        } else if previous.as_ref() != Some(&id) {
            tracing::info!(active = %id, "active ledger node selected");
        }
    }

    /// The node queries and first submissions go to.
    pub async fn select_active_node(&self) -> Result<Arc<dyn LedgerNode>, FailoverError> {
        match self.select().await {
            (Some(index), _) => Ok(Arc::clone(&self.roster.nodes()[index])),
            (None, failures) => {
                tracing::error!(nodes = failures.len(), "no ledger node available");
                Err(FailoverError::NoNodesAvailable { failures })
            }
        }
    }

    /// The active node followed by every lower-priority node that answers a
    /// fresh probe.
    pub async fn submission_targets(&self) -> SubmissionTargets {
        let (active, mut failures) = self.select().await;
        let Some(active) = active else {
            return SubmissionTargets {
                targets: Vec::new(),
                failures,
            };
        };

        let nodes = self.roster.nodes();
        let mut targets = vec![Arc::clone(&nodes[active])];
        for node in &nodes[active + 1..] {
            if self.check_health(node.as_ref()).await {
                targets.push(Arc::clone(node));
            } else {
                failures.push(NodeFailure {
                    node: node.id().clone(),
                    reason: self.last_error(node.id()),
                });
            }
        }
        SubmissionTargets { targets, failures }
    }

    /// Switch back to the primary if we are failed over and it answers a
    /// fresh probe. Returns whether the switch happened.
    pub async fn try_restore_primary(&self) -> bool {
        if !self.is_failed_over() {
            return false;
        }
        let primary = Arc::clone(self.roster.primary());
        if !self.check_health(primary.as_ref()).await {
            tracing::debug!(primary = %primary.id(), "primary still unavailable");
            return false;
        }
        self.failed_over.store(false, Ordering::SeqCst);
        *lock(&self.active) = Some(primary.id().clone());
        tracing::info!(primary = %primary.id(), "primary restored");
        true
    }

    pub fn node_status(&self) -> NodeStatusReport {
        let active = self.active_node_id();
        let table = lock(&self.health);
        let nodes = self
            .roster
            .nodes()
            .iter()
            .map(|n| NodeStatusEntry {
                descriptor: n.descriptor().clone(),
                health: table.get(n.id()).cloned().unwrap_or_default(),
                active: active.as_ref() == Some(n.id()),
            })
            .collect();
        NodeStatusReport {
            failed_over: self.is_failed_over(),
            active,
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotguard_nullables::NullLedgerNode;

    struct Fixture {
        primary: Arc<NullLedgerNode>,
        backup: Arc<NullLedgerNode>,
        monitor: NodeHealthMonitor,
    }

    fn fixture() -> Fixture {
        let primary = Arc::new(NullLedgerNode::new("primary", 0));
        let backup = Arc::new(NullLedgerNode::new("backup", 1));
        let roster = NodeRoster::new(vec![
            primary.clone() as Arc<dyn LedgerNode>,
            backup.clone() as Arc<dyn LedgerNode>,
        ])
        .unwrap();
        let monitor = NodeHealthMonitor::new(roster, HealthTable::default(), Duration::from_secs(3));
        Fixture {
            primary,
            backup,
            monitor,
        }
    }

    #[tokio::test]
    async fn healthy_primary_is_selected() {
        let f = fixture();
        let node = f.monitor.select_active_node().await.unwrap();
        assert_eq!(node.id(), &NodeId::new("primary"));
        assert!(!f.monitor.is_failed_over());
        assert_eq!(f.backup.calls().probes, 0);
    }

    #[tokio::test]
    async fn failure_counter_and_reset() {
        let f = fixture();
        f.primary.set_reachable(false);
        for expected in 1..=3 {
            assert!(!f.monitor.check_health(f.primary.as_ref()).await);
            let h = f.monitor.health_of(&NodeId::new("primary")).unwrap();
            assert_eq!(h.consecutive_failures, expected);
            assert!(!h.healthy);
            assert!(h.last_error.unwrap().contains("connection refused"));
        }
        f.primary.set_reachable(true);
        assert!(f.monitor.check_health(f.primary.as_ref()).await);
        let h = f.monitor.health_of(&NodeId::new("primary")).unwrap();
        assert_eq!(h.consecutive_failures, 0);
        assert!(h.last_response_time_ms.is_some());
    }

    #[tokio::test]
    async fn fails_over_and_restores() {
        let f = fixture();
        f.primary.set_reachable(false);

        let node = f.monitor.select_active_node().await.unwrap();
        assert_eq!(node.id(), &NodeId::new("backup"));
        assert!(f.monitor.is_failed_over());

        assert!(!f.monitor.try_restore_primary().await);
        assert!(f.monitor.is_failed_over());

        f.primary.set_reachable(true);
        assert!(f.monitor.try_restore_primary().await);
        assert!(!f.monitor.is_failed_over());
        assert_eq!(f.monitor.active_node_id(), Some(NodeId::new("primary")));
    }

    #[tokio::test]
    async fn restore_is_a_no_op_when_not_failed_over() {
        let f = fixture();
        assert!(!f.monitor.try_restore_primary().await);
        assert_eq!(f.primary.calls().probes, 0);
    }

    #[tokio::test]
    async fn no_nodes_available_lists_every_failure() {
        let f = fixture();
        f.primary.set_reachable(false);
        f.backup.set_reachable(false);

        let err = f.monitor.select_active_node().await.err().unwrap();
        let FailoverError::NoNodesAvailable { failures } = &err else {
            panic!("unexpected error {err}");
        };
        let ids: Vec<_> = failures.iter().map(|f| f.node.as_str()).collect();
        assert_eq!(ids, vec!["primary", "backup"]);
        assert!(err.to_string().contains("primary: node primary unreachable"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_is_unhealthy_within_timeout() {
        let f = fixture();
        f.primary.hang_probes();

        let started = Instant::now();
        let node = f.monitor.select_active_node().await.unwrap();

        assert_eq!(node.id(), &NodeId::new("backup"));
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
        let h = f.monitor.health_of(&NodeId::new("primary")).unwrap();
        assert!(h.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn submission_targets_include_healthy_backups() {
        let f = fixture();
        let t = f.monitor.submission_targets().await;
        let ids: Vec<_> = t.targets.iter().map(|n| n.id().clone()).collect();
        assert_eq!(ids, vec![NodeId::new("primary"), NodeId::new("backup")]);
        assert!(t.failures.is_empty());

        f.backup.set_reachable(false);
        let t = f.monitor.submission_targets().await;
        assert_eq!(t.targets.len(), 1);
        assert_eq!(t.failures[0].node, NodeId::new("backup"));

        f.primary.set_reachable(false);
        f.backup.set_reachable(true);
        let t = f.monitor.submission_targets().await;
        assert_eq!(t.targets[0].id(), &NodeId::new("backup"));
        assert_eq!(t.failures[0].node, NodeId::new("primary"));
    }

    #[tokio::test]
    async fn status_marks_active_node() {
        let f = fixture();
        f.primary.set_reachable(false);
        f.monitor.select_active_node().await.unwrap();

        let status = f.monitor.node_status();
        assert!(status.failed_over);
        assert_eq!(status.active, Some(NodeId::new("backup")));
        assert!(!status.nodes[0].active);
        assert!(!status.nodes[0].health.healthy);
        assert!(status.nodes[1].active);
    }

    #[tokio::test]
    async fn recorded_submit_failure_marks_unhealthy() {
        let f = fixture();
        f.monitor.select_active_node().await.unwrap();
        f.monitor.record_failure(&NodeId::new("primary"), "reverted");
        let h = f.monitor.health_of(&NodeId::new("primary")).unwrap();
        assert!(!h.healthy);
        assert_eq!(h.consecutive_failures, 1);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]

        /// After any number of failed primary probes the backup is chosen;
        /// the first successful probe afterwards restores the primary.
        #[test]
        fn failover_then_restore(failed_probes in 1u32..10) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let f = fixture();
                f.primary.set_reachable(false);
                for _ in 0..failed_probes {
                    let node = f.monitor.select_active_node().await.unwrap();
                    assert_eq!(node.id(), &NodeId::new("backup"));
                }
                let h = f.monitor.health_of(&NodeId::new("primary")).unwrap();
                assert_eq!(h.consecutive_failures, failed_probes);

                f.primary.set_reachable(true);
                assert!(f.monitor.try_restore_primary().await);
                let node = f.monitor.select_active_node().await.unwrap();
                assert_eq!(node.id(), &NodeId::new("primary"));
            });
        }
    }
}
