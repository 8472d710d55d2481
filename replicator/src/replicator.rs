//! The vote path, queries and administrative resets.
//!
//! Reconciliation lives in the private `sync` module; both share the state
//! held by [`VoteReplicator`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ballotguard_election::ElectionStateMachine;
use ballotguard_emergency::{EmergencyStats, EmergencyStore};
use ballotguard_failover::{
    HealthTable, NodeFailure, NodeHealthMonitor, NodeRoster, NodeStatusReport,
};
use ballotguard_ledger_client::{LedgerNode, LedgerNodeError, ReceiptWaitOptions, ReceiptWaiter};
use ballotguard_types::{
    Ballot, ChainInfo, ElectionResults, ElectionState, ElectionStatus, LedgerReceipt, NodeId,
    Provenance, ReceiptStatus, VoteRecord,
};
use tokio::sync::{Mutex, Notify};

use crate::{EmergencyWrite, ReplicatorError, ReplicatorMetrics, ResetReport, SubmitOutcome};

/// Timing knobs, usually from [`crate::ReplicatorConfig::settings`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplicatorSettings {
    pub sync_interval: Duration,
    pub record_delay: Duration,
    pub probe_timeout: Duration,
    pub receipt: ReceiptWaitOptions,
}

impl Default for ReplicatorSettings {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            record_delay: Duration::from_millis(250),
            probe_timeout: Duration::from_secs(3),
            receipt: ReceiptWaitOptions::default(),
        }
    }
}

/// Collaborators injected into the replicator.
pub struct ReplicatorParts {
    /// Every configured node; disabled ones are kept only so resets can
    /// report them.
    pub nodes: Vec<Arc<dyn LedgerNode>>,
    pub health: HealthTable,
    pub emergency: Arc<dyn EmergencyStore>,
    pub election: Arc<ElectionStateMachine>,
    pub metrics: Arc<ReplicatorMetrics>,
}

pub struct VoteReplicator {
    pub(crate) settings: ReplicatorSettings,
    pub(crate) monitor: NodeHealthMonitor,
    pub(crate) disabled: Vec<NodeId>,
    pub(crate) emergency: Arc<dyn EmergencyStore>,
    pub(crate) election: Arc<ElectionStateMachine>,
    pub(crate) metrics: Arc<ReplicatorMetrics>,
    /// Held by a running reconciliation pass, and by a reset for its whole
    /// duration.
    pub(crate) sync_lane: Mutex<()>,
    pub(crate) sync_wakeup: Notify,
    /// Bumped when a reset starts; a pass that sees it change stops.
    pub(crate) reset_epoch: AtomicU64,
    /// Cuts a pass's between-record delay short when a reset starts.
    pub(crate) sync_interrupt: Notify,
}

/// A duplicate-ballot rejection that names the original transaction proves
/// the node holds the vote.
pub(crate) fn receipt_from_duplicate(err: &LedgerNodeError) -> Option<LedgerReceipt> {
    match err {
        LedgerNodeError::DuplicateBallot {
            node,
            tx_hash: Some(tx_hash),
            ..
        } => Some(LedgerReceipt {
            node_id: node.clone(),
            tx_hash: tx_hash.clone(),
            block_number: None,
            gas_used: None,
            status: ReceiptStatus::Success,
        }),
        _ => None,
    }
}

/// Whether every enabled node holds one of `receipts`.
pub(crate) fn covers_roster(roster: &NodeRoster, receipts: &[LedgerReceipt]) -> bool {
    roster
        .nodes()
        .iter()
        .all(|n| receipts.iter().any(|r| &r.node_id == n.id()))
}

/// Whether a failed node call says the node itself is in trouble.
pub(crate) fn marks_unhealthy(err: &LedgerNodeError) -> bool {
    !matches!(
        err,
        LedgerNodeError::DuplicateBallot { .. } | LedgerNodeError::Rejected { .. }
    )
}

impl VoteReplicator {
    pub fn new(settings: ReplicatorSettings, parts: ReplicatorParts) -> Result<Self, ReplicatorError> {
        let disabled = parts
            .nodes
            .iter()
            .filter(|n| !n.descriptor().enabled)
            .map(|n| n.id().clone())
            .collect();
        let roster = NodeRoster::new(parts.nodes)?;
        let monitor = NodeHealthMonitor::new(roster, parts.health, settings.probe_timeout);

        Ok(Self {
            settings,
            monitor,
            disabled,
            emergency: parts.emergency,
            election: parts.election,
            metrics: parts.metrics,
            sync_lane: Mutex::new(()),
            sync_wakeup: Notify::new(),
            reset_epoch: AtomicU64::new(0),
            sync_interrupt: Notify::new(),
        })
    }

    pub fn settings(&self) -> &ReplicatorSettings {
        &self.settings
    }

    pub fn monitor(&self) -> &NodeHealthMonitor {
        &self.monitor
    }

    pub fn election(&self) -> &Arc<ElectionStateMachine> {
        &self.election
    }

    pub fn metrics(&self) -> &Arc<ReplicatorMetrics> {
        &self.metrics
    }

    pub fn election_state(&self) -> ElectionState {
        self.election.state()
    }

    /// Ask the background loop for a reconciliation pass without waiting
    /// for it.
    pub fn schedule_sync(&self) {
        self.sync_wakeup.notify_one();
    }

    pub(crate) fn note_failover(&self, was_failed_over: bool) {
        if !was_failed_over && self.monitor.is_failed_over() {
            self.metrics.failovers.inc();
        }
    }

    pub(crate) async fn refresh_pending_gauge(&self) {
        if let Ok(stats) = self.emergency.stats().await {
            self.metrics
                .pending_emergency_records
                .set(stats.pending_votes as i64);
        }
    }

    /// Record a vote on every healthy ledger node and in the emergency
    /// ledger.
    ///
    /// Succeeds when at least one node or the emergency ledger accepted the
    /// vote. Only then may the caller mark the voter as having voted.
    pub async fn submit_vote(&self, ballot: Ballot) -> Result<SubmitOutcome, ReplicatorError> {
        ballot.validate().map_err(ReplicatorError::InvalidBallot)?;
        self.metrics.votes_submitted.inc();

        let was_failed_over = self.monitor.is_failed_over();
        let targets = self.monitor.submission_targets().await;
        self.note_failover(was_failed_over);

        let mut errors: Vec<String> = targets.failures.iter().map(ToString::to_string).collect();
        let mut receipts = Vec::new();
        for node in &targets.targets {
            match node.submit_vote(&ballot).await {
                Ok(receipt) => {
                    tracing::info!(
                        node = %node.id(),
                        ballot_id = %ballot.ballot_id,
                        tx = %receipt.tx_hash,
                        "vote submitted"
                    );
                    receipts.push(receipt);
                }
                Err(e) => match receipt_from_duplicate(&e) {
                    Some(receipt) => {
                        tracing::info!(node = %node.id(), ballot_id = %ballot.ballot_id, "ballot already on node");
                        receipts.push(receipt);
                    }
                    None => {
                        tracing::warn!(node = %node.id(), ballot_id = %ballot.ballot_id, "submission failed: {e}");
                        if marks_unhealthy(&e) {
                            self.monitor.record_failure(node.id(), &e.to_string());
                        }
                        errors.push(e.to_string());
                    }
                },
            }
        }

        let provenance = if covers_roster(self.monitor.roster(), &receipts) {
            Provenance::BlockchainSynced
        } else if receipts.is_empty() {
            Provenance::LastResort
        } else {
            Provenance::Emergency
        };

        let record = VoteRecord::from_ballot(&ballot, provenance, receipts.clone());
        let emergency = self.backstop(record, &mut errors).await;

        if receipts.is_empty() && !emergency.saved {
            self.metrics.vote_failures.inc();
            tracing::error!(ballot_id = %ballot.ballot_id, errors = errors.len(), "vote not recorded anywhere");
            return Err(ReplicatorError::VoteNotRecorded { errors });
        }

        if !receipts.is_empty() {
            self.metrics.votes_on_ledger.inc();
            if emergency.saved {
                self.schedule_sync();
            }
        }
        self.refresh_pending_gauge().await;

        Ok(SubmitOutcome {
            ballot_id: ballot.ballot_id,
            ledger_receipts: receipts,
            emergency,
            errors,
        })
    }

    /// The always-attempted emergency write, with one `last_resort` retry.
    async fn backstop(&self, record: VoteRecord, errors: &mut Vec<String>) -> EmergencyWrite {
        let retry = VoteRecord {
            provenance: Provenance::LastResort,
            ..record.clone()
        };

        match self.emergency.try_save_vote(record).await {
            Ok(stored) => {
                self.metrics.emergency_writes.inc();
                return EmergencyWrite {
                    saved: true,
                    provenance: Some(stored.provenance),
                };
            }
            Err(e) => {
                tracing::error!(ballot_id = %retry.ballot_id, "emergency write failed, retrying as last resort: {e}");
                errors.push(format!("emergency ledger: {e}"));
            }
        }

        match self.emergency.try_save_vote(retry).await {
            Ok(stored) => {
                self.metrics.emergency_writes.inc();
                self.metrics.last_resort_writes.inc();
                EmergencyWrite {
                    saved: true,
                    provenance: Some(stored.provenance),
                }
            }
            Err(e) => {
                tracing::error!("last resort emergency write failed: {e}");
                errors.push(format!("emergency ledger (last resort): {e}"));
                EmergencyWrite {
                    saved: false,
                    provenance: None,
                }
            }
        }
    }

    /// Select the active node and run `query` on it, marking the node
    /// unhealthy if the query fails for node reasons.
    async fn on_active_node<T, F, Fut>(&self, query: F) -> Result<T, ReplicatorError>
    where
        F: FnOnce(Arc<dyn LedgerNode>) -> Fut,
        Fut: std::future::Future<Output = Result<T, LedgerNodeError>>,
    {
        let was_failed_over = self.monitor.is_failed_over();
        let node = self.monitor.select_active_node().await?;
        self.note_failover(was_failed_over);

        let id = node.id().clone();
        query(node).await.map_err(|e| {
            if marks_unhealthy(&e) {
                self.monitor.record_failure(&id, &e.to_string());
            }
            e.into()
        })
    }

    pub async fn get_blockchain_info(&self) -> Result<ChainInfo, ReplicatorError> {
        self.on_active_node(|node| async move { node.chain_info().await })
            .await
    }

    pub async fn get_election_results(&self) -> Result<ElectionResults, ReplicatorError> {
        self.on_active_node(|node| async move { node.election_results().await })
            .await
    }

    /// Look a transaction up on the active node. `Ok(None)` while unknown
    /// or not yet mined.
    pub async fn verify_transaction(
        &self,
        tx_hash: &str,
    ) -> Result<Option<LedgerReceipt>, ReplicatorError> {
        let tx_hash = tx_hash.to_string();
        self.on_active_node(|node| async move { node.transaction_receipt(&tx_hash).await })
            .await
    }

    pub fn get_node_status(&self) -> NodeStatusReport {
        self.monitor.node_status()
    }

    pub async fn emergency_stats(&self) -> Result<EmergencyStats, ReplicatorError> {
        Ok(self.emergency.stats().await?)
    }

    /// Poll `node` (or the active node) until `tx_hash` is mined.
    pub async fn wait_for_receipt(
        &self,
        node: Option<&NodeId>,
        tx_hash: &str,
        options: Option<ReceiptWaitOptions>,
    ) -> Result<LedgerReceipt, ReplicatorError> {
        let node = match node {
            Some(id) => self
                .monitor
                .roster()
                .get(id)
                .cloned()
                .ok_or_else(|| ReplicatorError::UnknownNode(id.clone()))?,
            None => self.monitor.select_active_node().await?,
        };
        let waiter = ReceiptWaiter::new(options.unwrap_or(self.settings.receipt));
        Ok(waiter.wait_for_receipt(node.as_ref(), tx_hash).await?)
    }

    /// Clear the emergency ledger and every enabled node's tallies.
    ///
    /// Runs unconditionally; callers are responsible for authorization.
    /// Nodes that could not be reset are listed with the reason.
    ///
    /// A reconciliation pass in flight is stopped and waited for first, and
    /// no pass can start until the reset is done.
    pub async fn reset_voting_data(&self) -> Result<ResetReport, ReplicatorError> {
        self.reset_epoch.fetch_add(1, Ordering::AcqRel);
        self.sync_interrupt.notify_waiters();
        let _lane = self.sync_lane.lock().await;

        let mut report = ResetReport::default();

        match self.emergency.clear().await {
            Ok(()) => report.emergency_cleared = true,
            Err(e) => {
                tracing::error!("emergency ledger not cleared: {e}");
                report.emergency_error = Some(e.to_string());
            }
        }

        for node in self.monitor.roster().nodes() {
            match node.reset_votes().await {
                Ok(()) => {
                    tracing::warn!(node = %node.id(), "node tallies reset");
                    report.nodes_reset.push(node.id().clone());
                }
                Err(LedgerNodeError::Unsupported { .. }) => {
                    tracing::warn!(node = %node.id(), "contract has no reset entry point; only local data cleared");
                    report.nodes_not_reset.push(NodeFailure {
                        node: node.id().clone(),
                        reason: "contract has no reset entry point".into(),
                    });
                }
                Err(e) => {
                    tracing::error!(node = %node.id(), "node reset failed: {e}");
                    report.nodes_not_reset.push(NodeFailure {
                        node: node.id().clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        for id in &self.disabled {
            report.nodes_not_reset.push(NodeFailure {
                node: id.clone(),
                reason: "node disabled in configuration".into(),
            });
        }

        self.refresh_pending_gauge().await;
        Ok(report)
    }

    /// Reset a finished election's data and return it to `not_started`.
    pub async fn force_reset_when_finished(&self) -> Result<ResetReport, ReplicatorError> {
        let status = self.election.status();
        if status != ElectionStatus::Finished {
            return Err(ReplicatorError::ElectionNotFinished { status });
        }
        let mut report = self.reset_voting_data().await?;
        self.election.reset()?;
        report.election_reset = true;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotguard_nullables::NullLedgerNode;

    fn receipt(node: &str) -> LedgerReceipt {
        LedgerReceipt {
            node_id: NodeId::new(node),
            tx_hash: format!("0x{node}"),
            block_number: None,
            gas_used: None,
            status: ReceiptStatus::Success,
        }
    }

    #[test]
    fn roster_coverage_counts_nodes_not_receipts() {
        let roster = NodeRoster::new(vec![
            Arc::new(NullLedgerNode::new("primary", 0)) as Arc<dyn LedgerNode>,
            Arc::new(NullLedgerNode::new("backup", 1)) as Arc<dyn LedgerNode>,
        ])
        .unwrap();

        assert!(!covers_roster(&roster, &[receipt("primary"), receipt("primary")]));
        assert!(!covers_roster(&roster, &[receipt("primary"), receipt("elsewhere")]));
        assert!(covers_roster(&roster, &[receipt("backup"), receipt("primary")]));
    }
}
