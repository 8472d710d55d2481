//! Background reconciliation between the emergency ledger and the nodes.
//!
//! Both directions share one single-flight lane and only run while the
//! election is voting or paused. A finished election freezes pending
//! records where they are until an administrative reset.
//!
//! A pass never writes a record back wholesale. It attaches the receipts it
//! gained to whatever the emergency ledger holds for the ballot at save
//! time, so votes rewritten mid-pass keep their content and ballots cleared
//! by a reset stay cleared.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use ballotguard_types::{NodeId, Provenance, VoteRecord};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::replicator::{covers_roster, marks_unhealthy, receipt_from_duplicate};
use crate::{
    BackfillReport, ReconcileReport, ReplicatorError, SkipReason, SyncReport, VoteReplicator,
};

enum RecordOutcome {
    Synced,
    Partial,
    Unchanged,
}

impl VoteReplicator {
    /// Push pending emergency records to every enabled node missing them.
    pub async fn sync_emergency_to_nodes(&self) -> Result<SyncReport, ReplicatorError> {
        let Ok(_lane) = self.sync_lane.try_lock() else {
            tracing::debug!("reconciliation already running");
            return Ok(SyncReport::skipped(SkipReason::AlreadyRunning));
        };
        self.push_pending().await
    }

    /// Insert ballots the nodes hold but the emergency ledger lacks.
    pub async fn sync_nodes_to_emergency(&self) -> Result<BackfillReport, ReplicatorError> {
        let Ok(_lane) = self.sync_lane.try_lock() else {
            tracing::debug!("reconciliation already running");
            return Ok(BackfillReport::skipped(SkipReason::AlreadyRunning));
        };
        self.pull_missing().await
    }

    /// One background tick: switch back to the primary if possible, then
    /// reconcile both directions in a single lane. A closed election makes
    /// no node calls at all, restore probes included.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ReplicatorError> {
        let restored_primary =
            self.election.sync_allowed() && self.monitor.try_restore_primary().await;

        let Ok(_lane) = self.sync_lane.try_lock() else {
            return Ok(ReconcileReport {
                restored_primary,
                to_nodes: SyncReport::skipped(SkipReason::AlreadyRunning),
                from_nodes: BackfillReport::skipped(SkipReason::AlreadyRunning),
            });
        };
        let to_nodes = self.push_pending().await?;
        let from_nodes = self.pull_missing().await?;
        Ok(ReconcileReport {
            restored_primary,
            to_nodes,
            from_nodes,
        })
    }

    async fn push_pending(&self) -> Result<SyncReport, ReplicatorError> {
        if !self.election.sync_allowed() {
            tracing::debug!(status = %self.election.status(), "sync to nodes skipped: election closed");
            return Ok(SyncReport::skipped(SkipReason::ElectionClosed));
        }

        let pending = self.emergency.pending_votes().await?;
        let mut report = SyncReport {
            pending: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }
        self.metrics.sync_passes.inc();
        tracing::info!(pending = pending.len(), "syncing emergency records to nodes");

        let epoch = self.reset_epoch.load(Ordering::Acquire);
        // nodes that failed for connectivity are skipped for the rest of the pass
        let mut unreachable: HashSet<NodeId> = HashSet::new();
        let mut pending = pending.into_iter().peekable();
        while let Some(record) = pending.next() {
            if let Some(reason) = self.pass_interrupted(epoch) {
                tracing::info!("{reason}, stopping sync");
                report.stopped_early = true;
                break;
            }
            match self
                .sync_record(record, epoch, &mut unreachable, &mut report.errors)
                .await
            {
                Ok(RecordOutcome::Synced) => report.synced += 1,
                Ok(RecordOutcome::Partial) => report.partially_synced += 1,
                Ok(RecordOutcome::Unchanged) => {}
                Err(e) => report.errors.push(e.to_string()),
            }
            if pending.peek().is_some() {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.record_delay) => {}
                    _ = self.sync_interrupt.notified() => {}
                }
            }
        }

        self.metrics.records_synced.inc_by(report.synced as u64);
        self.refresh_pending_gauge().await;
        tracing::info!(
            synced = report.synced,
            partial = report.partially_synced,
            errors = report.errors.len(),
            "sync to nodes finished"
        );
        Ok(report)
    }

    /// Why the running pass must stop, if it must.
    fn pass_interrupted(&self, epoch: u64) -> Option<&'static str> {
        if self.reset_epoch.load(Ordering::Acquire) != epoch {
            Some("reset requested mid-pass")
        } else if !self.election.sync_allowed() {
            Some("election closed mid-pass")
        } else {
            None
        }
    }

    async fn sync_record(
        &self,
        mut record: VoteRecord,
        epoch: u64,
        unreachable: &mut HashSet<NodeId>,
        errors: &mut Vec<String>,
    ) -> Result<RecordOutcome, ReplicatorError> {
        let roster = self.monitor.roster();
        let ballot = record.to_ballot();
        let mut gained = Vec::new();

        for node in roster.nodes() {
            if record.receipt_from(node.id()).is_some() || unreachable.contains(node.id()) {
                continue;
            }
            if self.pass_interrupted(epoch).is_some() {
                return Ok(RecordOutcome::Unchanged);
            }
            let receipt = match node.submit_vote(&ballot).await {
                Ok(receipt) => receipt,
                Err(e) => match receipt_from_duplicate(&e) {
                    Some(receipt) => receipt,
                    None => {
                        tracing::warn!(node = %node.id(), ballot_id = %record.ballot_id, "sync submission failed: {e}");
                        if e.is_connectivity() {
                            unreachable.insert(node.id().clone());
                        }
                        if marks_unhealthy(&e) {
                            self.monitor.record_failure(node.id(), &e.to_string());
                        }
                        errors.push(e.to_string());
                        continue;
                    }
                },
            };
            record.put_receipt(receipt.clone());
            gained.push(receipt);
        }

        if gained.is_empty() && !covers_roster(roster, &record.receipts) {
            return Ok(RecordOutcome::Unchanged);
        }
        if self.reset_epoch.load(Ordering::Acquire) != epoch {
            return Ok(RecordOutcome::Unchanged);
        }

        let required: Vec<NodeId> = roster.nodes().iter().map(|n| n.id().clone()).collect();
        let Some(stored) = self
            .emergency
            .record_receipts(&record.ballot_id, gained, &required)
            .await?
        else {
            tracing::debug!(ballot_id = %record.ballot_id, "record no longer stored, receipts dropped");
            return Ok(RecordOutcome::Unchanged);
        };
        tracing::debug!(ballot_id = %stored.ballot_id, provenance = %stored.provenance, "record reconciled");
        Ok(if stored.provenance == Provenance::BlockchainSynced {
            RecordOutcome::Synced
        } else {
            RecordOutcome::Partial
        })
    }

    async fn pull_missing(&self) -> Result<BackfillReport, ReplicatorError> {
        if !self.election.sync_allowed() {
            tracing::debug!(status = %self.election.status(), "sync from nodes skipped: election closed");
            return Ok(BackfillReport::skipped(SkipReason::ElectionClosed));
        }

        let targets = self.monitor.submission_targets().await;
        let mut report = BackfillReport {
            errors: targets.failures.iter().map(ToString::to_string).collect(),
            ..Default::default()
        };

        for node in &targets.targets {
            let votes = match node.recorded_votes().await {
                Ok(votes) => votes,
                Err(e) => {
                    tracing::warn!(node = %node.id(), "could not read recorded votes: {e}");
                    report.errors.push(e.to_string());
                    continue;
                }
            };
            report.seen += votes.len();
            for vote in &votes {
                let record = VoteRecord::from_ledger_vote(node.id(), vote);
                match self.emergency.insert_if_absent(record).await {
                    Ok(true) => report.inserted += 1,
                    Ok(false) => {}
                    Err(e) => report.errors.push(e.to_string()),
                }
            }
        }

        if report.inserted > 0 {
            self.metrics.records_backfilled.inc_by(report.inserted as u64);
            tracing::info!(inserted = report.inserted, "emergency ledger backfilled from nodes");
        }
        Ok(report)
    }

    /// Run reconciliation every `sync_interval` and whenever a vote path
    /// schedules it, until shutdown.
    pub fn run_background(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let replicator = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(replicator.settings.sync_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        tracing::info!("reconciliation loop shutting down");
                        break;
                    }
                    _ = interval.tick() => {}
                    _ = replicator.sync_wakeup.notified() => {}
                }
                match replicator.reconcile().await {
                    Ok(report) => tracing::debug!(
                        restored_primary = report.restored_primary,
                        synced = report.to_nodes.synced,
                        backfilled = report.from_nodes.inserted,
                        "reconciliation tick"
                    ),
                    Err(e) => tracing::error!("reconciliation tick failed: {e}"),
                }
            }
        })
    }
}
