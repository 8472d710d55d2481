//! Prometheus metrics for vote replication.
//!
//! [`ReplicatorMetrics`] owns a dedicated [`Registry`]; the HTTP API's
//! `/metrics` route renders it in the text exposition format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

pub struct ReplicatorMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Ballots that passed validation and entered `submit_vote`.
    pub votes_submitted: IntCounter,
    /// Ballots at least one ledger node accepted.
    pub votes_on_ledger: IntCounter,
    /// Successful emergency ledger writes on the vote path.
    pub emergency_writes: IntCounter,
    /// Writes that fell back to the `last_resort` retry.
    pub last_resort_writes: IntCounter,
    /// Ballots neither a node nor the emergency ledger accepted.
    pub vote_failures: IntCounter,
    /// Emergency-to-node passes that ran (not skipped).
    pub sync_passes: IntCounter,
    /// Records that reached `blockchain_synced` during reconciliation.
    pub records_synced: IntCounter,
    /// Records restored from nodes into the emergency ledger.
    pub records_backfilled: IntCounter,
    /// Switches from the primary to a lower-priority node.
    pub failovers: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Records not yet held by every node.
    pub pending_emergency_records: IntGauge,
}

impl ReplicatorMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| {
            register_int_counter_with_registry!(Opts::new(name, help), registry)
                .expect("static counter names register once")
        };

        let votes_submitted = counter(
            "ballotguard_votes_submitted_total",
            "Ballots accepted for submission",
        );
        let votes_on_ledger = counter(
            "ballotguard_votes_on_ledger_total",
            "Ballots recorded by at least one ledger node",
        );
        let emergency_writes = counter(
            "ballotguard_emergency_writes_total",
            "Successful emergency ledger writes on the vote path",
        );
        let last_resort_writes = counter(
            "ballotguard_last_resort_writes_total",
            "Emergency writes that needed the last_resort retry",
        );
        let vote_failures = counter(
            "ballotguard_vote_failures_total",
            "Ballots no node and no emergency write accepted",
        );
        let sync_passes = counter(
            "ballotguard_sync_passes_total",
            "Emergency-to-node reconciliation passes run",
        );
        let records_synced = counter(
            "ballotguard_records_synced_total",
            "Emergency records confirmed on every node by reconciliation",
        );
        let records_backfilled = counter(
            "ballotguard_records_backfilled_total",
            "Records restored from ledger nodes into the emergency ledger",
        );
        let failovers = counter(
            "ballotguard_failovers_total",
            "Switches away from the primary ledger node",
        );

        let pending_emergency_records = register_int_gauge_with_registry!(
            Opts::new(
                "ballotguard_pending_emergency_records",
                "Emergency records not yet on every ledger node"
            ),
            registry
        )
        .expect("failed to register pending_emergency_records gauge");

        Self {
            registry,
            votes_submitted,
            votes_on_ledger,
            emergency_writes,
            last_resort_writes,
            vote_failures,
            sync_passes,
            records_synced,
            records_backfilled,
            failovers,
            pending_emergency_records,
        }
    }

    /// Render every metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for ReplicatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
