#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ballotguard_election::ElectionStateMachine;
use ballotguard_emergency::EmergencyStore;
use ballotguard_ledger_client::{LedgerNode, ReceiptWaitOptions};
use ballotguard_nullables::{NullEmergencyStore, NullLedgerNode};
use ballotguard_replicator::{ReplicatorMetrics, ReplicatorParts, ReplicatorSettings, VoteReplicator};
use ballotguard_types::{
    Ballot, LedgerReceipt, NodeId, Provenance, ReceiptStatus, Selection, Timestamp, VoteRecord,
};

pub fn settings() -> ReplicatorSettings {
    ReplicatorSettings {
        sync_interval: Duration::from_secs(30),
        record_delay: Duration::ZERO,
        probe_timeout: Duration::from_millis(200),
        receipt: ReceiptWaitOptions {
            max_attempts: 5,
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        },
    }
}

pub fn ballot(n: u32) -> Ballot {
    Ballot {
        voter_id: format!("voter-{n}"),
        voter_hash: format!("hash-{n}"),
        ballot_id: format!("ballot-{n}"),
        selections: vec![Selection {
            candidate_id: "cand-a".into(),
            position: "President".into(),
        }],
        empty_positions: vec!["Treasurer".into()],
        timestamp: Timestamp::from_millis(1_700_000_000_000 + n as u64),
    }
}

pub fn pending_record(n: u32, provenance: Provenance) -> VoteRecord {
    VoteRecord::from_ballot(&ballot(n), provenance, Vec::new())
}

pub fn receipt(node: &str, tx_hash: &str) -> LedgerReceipt {
    LedgerReceipt {
        node_id: NodeId::new(node),
        tx_hash: tx_hash.into(),
        block_number: None,
        gas_used: None,
        status: ReceiptStatus::Success,
    }
}

/// A replicator over two in-memory nodes and an in-memory emergency store.
pub struct Harness {
    pub primary: Arc<NullLedgerNode>,
    pub backup: Arc<NullLedgerNode>,
    pub emergency: Arc<NullEmergencyStore>,
    pub election: Arc<ElectionStateMachine>,
    pub replicator: Arc<VoteReplicator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_nodes(NullLedgerNode::new("primary", 0), NullLedgerNode::new("backup", 1))
    }

    pub fn with_nodes(primary: NullLedgerNode, backup: NullLedgerNode) -> Self {
        Self::build(primary, backup, settings())
    }

    pub fn with_settings(settings: ReplicatorSettings) -> Self {
        Self::build(NullLedgerNode::new("primary", 0), NullLedgerNode::new("backup", 1), settings)
    }

    pub fn build(primary: NullLedgerNode, backup: NullLedgerNode, settings: ReplicatorSettings) -> Self {
        let primary = Arc::new(primary);
        let backup = Arc::new(backup);
        let emergency = Arc::new(NullEmergencyStore::new());
        let election = Arc::new(ElectionStateMachine::new());
        let nodes = vec![
            primary.clone() as Arc<dyn LedgerNode>,
            backup.clone() as Arc<dyn LedgerNode>,
        ];
        let replicator = VoteReplicator::new(
            settings,
            ReplicatorParts {
                nodes,
                health: Default::default(),
                emergency: emergency.clone() as Arc<dyn EmergencyStore>,
                election: election.clone(),
                metrics: Arc::new(ReplicatorMetrics::new()),
            },
        )
        .unwrap();
        Self {
            primary,
            backup,
            emergency,
            election,
            replicator: Arc::new(replicator),
        }
    }

    /// Same as `new` with the election already voting.
    pub fn voting() -> Self {
        let harness = Self::new();
        harness.election.start().unwrap();
        harness
    }

    pub fn node_calls(&self) -> u32 {
        self.primary.calls().total() + self.backup.calls().total()
    }

    pub fn stored(&self, ballot_id: &str) -> VoteRecord {
        self.emergency
            .votes()
            .into_iter()
            .find(|v| v.ballot_id == ballot_id)
            .unwrap()
    }
}
