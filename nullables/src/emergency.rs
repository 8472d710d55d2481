//! Nullable emergency store: in-memory, with injectable write failures.

use std::sync::Mutex;

use async_trait::async_trait;
use ballotguard_emergency::{
    attach_receipts, upsert_vote, EmergencyError, EmergencyStats, EmergencyStore, LedgerContents,
};
use ballotguard_types::{ElectionState, LedgerReceipt, NodeId, Timestamp, VoteRecord};

struct State {
    contents: LedgerContents,
    /// Remaining writes to fail; `u32::MAX` fails forever.
    failing_writes: u32,
    write_attempts: u32,
}

pub struct NullEmergencyStore {
    state: Mutex<State>,
}

impl NullEmergencyStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                contents: LedgerContents::empty(Timestamp::EPOCH, ElectionState::default()),
                failing_writes: 0,
                write_attempts: 0,
            }),
        }
    }

    /// Fail the next `n` writes.
    pub fn fail_next_writes(&self, n: u32) {
        self.state.lock().unwrap().failing_writes = n;
    }

    pub fn fail_all_writes(&self) {
        self.fail_next_writes(u32::MAX);
    }

    pub fn set_election_snapshot(&self, snapshot: ElectionState) {
        self.state.lock().unwrap().contents.metadata.election_state = snapshot;
    }

    pub fn write_attempts(&self) -> u32 {
        self.state.lock().unwrap().write_attempts
    }

    pub fn votes(&self) -> Vec<VoteRecord> {
        self.state.lock().unwrap().contents.votes.clone()
    }

    /// Count the write and fail it if a failure is armed.
    fn begin_write(state: &mut State) -> Result<(), EmergencyError> {
        state.write_attempts += 1;
        if state.failing_writes == 0 {
            return Ok(());
        }
        if state.failing_writes != u32::MAX {
            state.failing_writes -= 1;
        }
        Err(EmergencyError::WriteFailed("disk full".into()))
    }

    fn finish_write(state: &mut State) {
        state.contents.metadata.total_votes = state.contents.votes.len();
        state.contents.metadata.last_updated = Timestamp::now();
    }
}

impl Default for NullEmergencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmergencyStore for NullEmergencyStore {
    async fn try_save_vote(&self, record: VoteRecord) -> Result<VoteRecord, EmergencyError> {
        let mut state = self.state.lock().unwrap();
        Self::begin_write(&mut state)?;
        let stored = upsert_vote(&mut state.contents.votes, record, Timestamp::now());
        Self::finish_write(&mut state);
        Ok(stored)
    }

    async fn insert_if_absent(&self, record: VoteRecord) -> Result<bool, EmergencyError> {
        let mut state = self.state.lock().unwrap();
        if state.contents.votes.iter().any(|v| v.same_vote_as(&record)) {
            return Ok(false);
        }
        Self::begin_write(&mut state)?;
        upsert_vote(&mut state.contents.votes, record, Timestamp::now());
        Self::finish_write(&mut state);
        Ok(true)
    }

    async fn record_receipts(
        &self,
        ballot_id: &str,
        receipts: Vec<LedgerReceipt>,
        required: &[NodeId],
    ) -> Result<Option<VoteRecord>, EmergencyError> {
        let mut state = self.state.lock().unwrap();
        if !state.contents.contains_ballot(ballot_id) {
            return Ok(None);
        }
        Self::begin_write(&mut state)?;
        let stored = attach_receipts(&mut state.contents.votes, ballot_id, receipts, required, Timestamp::now());
        Self::finish_write(&mut state);
        Ok(stored)
    }

    async fn all_votes(&self) -> Result<LedgerContents, EmergencyError> {
        Ok(self.state.lock().unwrap().contents.clone())
    }

    async fn pending_votes(&self) -> Result<Vec<VoteRecord>, EmergencyError> {
        Ok(self.state.lock().unwrap().contents.pending().cloned().collect())
    }

    async fn clear(&self) -> Result<(), EmergencyError> {
        let mut state = self.state.lock().unwrap();
        Self::begin_write(&mut state)?;
        state.contents.votes.clear();
        Self::finish_write(&mut state);
        Ok(())
    }

    async fn stats(&self) -> Result<EmergencyStats, EmergencyError> {
        let state = self.state.lock().unwrap();
        Ok(EmergencyStats {
            total_votes: state.contents.votes.len(),
            pending_votes: state.contents.pending().count(),
            last_updated: Some(state.contents.metadata.last_updated),
            file_exists: false,
            location: "memory".into(),
        })
    }

    async fn election_snapshot(&self) -> ElectionState {
        self.state.lock().unwrap().contents.metadata.election_state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotguard_types::{Provenance, Selection};

    fn record(ballot: &str) -> VoteRecord {
        VoteRecord {
            voter_id: format!("voter-{ballot}"),
            voter_hash: format!("hash-{ballot}"),
            ballot_id: ballot.into(),
            selections: vec![Selection {
                candidate_id: "c-1".into(),
                position: "President".into(),
            }],
            empty_positions: vec![],
            timestamp: Timestamp::from_millis(1),
            provenance: Provenance::Emergency,
            receipts: vec![],
            stored_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let store = NullEmergencyStore::new();
        store.fail_next_writes(1);
        assert!(!store.save_vote(record("b-1")).await);
        assert!(store.save_vote(record("b-1")).await);
        assert_eq!(store.write_attempts(), 2);
        assert_eq!(store.votes().len(), 1);
    }

    #[tokio::test]
    async fn permanent_failure_keeps_failing() {
        let store = NullEmergencyStore::new();
        store.fail_all_writes();
        for _ in 0..3 {
            assert!(store.try_save_vote(record("b-1")).await.is_err());
        }
        assert!(store.votes().is_empty());
    }
}
