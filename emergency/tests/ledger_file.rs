use std::collections::HashSet;
use std::sync::Arc;

use ballotguard_crypto::EnvelopeCipher;
use ballotguard_emergency::{
    EmergencyError, EmergencyLedger, EmergencyStore, LedgerContents, SealedContainer,
};
use ballotguard_types::{
    ElectionState, ElectionStatus, LedgerReceipt, NodeId, Provenance, ReceiptStatus, Selection,
    Timestamp, VoteRecord,
};
use proptest::prelude::*;
use tempfile::TempDir;
use tokio::sync::watch;

const KEY: &str = "correct horse battery staple";

fn cipher(secret: &str) -> EnvelopeCipher {
    EnvelopeCipher::from_secret(secret).unwrap()
}

fn voting() -> ElectionState {
    ElectionState {
        status: ElectionStatus::Voting,
        start_time: Some(Timestamp::from_millis(1_000)),
        pause_time: None,
        finish_time: None,
    }
}

fn record(ballot: &str, voter: &str, provenance: Provenance) -> VoteRecord {
    VoteRecord {
        voter_id: voter.into(),
        voter_hash: format!("hash-{voter}"),
        ballot_id: ballot.into(),
        selections: vec![Selection {
            candidate_id: "c-1".into(),
            position: "President".into(),
        }],
        empty_positions: vec!["Treasurer".into()],
        timestamp: Timestamp::from_millis(1_700_000_000_000),
        provenance,
        receipts: vec![],
        stored_at: None,
        updated_at: None,
    }
}

async fn open_in(dir: &TempDir, secret: &str, state: ElectionState) -> Result<EmergencyLedger, EmergencyError> {
    let (_tx, rx) = watch::channel(state);
    EmergencyLedger::open(dir.path().join("emergency.json"), cipher(secret), rx).await
}

#[tokio::test]
async fn first_open_creates_empty_encrypted_file() {
    let dir = TempDir::new().unwrap();
    let ledger = open_in(&dir, KEY, voting()).await.unwrap();

    let stats = ledger.stats().await.unwrap();
    assert!(stats.file_exists);
    assert_eq!(stats.total_votes, 0);

    let raw = std::fs::read(ledger.path()).unwrap();
    let container = SealedContainer::from_json(&raw).unwrap();
    assert_eq!(container.cipher, "aes-256-gcm");
    assert!(!String::from_utf8_lossy(&raw).contains("votes"));
}

#[tokio::test]
async fn saved_vote_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let mut input = record("b-1", "v-1", Provenance::Emergency);
    input.receipts.push(LedgerReceipt {
        node_id: NodeId::new("backup"),
        tx_hash: "0xbeef".into(),
        block_number: None,
        gas_used: None,
        status: ReceiptStatus::Success,
    });

    {
        let ledger = open_in(&dir, KEY, voting()).await.unwrap();
        assert!(ledger.save_vote(input.clone()).await);
    }

    let ledger = open_in(&dir, KEY, voting()).await.unwrap();
    let contents = ledger.all_votes().await.unwrap();
    assert_eq!(contents.votes.len(), 1);
    assert_eq!(contents.metadata.total_votes, 1);
    assert_eq!(contents.metadata.election_state, voting());

    let stored = &contents.votes[0];
    assert!(stored.stored_at.is_some());
    assert!(stored.updated_at.is_some());
    let mut stripped = stored.clone();
    stripped.stored_at = None;
    stripped.updated_at = None;
    assert_eq!(stripped, input);
}

#[tokio::test]
async fn wrong_key_fails_closed_at_open() {
    let dir = TempDir::new().unwrap();
    {
        let ledger = open_in(&dir, KEY, voting()).await.unwrap();
        ledger.save_vote(record("b-1", "v-1", Provenance::Emergency)).await;
    }

    let err = open_in(&dir, "another sixteen byte key", voting())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EmergencyError::DecryptionFailed));

    // the original file is untouched
    let ledger = open_in(&dir, KEY, voting()).await.unwrap();
    assert_eq!(ledger.all_votes().await.unwrap().votes.len(), 1);
}

#[tokio::test]
async fn tampered_ciphertext_fails_closed() {
    let dir = TempDir::new().unwrap();
    let path = {
        let ledger = open_in(&dir, KEY, voting()).await.unwrap();
        ledger.save_vote(record("b-1", "v-1", Provenance::Emergency)).await;
        ledger.path().to_path_buf()
    };

    let mut container = SealedContainer::from_json(&std::fs::read(&path).unwrap()).unwrap();
    let flipped = if container.ciphertext.starts_with('0') { "1" } else { "0" };
    container.ciphertext.replace_range(0..1, flipped);
    std::fs::write(&path, container.to_json().unwrap()).unwrap();

    let err = open_in(&dir, KEY, voting()).await.err().unwrap();
    assert!(matches!(err, EmergencyError::DecryptionFailed));
}

#[tokio::test]
async fn garbage_file_is_malformed() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("emergency.json"), b"ZW5jb2RlZA==").unwrap();
    let err = open_in(&dir, KEY, voting()).await.err().unwrap();
    assert!(matches!(err, EmergencyError::Malformed(_)));
}

#[tokio::test]
async fn pending_and_clear() {
    let dir = TempDir::new().unwrap();
    let ledger = open_in(&dir, KEY, voting()).await.unwrap();
    ledger.save_vote(record("b-1", "v-1", Provenance::Emergency)).await;
    ledger.save_vote(record("b-2", "v-2", Provenance::BlockchainSynced)).await;
    ledger.save_vote(record("b-3", "v-3", Provenance::LastResort)).await;
    ledger.save_vote(record("b-4", "v-4", Provenance::BlockchainBackup)).await;

    let pending: HashSet<_> = ledger
        .pending_votes()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.ballot_id)
        .collect();
    assert_eq!(pending, HashSet::from(["b-1".to_string(), "b-3".to_string()]));
    assert_eq!(ledger.stats().await.unwrap().pending_votes, 2);

    ledger.clear().await.unwrap();
    let contents = ledger.all_votes().await.unwrap();
    assert!(contents.votes.is_empty());
    assert_eq!(contents.metadata.total_votes, 0);
    assert_eq!(ledger.election_snapshot().await, voting());
}

#[tokio::test]
async fn insert_if_absent_leaves_existing_records_alone() {
    let dir = TempDir::new().unwrap();
    let ledger = open_in(&dir, KEY, voting()).await.unwrap();
    ledger.save_vote(record("b-1", "v-1", Provenance::Emergency)).await;

    let inserted = ledger
        .insert_if_absent(record("b-1", "hash-v-1", Provenance::BlockchainBackup))
        .await
        .unwrap();
    assert!(!inserted);
    assert!(ledger
        .insert_if_absent(record("b-2", "hash-v-2", Provenance::BlockchainBackup))
        .await
        .unwrap());

    let votes = ledger.all_votes().await.unwrap().votes;
    assert_eq!(votes.len(), 2);
    assert_eq!(votes[0].provenance, Provenance::Emergency);
    assert_eq!(votes[1].provenance, Provenance::BlockchainBackup);
}

#[tokio::test]
async fn verify_checkpoint_matches_memory() {
    let dir = TempDir::new().unwrap();
    let ledger = open_in(&dir, KEY, voting()).await.unwrap();
    ledger.save_vote(record("b-1", "v-1", Provenance::Emergency)).await;
    ledger.save_vote(record("b-2", "v-2", Provenance::Emergency)).await;
    assert_eq!(ledger.verify_checkpoint().await.unwrap(), 2);

    // a checkpoint rolled back behind memory is reported
    let stale = {
        let other = TempDir::new().unwrap();
        let ledger = open_in(&other, KEY, voting()).await.unwrap();
        ledger.save_vote(record("b-1", "v-1", Provenance::Emergency)).await;
        std::fs::read(ledger.path()).unwrap()
    };
    std::fs::write(ledger.path(), stale).unwrap();
    let err = ledger.verify_checkpoint().await.unwrap_err();
    assert!(matches!(
        err,
        EmergencyError::CheckpointMismatch { on_disk: 1, in_memory: 2 }
    ));
}

/// Seal `contents` under the ledger key, bypassing the ledger's own
/// bookkeeping.
fn write_sealed(path: &std::path::Path, contents: &LedgerContents) {
    let bytes = SealedContainer::seal(&cipher(KEY), contents).unwrap().to_json().unwrap();
    std::fs::write(path, bytes).unwrap();
}

#[tokio::test]
async fn verify_file_accepts_a_ledger_written_checkpoint() {
    let dir = TempDir::new().unwrap();
    let ledger = open_in(&dir, KEY, voting()).await.unwrap();
    ledger.save_vote(record("b-1", "v-1", Provenance::Emergency)).await;
    ledger.save_vote(record("b-2", "v-2", Provenance::LastResort)).await;

    let votes = EmergencyLedger::verify_file(ledger.path(), &cipher(KEY)).await.unwrap();
    assert_eq!(votes, 2);
}

#[tokio::test]
async fn verify_file_rejects_a_wrong_vote_count() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("emergency.json");
    let mut contents = LedgerContents::empty(Timestamp::from_millis(1), voting());
    contents.votes.push(record("b-1", "v-1", Provenance::Emergency));
    contents.votes.push(record("b-2", "v-2", Provenance::Emergency));
    contents.metadata.total_votes = 3;
    write_sealed(&path, &contents);

    let err = EmergencyLedger::verify_file(&path, &cipher(KEY)).await.unwrap_err();
    assert!(matches!(err, EmergencyError::Inconsistent(_)));
    assert!(err.to_string().contains("3 votes"));

    let ledger = open_in(&dir, KEY, voting()).await.unwrap();
    assert!(matches!(
        ledger.verify_checkpoint().await.unwrap_err(),
        EmergencyError::Inconsistent(_)
    ));
}

#[tokio::test]
async fn verify_file_rejects_a_ballot_stored_twice() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("emergency.json");
    let mut contents = LedgerContents::empty(Timestamp::from_millis(1), voting());
    contents.votes.push(record("b-1", "v-1", Provenance::Emergency));
    contents.votes.push(record("b-1", "v-2", Provenance::LastResort));
    contents.metadata.total_votes = 2;
    write_sealed(&path, &contents);

    let err = EmergencyLedger::verify_file(&path, &cipher(KEY)).await.unwrap_err();
    assert!(err.to_string().contains("ballot b-1 stored twice"));
}

#[tokio::test]
async fn receipts_land_on_the_stored_record_and_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let required = [NodeId::new("primary"), NodeId::new("backup")];
    {
        let ledger = open_in(&dir, KEY, voting()).await.unwrap();
        ledger.save_vote(record("b-1", "v-1", Provenance::Emergency)).await;
        let receipts = required
            .iter()
            .map(|id| LedgerReceipt {
                node_id: id.clone(),
                tx_hash: format!("0x{id}"),
                block_number: None,
                gas_used: None,
                status: ReceiptStatus::Success,
            })
            .collect();
        let stored = ledger
            .record_receipts("b-1", receipts, &required)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.provenance, Provenance::BlockchainSynced);
        assert!(ledger
            .record_receipts("b-9", Vec::new(), &required)
            .await
            .unwrap()
            .is_none());
    }

    let reopened = open_in(&dir, KEY, voting()).await.unwrap();
    let contents = reopened.all_votes().await.unwrap();
    assert_eq!(contents.votes.len(), 1);
    assert_eq!(contents.votes[0].receipts.len(), 2);
    assert_eq!(reopened.pending_votes().await.unwrap().len(), 0);
}

#[tokio::test]
async fn snapshot_follows_election_transitions() {
    let dir = TempDir::new().unwrap();
    let (tx, rx) = watch::channel(ElectionState::default());
    let path = dir.path().join("nested").join("emergency.json");
    let ledger = Arc::new(EmergencyLedger::open(&path, cipher(KEY), rx).await.unwrap());
    let follower = ledger.follow_election();

    tx.send_replace(voting());
    drop(tx);
    follower.await.unwrap();

    assert_eq!(ledger.election_snapshot().await, voting());
    let on_disk = EmergencyLedger::read_file(&path, &cipher(KEY)).await.unwrap();
    assert_eq!(on_disk.metadata.election_state, voting());
}

#[tokio::test]
async fn no_temp_file_left_behind() {
    let dir = TempDir::new().unwrap();
    let ledger = open_in(&dir, KEY, voting()).await.unwrap();
    ledger.save_vote(record("b-1", "v-1", Provenance::Emergency)).await;

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["emergency.json".to_string()]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// However often ballots are retried, one record per ballot id remains
    /// and total_votes agrees with the distinct count.
    #[test]
    fn upsert_is_idempotent(ids in proptest::collection::vec(0u8..8, 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (distinct, stored, total) = runtime.block_on(async {
            let dir = TempDir::new().unwrap();
            let ledger = open_in(&dir, KEY, voting()).await.unwrap();
            for id in &ids {
                let r = record(&format!("b-{id}"), &format!("v-{id}"), Provenance::Emergency);
                assert!(ledger.save_vote(r).await);
            }
            let contents = ledger.all_votes().await.unwrap();
            let distinct: HashSet<_> = ids.iter().collect();
            (distinct.len(), contents.votes.len(), contents.metadata.total_votes)
        });
        prop_assert_eq!(stored, distinct);
        prop_assert_eq!(total, distinct);
    }
}
