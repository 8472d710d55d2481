//! File-backed emergency ledger.
//!
//! The in-memory [`LedgerContents`] is authoritative for the lifetime of the
//! process. Every mutation runs under one async mutex: the next contents are
//! built on a copy, sealed, written to a sibling temp file and renamed over
//! the checkpoint, and only then committed to memory. A failed write leaves
//! both memory and disk at the previous state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ballotguard_crypto::EnvelopeCipher;
use ballotguard_types::{ElectionState, LedgerReceipt, NodeId, Provenance, Timestamp, VoteRecord};
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::{EmergencyError, EmergencyStats, EmergencyStore, LedgerContents, SealedContainer};

pub struct EmergencyLedger {
    path: PathBuf,
    cipher: EnvelopeCipher,
    election: watch::Receiver<ElectionState>,
    contents: Mutex<LedgerContents>,
}

/// Upsert `record` into `votes` and return the stored form.
///
/// A record tagged `emergency` that replaces an existing one becomes
/// `emergency_updated`. The existing `stored_at` survives, and receipts the
/// incoming record lacks are carried over.
pub fn upsert_vote(votes: &mut Vec<VoteRecord>, mut record: VoteRecord, now: Timestamp) -> VoteRecord {
    record.updated_at = Some(now);
    match votes.iter_mut().find(|v| v.same_vote_as(&record)) {
        Some(existing) => {
            if record.provenance == Provenance::Emergency {
                record.provenance = Provenance::EmergencyUpdated;
            }
            record.stored_at = existing.stored_at.or(Some(now));
            for receipt in &existing.receipts {
                if record.receipt_from(&receipt.node_id).is_none() {
                    record.receipts.push(receipt.clone());
                }
            }
            *existing = record.clone();
        }
        None => {
            record.stored_at = Some(now);
            votes.push(record.clone());
        }
    }
    record
}

/// Add `receipts` to whatever is stored for `ballot_id` now, and tag it
/// `blockchain_synced` once every node in `required` holds a receipt.
///
/// Receipts already stored win over incoming ones for the same node. The
/// rest of the stored record is left as it is, so a vote rewritten after a
/// sync pass took its snapshot keeps its newer content. Returns `None`
/// when nothing is stored under `ballot_id`.
pub fn attach_receipts(
    votes: &mut [VoteRecord],
    ballot_id: &str,
    receipts: Vec<LedgerReceipt>,
    required: &[NodeId],
    now: Timestamp,
) -> Option<VoteRecord> {
    let stored = votes.iter_mut().find(|v| v.ballot_id == ballot_id)?;
    for receipt in receipts {
        if stored.receipt_from(&receipt.node_id).is_none() {
            stored.receipts.push(receipt);
        }
    }
    if required.iter().all(|id| stored.receipt_from(id).is_some()) {
        stored.provenance = Provenance::BlockchainSynced;
    }
    stored.updated_at = Some(now);
    Some(stored.clone())
}

impl EmergencyLedger {
    /// Open the ledger at `path`, creating an empty one if the file does not
    /// exist. An existing file that cannot be decrypted is an error; it is
    /// never replaced by an empty ledger.
    pub async fn open(
        path: impl Into<PathBuf>,
        cipher: EnvelopeCipher,
        election: watch::Receiver<ElectionState>,
    ) -> Result<Self, EmergencyError> {
        let path = path.into();
        let existing = match tokio::fs::read(&path).await {
            Ok(bytes) => Some(SealedContainer::from_json(&bytes)?.open(&cipher)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let ledger = match existing {
            Some(contents) => {
                tracing::info!(
                    path = %path.display(),
                    votes = contents.votes.len(),
                    pending = contents.pending().count(),
                    "emergency ledger opened"
                );
                Self {
                    path,
                    cipher,
                    election,
                    contents: Mutex::new(contents),
                }
            }
            None => {
                let snapshot = election.borrow().clone();
                let contents = LedgerContents::empty(Timestamp::now(), snapshot);
                let ledger = Self {
                    path,
                    cipher,
                    election,
                    contents: Mutex::new(contents.clone()),
                };
                ledger.write_checkpoint(&contents).await?;
                tracing::info!(path = %ledger.path.display(), "emergency ledger created");
                ledger
            }
        };
        Ok(ledger)
    }

    /// Decrypt the checkpoint at `path` without opening a ledger on it.
    pub async fn read_file(
        path: &Path,
        cipher: &EnvelopeCipher,
    ) -> Result<LedgerContents, EmergencyError> {
        let bytes = tokio::fs::read(path).await?;
        SealedContainer::from_json(&bytes)?.open(cipher)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decrypt the checkpoint at `path` and check its bookkeeping: the
    /// recorded vote count and one record per ballot and voter. Returns the
    /// number of votes.
    pub async fn verify_file(path: &Path, cipher: &EnvelopeCipher) -> Result<usize, EmergencyError> {
        let contents = Self::read_file(path, cipher).await?;
        contents.check_consistency()?;
        Ok(contents.votes.len())
    }

    /// [`Self::verify_file`] on this ledger's checkpoint, which must also
    /// agree with memory.
    pub async fn verify_checkpoint(&self) -> Result<usize, EmergencyError> {
        let guard = self.contents.lock().await;
        let on_disk = Self::read_file(&self.path, &self.cipher).await?;
        on_disk.check_consistency()?;
        let same = on_disk.votes.len() == guard.votes.len()
            && on_disk
                .votes
                .iter()
                .all(|v| guard.contains_ballot(&v.ballot_id));
        if !same {
            return Err(EmergencyError::CheckpointMismatch {
                on_disk: on_disk.votes.len(),
                in_memory: guard.votes.len(),
            });
        }
        Ok(on_disk.votes.len())
    }

    /// Rewrite the checkpoint whenever the election state changes, so the
    /// persisted snapshot survives a restart even without new votes. The
    /// task ends when the election state machine is dropped.
    pub fn follow_election(self: &Arc<Self>) -> JoinHandle<()> {
        let ledger = Arc::clone(self);
        let mut rx = self.election.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let mut guard = ledger.contents.lock().await;
                let next = guard.clone();
                if let Err(e) = ledger.commit(&mut guard, next).await {
                    tracing::error!("failed to persist election state: {e}");
                }
            }
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn write_checkpoint(&self, contents: &LedgerContents) -> Result<(), EmergencyError> {
        let bytes = SealedContainer::seal(&self.cipher, contents)?.to_json()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Stamp metadata on `next`, checkpoint it, then make it current.
    async fn commit(
        &self,
        guard: &mut MutexGuard<'_, LedgerContents>,
        mut next: LedgerContents,
    ) -> Result<(), EmergencyError> {
        next.metadata.total_votes = next.votes.len();
        next.metadata.last_updated = Timestamp::now();
        next.metadata.election_state = self.election.borrow().clone();
        self.write_checkpoint(&next).await?;
        **guard = next;
        Ok(())
    }
}

#[async_trait]
impl EmergencyStore for EmergencyLedger {
    async fn try_save_vote(&self, record: VoteRecord) -> Result<VoteRecord, EmergencyError> {
        let mut guard = self.contents.lock().await;
        let mut next = guard.clone();
        let stored = upsert_vote(&mut next.votes, record, Timestamp::now());
        self.commit(&mut guard, next).await?;
        tracing::debug!(
            ballot_id = %stored.ballot_id,
            provenance = %stored.provenance,
            "vote saved to emergency ledger"
        );
        Ok(stored)
    }

    async fn insert_if_absent(&self, record: VoteRecord) -> Result<bool, EmergencyError> {
        let mut guard = self.contents.lock().await;
        if guard.votes.iter().any(|v| v.same_vote_as(&record)) {
            return Ok(false);
        }
        let mut next = guard.clone();
        upsert_vote(&mut next.votes, record, Timestamp::now());
        self.commit(&mut guard, next).await?;
        Ok(true)
    }

    async fn record_receipts(
        &self,
        ballot_id: &str,
        receipts: Vec<LedgerReceipt>,
        required: &[NodeId],
    ) -> Result<Option<VoteRecord>, EmergencyError> {
        let mut guard = self.contents.lock().await;
        let mut next = guard.clone();
        let Some(stored) = attach_receipts(&mut next.votes, ballot_id, receipts, required, Timestamp::now())
        else {
            return Ok(None);
        };
        self.commit(&mut guard, next).await?;
        Ok(Some(stored))
    }

    async fn all_votes(&self) -> Result<LedgerContents, EmergencyError> {
        Ok(self.contents.lock().await.clone())
    }

    async fn pending_votes(&self) -> Result<Vec<VoteRecord>, EmergencyError> {
        Ok(self.contents.lock().await.pending().cloned().collect())
    }

    async fn clear(&self) -> Result<(), EmergencyError> {
        let mut guard = self.contents.lock().await;
        let mut next = guard.clone();
        let dropped = next.votes.len();
        next.votes.clear();
        self.commit(&mut guard, next).await?;
        tracing::warn!(dropped, "emergency ledger cleared");
        Ok(())
    }

    async fn stats(&self) -> Result<EmergencyStats, EmergencyError> {
        let guard = self.contents.lock().await;
        let file_exists = tokio::fs::try_exists(&self.path).await?;
        Ok(EmergencyStats {
            total_votes: guard.votes.len(),
            pending_votes: guard.pending().count(),
            last_updated: Some(guard.metadata.last_updated),
            file_exists,
            location: self.path.display().to_string(),
        })
    }

    async fn election_snapshot(&self) -> ElectionState {
        self.contents.lock().await.metadata.election_state.clone()
    }
}
