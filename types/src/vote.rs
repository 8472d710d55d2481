//! Ballots as cast, and vote records as stored by the emergency ledger.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::{LedgerReceipt, LedgerVote, NodeId, Timestamp, TypesError};

/// One chosen candidate for one position.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub candidate_id: String,
    pub position: String,
}

/// A ballot as handed in by the surrounding application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// Pseudonymous voter identifier.
    pub voter_id: String,
    /// Hash unlinkable to the voter's identity; the only voter field sent
    /// to ledger nodes.
    pub voter_hash: String,
    /// Caller-supplied idempotency key.
    pub ballot_id: String,
    pub selections: Vec<Selection>,
    /// Positions the voter deliberately left blank.
    #[serde(default)]
    pub empty_positions: Vec<String>,
    pub timestamp: Timestamp,
}

impl Ballot {
    /// Structural checks performed before any write path is touched.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.ballot_id.trim().is_empty() {
            return Err(TypesError::InvalidBallot("ballot id is empty".into()));
        }
        if self.voter_id.trim().is_empty() {
            return Err(TypesError::InvalidBallot("voter id is empty".into()));
        }
        if self.selections.is_empty() && self.empty_positions.is_empty() {
            return Err(TypesError::InvalidBallot(
                "ballot has neither selections nor empty positions".into(),
            ));
        }
        let mut seen = HashSet::new();
        let positions = self
            .selections
            .iter()
            .map(|s| s.position.as_str())
            .chain(self.empty_positions.iter().map(String::as_str));
        for position in positions {
            if !seen.insert(position) {
                return Err(TypesError::InvalidBallot(format!(
                    "position {position:?} appears more than once"
                )));
            }
        }
        Ok(())
    }
}

/// Where a stored record's current state came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Written by the vote path; not yet on every node.
    Emergency,
    /// An `Emergency` write that replaced an existing record.
    EmergencyUpdated,
    /// Every enabled node holds a receipt.
    BlockchainSynced,
    /// Recovered from a node's contract into a rebuilt emergency ledger.
    BlockchainBackup,
    /// No node accepted the vote, or the first emergency write failed.
    LastResort,
}

impl Provenance {
    /// Whether reconciliation still has to push this record to nodes.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Emergency | Self::EmergencyUpdated | Self::LastResort)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::EmergencyUpdated => "emergency_updated",
            Self::BlockchainSynced => "blockchain_synced",
            Self::BlockchainBackup => "blockchain_backup",
            Self::LastResort => "last_resort",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emergency" => Ok(Self::Emergency),
            "emergency_updated" => Ok(Self::EmergencyUpdated),
            "blockchain_synced" => Ok(Self::BlockchainSynced),
            "blockchain_backup" => Ok(Self::BlockchainBackup),
            "last_resort" => Ok(Self::LastResort),
            other => Err(TypesError::UnknownProvenance(other.to_string())),
        }
    }
}

/// A vote as held by the emergency ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter_id: String,
    pub voter_hash: String,
    pub ballot_id: String,
    pub selections: Vec<Selection>,
    #[serde(default)]
    pub empty_positions: Vec<String>,
    pub timestamp: Timestamp,
    pub provenance: Provenance,
    /// At most one receipt per node.
    #[serde(default)]
    pub receipts: Vec<LedgerReceipt>,
    /// Set by the emergency ledger on first insert.
    #[serde(default)]
    pub stored_at: Option<Timestamp>,
    /// Set by the emergency ledger on every write.
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl VoteRecord {
    pub fn from_ballot(ballot: &Ballot, provenance: Provenance, receipts: Vec<LedgerReceipt>) -> Self {
        Self {
            voter_id: ballot.voter_id.clone(),
            voter_hash: ballot.voter_hash.clone(),
            ballot_id: ballot.ballot_id.clone(),
            selections: ballot.selections.clone(),
            empty_positions: ballot.empty_positions.clone(),
            timestamp: ballot.timestamp,
            provenance,
            receipts,
            stored_at: None,
            updated_at: None,
        }
    }

    /// Rebuild a record from a node's view of a vote. Nodes never learn the
    /// voter id, so the voter hash stands in for it.
    pub fn from_ledger_vote(node_id: &NodeId, vote: &LedgerVote) -> Self {
        Self {
            voter_id: vote.voter_hash.clone(),
            voter_hash: vote.voter_hash.clone(),
            ballot_id: vote.ballot_id.clone(),
            selections: vote.selections.clone(),
            empty_positions: vote.empty_positions.clone(),
            timestamp: vote.timestamp,
            provenance: Provenance::BlockchainBackup,
            receipts: vec![LedgerReceipt {
                node_id: node_id.clone(),
                tx_hash: vote.tx_hash.clone(),
                block_number: vote.block_number.clone(),
                gas_used: None,
                status: crate::ReceiptStatus::Success,
            }],
            stored_at: None,
            updated_at: None,
        }
    }

    /// The ballot this record carries, for resubmission to a node.
    pub fn to_ballot(&self) -> Ballot {
        Ballot {
            voter_id: self.voter_id.clone(),
            voter_hash: self.voter_hash.clone(),
            ballot_id: self.ballot_id.clone(),
            selections: self.selections.clone(),
            empty_positions: self.empty_positions.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Upsert identity: same ballot id OR same voter id.
    pub fn same_vote_as(&self, other: &VoteRecord) -> bool {
        self.ballot_id == other.ballot_id || self.voter_id == other.voter_id
    }

    pub fn receipt_from(&self, node: &NodeId) -> Option<&LedgerReceipt> {
        self.receipts.iter().find(|r| &r.node_id == node)
    }

    /// Add or replace the receipt for `receipt.node_id`.
    pub fn put_receipt(&mut self, receipt: LedgerReceipt) {
        match self.receipts.iter_mut().find(|r| r.node_id == receipt.node_id) {
            Some(existing) => *existing = receipt,
            None => self.receipts.push(receipt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot() -> Ballot {
        Ballot {
            voter_id: "voter-1".into(),
            voter_hash: "h1".into(),
            ballot_id: "ballot-1".into(),
            selections: vec![Selection {
                candidate_id: "cand-a".into(),
                position: "President".into(),
            }],
            empty_positions: vec!["Treasurer".into()],
            timestamp: Timestamp::from_millis(1_700_000_000_000),
        }
    }

    #[test]
    fn valid_ballot_passes() {
        assert!(ballot().validate().is_ok());
    }

    #[test]
    fn duplicate_position_is_rejected() {
        let mut b = ballot();
        b.empty_positions.push("President".into());
        assert!(matches!(b.validate(), Err(TypesError::InvalidBallot(_))));
    }

    #[test]
    fn blank_ballot_id_is_rejected() {
        let mut b = ballot();
        b.ballot_id = "  ".into();
        assert!(b.validate().is_err());
    }

    #[test]
    fn provenance_round_trips_through_its_tag() {
        for p in [
            Provenance::Emergency,
            Provenance::EmergencyUpdated,
            Provenance::BlockchainSynced,
            Provenance::BlockchainBackup,
            Provenance::LastResort,
        ] {
            assert_eq!(p.as_str().parse::<Provenance>().unwrap(), p);
            assert_eq!(serde_json::to_string(&p).unwrap(), format!("\"{}\"", p.as_str()));
        }
        assert!(!Provenance::BlockchainSynced.is_pending());
        assert!(Provenance::LastResort.is_pending());
    }

    #[test]
    fn same_vote_matches_on_ballot_or_voter() {
        let a = VoteRecord::from_ballot(&ballot(), Provenance::Emergency, vec![]);
        let mut by_voter = a.clone();
        by_voter.ballot_id = "other".into();
        let mut by_ballot = a.clone();
        by_ballot.voter_id = "other".into();
        let mut unrelated = a.clone();
        unrelated.ballot_id = "x".into();
        unrelated.voter_id = "y".into();

        assert!(a.same_vote_as(&by_voter));
        assert!(a.same_vote_as(&by_ballot));
        assert!(!a.same_vote_as(&unrelated));
    }

    #[test]
    fn put_receipt_replaces_per_node() {
        let mut record = VoteRecord::from_ballot(&ballot(), Provenance::Emergency, vec![]);
        let receipt = |hash: &str| LedgerReceipt {
            node_id: NodeId::new("primary"),
            tx_hash: hash.into(),
            block_number: None,
            gas_used: None,
            status: crate::ReceiptStatus::Success,
        };
        record.put_receipt(receipt("0x1"));
        record.put_receipt(receipt("0x2"));
        assert_eq!(record.receipts.len(), 1);
        assert_eq!(record.receipt_from(&NodeId::new("primary")).unwrap().tx_hash, "0x2");
    }
}
