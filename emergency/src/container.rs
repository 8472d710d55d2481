//! On-disk format of the emergency ledger.
//!
//! The file is a JSON object carrying the AES-256-GCM envelope with
//! hex-encoded binary fields. The plaintext is the JSON [`LedgerContents`].

use std::collections::HashSet;

use ballotguard_crypto::{EnvelopeCipher, SealedEnvelope};
use ballotguard_types::{ElectionState, Timestamp, VoteRecord};
use serde::{Deserialize, Serialize};

use crate::EmergencyError;

pub const CONTAINER_VERSION: u32 = 1;
pub const CONTAINER_CIPHER: &str = "aes-256-gcm";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    pub created_at: Timestamp,
    pub last_updated: Timestamp,
    pub total_votes: usize,
    /// Election lifecycle as of the last write.
    pub election_state: ElectionState,
}

/// The decrypted payload: every stored vote plus bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerContents {
    pub votes: Vec<VoteRecord>,
    pub metadata: LedgerMetadata,
}

impl LedgerContents {
    pub fn empty(now: Timestamp, election_state: ElectionState) -> Self {
        Self {
            votes: Vec::new(),
            metadata: LedgerMetadata {
                created_at: now,
                last_updated: now,
                total_votes: 0,
                election_state,
            },
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &VoteRecord> {
        self.votes.iter().filter(|v| v.provenance.is_pending())
    }

    pub fn contains_ballot(&self, ballot_id: &str) -> bool {
        self.votes.iter().any(|v| v.ballot_id == ballot_id)
    }

    /// Check the bookkeeping a checkpoint carries about itself.
    pub fn check_consistency(&self) -> Result<(), EmergencyError> {
        if self.metadata.total_votes != self.votes.len() {
            return Err(EmergencyError::Inconsistent(format!(
                "metadata records {} votes but the file holds {}",
                self.metadata.total_votes,
                self.votes.len()
            )));
        }
        let mut ballots = HashSet::new();
        let mut voters = HashSet::new();
        for vote in &self.votes {
            if !ballots.insert(vote.ballot_id.as_str()) {
                return Err(EmergencyError::Inconsistent(format!(
                    "ballot {} stored twice",
                    vote.ballot_id
                )));
            }
            if !voters.insert(vote.voter_id.as_str()) {
                return Err(EmergencyError::Inconsistent(format!(
                    "voter {} stored twice",
                    vote.voter_id
                )));
            }
        }
        Ok(())
    }
}

/// The encrypted file container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedContainer {
    pub version: u32,
    pub cipher: String,
    /// Hex-encoded 96-bit nonce.
    pub iv: String,
    /// Hex-encoded ciphertext without the tag.
    pub ciphertext: String,
    /// Hex-encoded 128-bit GCM tag.
    pub auth_tag: String,
}

impl SealedContainer {
    pub fn seal(cipher: &EnvelopeCipher, contents: &LedgerContents) -> Result<Self, EmergencyError> {
        let plaintext = serde_json::to_vec(contents)?;
        let envelope = cipher.seal(&plaintext)?;
        Ok(Self {
            version: CONTAINER_VERSION,
            cipher: CONTAINER_CIPHER.to_string(),
            iv: hex::encode(envelope.iv),
            ciphertext: hex::encode(envelope.ciphertext),
            auth_tag: hex::encode(envelope.auth_tag),
        })
    }

    pub fn open(&self, cipher: &EnvelopeCipher) -> Result<LedgerContents, EmergencyError> {
        if self.version != CONTAINER_VERSION {
            return Err(EmergencyError::Malformed(format!(
                "unsupported container version {}",
                self.version
            )));
        }
        if self.cipher != CONTAINER_CIPHER {
            return Err(EmergencyError::Malformed(format!(
                "unsupported cipher {:?}",
                self.cipher
            )));
        }
        let field = |name: &str, raw: &str| {
            hex::decode(raw).map_err(|e| EmergencyError::Malformed(format!("{name}: {e}")))
        };
        let envelope = SealedEnvelope {
            iv: field("iv", &self.iv)?,
            ciphertext: field("ciphertext", &self.ciphertext)?,
            auth_tag: field("auth_tag", &self.auth_tag)?,
        };
        let plaintext = cipher.open(&envelope)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, EmergencyError> {
        serde_json::from_slice(raw)
            .map_err(|e| EmergencyError::Malformed(format!("container is not valid JSON: {e}")))
    }

    pub fn to_json(&self) -> Result<Vec<u8>, EmergencyError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(secret: &str) -> EnvelopeCipher {
        EnvelopeCipher::from_secret(secret).unwrap()
    }

    #[test]
    fn container_fields_are_hex() {
        let contents = LedgerContents::empty(Timestamp::from_millis(1), ElectionState::default());
        let sealed = SealedContainer::seal(&cipher("0123456789abcdef"), &contents).unwrap();

        assert_eq!(sealed.version, 1);
        assert_eq!(sealed.cipher, "aes-256-gcm");
        assert_eq!(sealed.iv.len(), 24);
        assert_eq!(sealed.auth_tag.len(), 32);
        assert!(sealed.ciphertext.chars().all(|c| c.is_ascii_hexdigit()));

        let json = String::from_utf8(sealed.to_json().unwrap()).unwrap();
        assert!(!json.contains("created_at"));
    }

    #[test]
    fn wrong_key_is_decryption_failure() {
        let contents = LedgerContents::empty(Timestamp::from_millis(1), ElectionState::default());
        let sealed = SealedContainer::seal(&cipher("0123456789abcdef"), &contents).unwrap();
        let err = sealed.open(&cipher("fedcba9876543210")).unwrap_err();
        assert!(matches!(err, EmergencyError::DecryptionFailed));
    }

    #[test]
    fn unknown_cipher_is_malformed() {
        let contents = LedgerContents::empty(Timestamp::from_millis(1), ElectionState::default());
        let mut sealed = SealedContainer::seal(&cipher("0123456789abcdef"), &contents).unwrap();
        sealed.cipher = "base64".into();
        let err = sealed.open(&cipher("0123456789abcdef")).unwrap_err();
        assert!(matches!(err, EmergencyError::Malformed(_)));
    }
}
