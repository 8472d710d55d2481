//! AES-256-GCM envelope for the emergency ledger.
//!
//! The 32-byte key is derived once from the configured secret with a
//! domain-separated Blake2b hash. Every seal draws a fresh random 96-bit IV.
//! The GCM tag is split off the ciphertext so the stored container carries
//! `{iv, ciphertext, auth_tag}` as separate fields.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use std::fmt;
use zeroize::Zeroizing;

use crate::hash::blake2b_256_multi;
use crate::CryptoError;

/// Shortest secret accepted at startup.
pub const MIN_SECRET_LEN: usize = 16;

/// AES-GCM nonce length in bytes (96 bits).
const IV_LEN: usize = 12;
/// GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

const KEY_DOMAIN: &[u8] = b"ballotguard-emergency-ledger-v1";

/// Output of [`EnvelopeCipher::seal`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedEnvelope {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub auth_tag: Vec<u8>,
}

/// Authenticated cipher keyed by the deployment secret.
///
/// Construction is the only place a bad configuration can surface; there is
/// no fallback to an unauthenticated encoding.
pub struct EnvelopeCipher {
    cipher: Aes256Gcm,
}

impl EnvelopeCipher {
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(CryptoError::Config(format!(
                "secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                secret.len()
            )));
        }
        let key = Zeroizing::new(blake2b_256_multi(&[KEY_DOMAIN, secret.as_bytes()]));
        let cipher = Aes256Gcm::new_from_slice(key.as_ref())
            .map_err(|e| CryptoError::Config(format!("AES key init failed: {e}")))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedEnvelope, CryptoError> {
        let iv = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut ciphertext = self
            .cipher
            .encrypt(&iv, plaintext)
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;
        let auth_tag = ciphertext.split_off(ciphertext.len() - TAG_LEN);
        Ok(SealedEnvelope {
            iv: iv.to_vec(),
            ciphertext,
            auth_tag,
        })
    }

    /// Fails closed: any mismatch of key, IV, tag or ciphertext is an error.
    pub fn open(&self, envelope: &SealedEnvelope) -> Result<Vec<u8>, CryptoError> {
        if envelope.iv.len() != IV_LEN {
            return Err(CryptoError::Malformed(format!(
                "iv must be {IV_LEN} bytes, got {}",
                envelope.iv.len()
            )));
        }
        if envelope.auth_tag.len() != TAG_LEN {
            return Err(CryptoError::Malformed(format!(
                "auth tag must be {TAG_LEN} bytes, got {}",
                envelope.auth_tag.len()
            )));
        }
        let mut combined = Vec::with_capacity(envelope.ciphertext.len() + TAG_LEN);
        combined.extend_from_slice(&envelope.ciphertext);
        combined.extend_from_slice(&envelope.auth_tag);

        self.cipher
            .decrypt(Nonce::from_slice(&envelope.iv), combined.as_ref())
            .map_err(|_| CryptoError::Decrypt)
    }
}

impl fmt::Debug for EnvelopeCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnvelopeCipher(aes-256-gcm)")
    }
}
