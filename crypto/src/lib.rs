//! Cryptographic primitives for ballot replication.
//!
//! - **AES-256-GCM** sealing of the emergency ledger (`iv`, `ciphertext`, `auth_tag`)
//! - **Blake2b** for key derivation from the configured secret and for voter hashes

pub mod envelope;
pub mod error;
pub mod hash;

pub use envelope::{EnvelopeCipher, SealedEnvelope, MIN_SECRET_LEN};
pub use error::CryptoError;
pub use hash::{blake2b_256, blake2b_256_multi, voter_hash};
