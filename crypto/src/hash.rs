//! Blake2b hashing.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_256_multi(&[data])
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Derive the hex voter hash that ledger nodes see instead of the voter id.
///
/// The salt is deployment-specific; without it the hash cannot be linked
/// back to a voter id by enumeration.
pub fn voter_hash(voter_id: &str, salt: &[u8]) -> String {
    hex::encode(blake2b_256_multi(&[b"ballotguard-voter", salt, voter_id.as_bytes()]))
}
