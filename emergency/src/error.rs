use ballotguard_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmergencyError {
    #[error("emergency ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("emergency ledger encryption failed: {0}")]
    Encryption(String),

    /// Wrong key or tampered file. Never masked as an empty ledger.
    #[error("emergency ledger could not be decrypted (wrong key or corrupted file)")]
    DecryptionFailed,

    #[error("emergency ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed emergency ledger file: {0}")]
    Malformed(String),

    #[error("inconsistent emergency ledger: {0}")]
    Inconsistent(String),

    #[error("checkpoint holds {on_disk} votes but memory holds {in_memory}")]
    CheckpointMismatch { on_disk: usize, in_memory: usize },

    /// Injected by test doubles.
    #[error("emergency write failed: {0}")]
    WriteFailed(String),
}

impl From<CryptoError> for EmergencyError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Decrypt => Self::DecryptionFailed,
            CryptoError::Malformed(m) => Self::Malformed(m),
            CryptoError::Config(m) | CryptoError::Encrypt(m) => Self::Encryption(m),
        }
    }
}
