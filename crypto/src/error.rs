use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid cipher configuration: {0}")]
    Config(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// Wrong key or tampered data. Never recoverable by retrying.
    #[error("decryption failed: authentication check failed")]
    Decrypt,

    #[error("malformed envelope: {0}")]
    Malformed(String),
}
