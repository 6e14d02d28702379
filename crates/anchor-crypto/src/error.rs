//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur while decoding hashes.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Decoded hash had the wrong number of bytes.
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidHashLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Invalid hex encoding.
    #[error("invalid hex encoding: {0}")]
    InvalidHexEncoding(#[from] hex::FromHexError),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
