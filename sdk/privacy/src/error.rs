//! Errors raised while parsing privacy primitives.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrivacyError {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid note amount: {0}")]
    InvalidAmount(String),
}

pub type Result<T> = std::result::Result<T, PrivacyError>;

/// Decode an optionally `0x`-prefixed hex string into a fixed 32-byte array.
pub fn decode_hex32(input: &str) -> Result<[u8; 32]> {
    let raw = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(raw).map_err(|e| PrivacyError::InvalidHex(e.to_string()))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| PrivacyError::InvalidLength {
        expected: 32,
        actual: bytes.len(),
    })
}
