//! error type for protocol operations.

use thiserror::Error;

/// errors produced by the wire codec.
#[derive(Debug, Error)]
pub enum Error {
    /// a peer key had the wrong length for curve25519.
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// a sealed payload was too short to contain a nonce.
    #[error("sealed payload too short")]
    ShortPayload,

    /// authenticated decryption failed.
    #[error("could not open sealed payload")]
    OpenFailed,

    /// encryption failed.
    #[error("could not seal payload")]
    SealFailed,

    /// the payload did not contain valid json for the expected type.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// a frame exceeded the 4-byte length prefix limit.
    #[error("payload too large for framing")]
    FrameTooLarge,
}
