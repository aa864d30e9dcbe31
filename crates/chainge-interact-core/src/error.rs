//! Error types for Chainge Interact Core.

use thiserror::Error;

use crate::types::TokenId;

/// Core errors that can occur while building, encoding or decoding tokens.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid hash")]
    InvalidHash,

    #[error("invalid DID: {0}")]
    InvalidDid(String),

    #[error("unsupported token version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown interaction type code: {0:#06x}")]
    UnknownInteractionType(u16),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Validation errors for token structure, sequence and signatures.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature verification failed")]
    SignatureFailed,

    #[error("payload hash does not match header")]
    PayloadHashMismatch,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("invalid sequence number: expected {expected}, got {got}")]
    InvalidSequence { expected: u32, got: u32 },

    #[error("invalid prev_token_id: expected {expected:?}, got {got:?}")]
    InvalidPrevToken {
        expected: Option<TokenId>,
        got: Option<TokenId>,
    },

    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: String, got: String },

    #[error("audience mismatch: expected {expected}, got {got}")]
    AudienceMismatch { expected: String, got: String },

    #[error("token expired at {expires_at} (now {now})")]
    Expired { expires_at: i64, now: i64 },

    #[error("token issued in the future at {issued_at} (now {now})")]
    IssuedInFuture { issued_at: i64, now: i64 },

    #[error("issuer could not be resolved: {0}")]
    UnknownIssuer(String),

    #[error("payload does not match interaction type: {0}")]
    MalformedPayload(String),

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed
            }
            CoreError::InvalidHash => ValidationError::StructuralError("invalid hash".into()),
            CoreError::UnsupportedVersion(v) => ValidationError::UnsupportedVersion(v),
            CoreError::MalformedPayload(msg) => ValidationError::MalformedPayload(msg),
            CoreError::UnknownInteractionType(code) => {
                ValidationError::StructuralError(format!("unknown interaction type {code:#06x}"))
            }
            CoreError::InvalidDid(msg)
            | CoreError::MalformedToken(msg)
            | CoreError::EncodingError(msg)
            | CoreError::DecodingError(msg) => ValidationError::StructuralError(msg),
        }
    }
}
