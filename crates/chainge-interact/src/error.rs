//! Error types for the interaction engine.

use chainge_interact_core::{CoreError, InteractionType, Nonce, TokenId, ValidationError};
use chainge_interact_flow::{FlowError, FlowType};
use chainge_interact_store::StoreError;
use chainge_interact_transport::TransportError;
use thiserror::Error;

/// Errors from the identity wallet and resolver.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("identity has no encryption key: {0}")]
    NoEncryptionKey(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// Errors that can occur while processing or building interaction tokens.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// Signature, sequence or structure check failed for a token.
    #[error("invalid token: {0}")]
    InvalidToken(#[source] ValidationError),

    #[error("no such interaction: {0}")]
    NoSuchInteraction(Nonce),

    #[error("interaction already exists: {0}")]
    InteractionExists(Nonce),

    /// An operation was invoked on an interaction of another flow.
    #[error("{operation} is not available on a {actual} flow")]
    WrongFlow {
        operation: &'static str,
        actual: FlowType,
    },

    /// The request a response builder answers is not in the interaction.
    #[error("interaction has no {0} message")]
    MissingRequest(InteractionType),

    #[error("no transport for interaction {0}")]
    MissingTransport(Nonce),

    /// The token's type cannot open an interaction.
    #[error("{0} token cannot start an interaction")]
    NotAFirstMessage(InteractionType),

    /// Replay was asked to rebuild an interaction from no tokens.
    #[error("no tokens to replay")]
    NoTokens,

    /// The first token of an interaction was refused by its flow.
    #[error("first token of interaction {0} was rejected")]
    Rejected(Nonce),

    /// Replaying the stored log did not reproduce an accepted token.
    #[error("stored token {seq} of interaction {id} does not replay")]
    CorruptLog { id: Nonce, seq: u32 },

    /// The log already holds another token at this position.
    #[error("interaction {id} already has token {existing} at seq {seq}")]
    Conflict {
        id: Nonce,
        seq: u32,
        existing: TokenId,
    },

    #[error("flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl InteractionError {
    /// Wrap a validation failure. This is the only place tokens become
    /// `InvalidToken`.
    pub(crate) fn invalid(err: impl Into<ValidationError>) -> Self {
        InteractionError::InvalidToken(err.into())
    }
}

/// Errors raised by channels and the channel keeper.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("interaction {id} is a {actual} flow, not establishChannel")]
    WrongFlow { id: Nonce, actual: FlowType },

    #[error("channel already exists: {0}")]
    ChannelExists(Nonce),

    #[error("no such channel: {0}")]
    NoSuchChannel(Nonce),

    #[error("channel already started")]
    AlreadyStarted,

    #[error("channel is not authenticated")]
    NotAuthenticated,

    #[error("channel has no transport")]
    MissingTransport,

    /// The channel went away while a caller was waiting on it.
    #[error("channel closed")]
    Closed,

    #[error("interaction error: {0}")]
    Interaction(#[from] InteractionError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for interaction operations.
pub type Result<T> = std::result::Result<T, InteractionError>;
