//! Error types for flow transitions.

use chainge_interact_core::InteractionType;
use thiserror::Error;

use crate::flow::FlowType;

/// Hard protocol errors raised by a transition.
///
/// A soft refusal is not an error: transitions return `Outcome::Rejected`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// The message does not belong to this flow or this state.
    #[error("unexpected {message} message for {flow} flow")]
    UnexpectedMessage {
        flow: FlowType,
        message: InteractionType,
    },

    #[error("channel already established")]
    AlreadyEstablished,

    #[error("transport index {index} out of range ({available} offered)")]
    InvalidTransportIndex { index: i64, available: usize },

    #[error("selected credential type was not offered: {0}")]
    SelectionNotOffered(String),

    #[error("issued credential type was not offered: {0}")]
    CredentialNotOffered(String),

    #[error("credential response failed: {0}")]
    CredentialResponseFailed(String),

    #[error("supplied credentials do not satisfy the request")]
    RequirementsNotSatisfied,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Result type for flow transitions.
pub type Result<T> = std::result::Result<T, FlowError>;
