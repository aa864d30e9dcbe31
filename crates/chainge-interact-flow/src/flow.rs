//! The flow family: one tagged state machine per protocol.
//!
//! A flow's variant is fixed by the first message of an interaction.
//! Transitions are pure: they take the current state, a decoded message and
//! a [`TransitionContext`], and return the next state or a refusal.

use chainge_interact_core::{Did, InteractionType, Message};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::authentication::AuthenticationState;
use crate::authorization::AuthorizationState;
use crate::channel::EstablishChannelState;
use crate::credential_offer::CredentialOfferState;
use crate::credential_share::CredentialShareState;
use crate::error::{FlowError, Result};
use crate::resolution::ResolutionState;
use crate::rpc::{RpcKind, RpcState};

/// Protocol discriminant of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowType {
    Authentication,
    Authorization,
    CredentialOffer,
    CredentialShare,
    EstablishChannel,
    Encrypt,
    Decrypt,
    Sign,
    Resolution,
}

impl FlowType {
    pub const ALL: [FlowType; 9] = [
        Self::Authentication,
        Self::Authorization,
        Self::CredentialOffer,
        Self::CredentialShare,
        Self::EstablishChannel,
        Self::Encrypt,
        Self::Decrypt,
        Self::Sign,
        Self::Resolution,
    ];

    /// The token type that opens an interaction of this flow.
    pub fn first_message_type(self) -> InteractionType {
        match self {
            Self::Authentication => InteractionType::Authentication,
            Self::Authorization => InteractionType::AuthorizationRequest,
            Self::CredentialOffer => InteractionType::CredentialOfferRequest,
            Self::CredentialShare => InteractionType::CredentialRequest,
            Self::EstablishChannel => InteractionType::EstablishChannelRequest,
            Self::Encrypt => InteractionType::EncryptionRequest,
            Self::Decrypt => InteractionType::DecryptionRequest,
            Self::Sign => InteractionType::SigningRequest,
            Self::Resolution => InteractionType::ResolutionRequest,
        }
    }

    /// The flow a first message opens, if it can open one.
    pub fn for_first_message(kind: InteractionType) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|flow| flow.first_message_type() == kind)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::CredentialOffer => "credentialOffer",
            Self::CredentialShare => "credentialShare",
            Self::EstablishChannel => "establishChannel",
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::Sign => "sign",
            Self::Resolution => "resolution",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a transition that did not fail hard.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<S> {
    /// The message advances the flow to this state.
    Accepted(S),
    /// The message is refused; state is unchanged.
    Rejected,
}

impl<S> Outcome<S> {
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> Outcome<T> {
        match self {
            Outcome::Accepted(s) => Outcome::Accepted(f(s)),
            Outcome::Rejected => Outcome::Rejected,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }
}

/// Result of checking one carried credential's signature through the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialCheck {
    pub signature_valid: bool,
}

/// Inputs a transition needs that cost I/O to compute.
///
/// `credential_checks` is aligned with [`Message::credentials`] of the
/// message being applied.
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    pub requester: Option<Did>,
    pub responder: Option<Did>,
    pub credential_checks: Vec<CredentialCheck>,
    /// Unix milliseconds.
    pub now: i64,
}

impl TransitionContext {
    pub fn new(now: i64) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    pub fn with_participants(mut self, requester: Option<Did>, responder: Option<Did>) -> Self {
        self.requester = requester;
        self.responder = responder;
        self
    }

    pub fn with_credential_checks(mut self, checks: Vec<CredentialCheck>) -> Self {
        self.credential_checks = checks;
        self
    }

    /// Signature check for the credential at `index`. Missing checks count
    /// as failed.
    pub fn signature_valid(&self, index: usize) -> bool {
        self.credential_checks
            .get(index)
            .map(|c| c.signature_valid)
            .unwrap_or(false)
    }
}

/// A protocol state machine with its current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flow", content = "state", rename_all = "camelCase")]
pub enum Flow {
    Authentication(AuthenticationState),
    Authorization(AuthorizationState),
    CredentialOffer(CredentialOfferState),
    CredentialShare(CredentialShareState),
    EstablishChannel(EstablishChannelState),
    Encrypt(RpcState),
    Decrypt(RpcState),
    Sign(RpcState),
    Resolution(ResolutionState),
}

impl Flow {
    /// A flow of the given type in its initial state.
    pub fn new(flow_type: FlowType) -> Self {
        match flow_type {
            FlowType::Authentication => Flow::Authentication(AuthenticationState::default()),
            FlowType::Authorization => Flow::Authorization(AuthorizationState::default()),
            FlowType::CredentialOffer => Flow::CredentialOffer(CredentialOfferState::default()),
            FlowType::CredentialShare => Flow::CredentialShare(CredentialShareState::default()),
            FlowType::EstablishChannel => {
                Flow::EstablishChannel(EstablishChannelState::default())
            }
            FlowType::Encrypt => Flow::Encrypt(RpcState::default()),
            FlowType::Decrypt => Flow::Decrypt(RpcState::default()),
            FlowType::Sign => Flow::Sign(RpcState::default()),
            FlowType::Resolution => Flow::Resolution(ResolutionState::default()),
        }
    }

    /// The initial flow for an interaction opened by `first`.
    pub fn for_first_message(first: InteractionType) -> Option<Self> {
        FlowType::for_first_message(first).map(Self::new)
    }

    pub fn flow_type(&self) -> FlowType {
        match self {
            Flow::Authentication(_) => FlowType::Authentication,
            Flow::Authorization(_) => FlowType::Authorization,
            Flow::CredentialOffer(_) => FlowType::CredentialOffer,
            Flow::CredentialShare(_) => FlowType::CredentialShare,
            Flow::EstablishChannel(_) => FlowType::EstablishChannel,
            Flow::Encrypt(_) => FlowType::Encrypt,
            Flow::Decrypt(_) => FlowType::Decrypt,
            Flow::Sign(_) => FlowType::Sign,
            Flow::Resolution(_) => FlowType::Resolution,
        }
    }

    /// Apply a message. Never mutates `self`.
    pub fn apply(&self, message: &Message, ctx: &TransitionContext) -> Result<Outcome<Flow>> {
        Ok(match self {
            Flow::Authentication(s) => s.apply(message)?.map(Flow::Authentication),
            Flow::Authorization(s) => s.apply(message)?.map(Flow::Authorization),
            Flow::CredentialOffer(s) => s.apply(message, ctx)?.map(Flow::CredentialOffer),
            Flow::CredentialShare(s) => s.apply(message, ctx)?.map(Flow::CredentialShare),
            Flow::EstablishChannel(s) => s.apply(message)?.map(Flow::EstablishChannel),
            Flow::Encrypt(s) => s.apply(RpcKind::Encrypt, message)?.map(Flow::Encrypt),
            Flow::Decrypt(s) => s.apply(RpcKind::Decrypt, message)?.map(Flow::Decrypt),
            Flow::Sign(s) => s.apply(RpcKind::Sign, message)?.map(Flow::Sign),
            Flow::Resolution(s) => s.apply(message)?.map(Flow::Resolution),
        })
    }

    pub fn as_authentication(&self) -> Option<&AuthenticationState> {
        match self {
            Flow::Authentication(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_authorization(&self) -> Option<&AuthorizationState> {
        match self {
            Flow::Authorization(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_credential_offer(&self) -> Option<&CredentialOfferState> {
        match self {
            Flow::CredentialOffer(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_credential_share(&self) -> Option<&CredentialShareState> {
        match self {
            Flow::CredentialShare(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_establish_channel(&self) -> Option<&EstablishChannelState> {
        match self {
            Flow::EstablishChannel(s) => Some(s),
            _ => None,
        }
    }

    /// State of an encrypt, decrypt or sign flow.
    pub fn as_rpc(&self) -> Option<&RpcState> {
        match self {
            Flow::Encrypt(s) | Flow::Decrypt(s) | Flow::Sign(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_resolution(&self) -> Option<&ResolutionState> {
        match self {
            Flow::Resolution(s) => Some(s),
            _ => None,
        }
    }
}

pub(crate) fn unexpected(flow: FlowType, message: &Message) -> FlowError {
    FlowError::UnexpectedMessage {
        flow,
        message: message.interaction_type(),
    }
}
