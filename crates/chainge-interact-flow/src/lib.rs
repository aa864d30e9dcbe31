//! # Chainge Interact Flows
//!
//! One state machine per interaction protocol.
//!
//! ## Overview
//!
//! A [`Flow`] is a closed union over the nine protocols. The first token of
//! an interaction picks the variant (see [`FlowType::first_message_type`]),
//! and every later token is applied with [`Flow::apply`], which returns the
//! next state, a soft rejection, or a hard [`FlowError`].
//!
//! Transitions do no I/O. Anything that needs a resolver or a clock (who the
//! participants are, whether credential signatures verify, the current
//! time) is computed by the caller and passed in a [`TransitionContext`].
//!
//! ## Protocols
//!
//! | Flow | Phases |
//! |---|---|
//! | Authentication | empty, described |
//! | Authorization | empty, described, authorized |
//! | EstablishChannel | init, hasTransports, established |
//! | CredentialOffer | init, offered, selected, issued |
//! | CredentialShare | init, constrained, provided |
//! | Encrypt / Decrypt / Sign | empty, requested, responded |
//! | Resolution | empty, requested, resolved |

pub mod authentication;
pub mod authorization;
pub mod channel;
pub mod credential_offer;
pub mod credential_share;
pub mod error;
pub mod flow;
pub mod resolution;
pub mod rpc;

pub use authentication::AuthenticationState;
pub use authorization::AuthorizationState;
pub use channel::{ChannelPhase, EstablishChannelState};
pub use credential_offer::{CredentialOfferState, OfferPhase};
pub use credential_share::{CredentialShareState, SharePhase};
pub use error::{FlowError, Result};
pub use flow::{CredentialCheck, Flow, FlowType, Outcome, TransitionContext};
pub use resolution::ResolutionState;
pub use rpc::{RpcKind, RpcState};
