//! # Chainge Interact Core
//!
//! Pure primitives for Chainge Interact: tokens, message bodies,
//! credentials, and canonicalization.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Token`] - A signed, chained protocol message
//! - [`TokenId`] - Content-addressed identifier (Blake3 hash)
//! - [`Nonce`] - Correlation id of an interaction
//! - [`Message`] - Typed body, one variant per [`InteractionType`]
//! - [`SignedCredential`] - Issuer-signed credential
//!
//! ## Canonicalization
//!
//! Token headers are encoded using deterministic CBOR. See [`canonical`].

pub mod canonical;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod message;
pub mod token;
pub mod types;
pub mod validation;

pub use canonical::{canonical_bytes, canonical_header_bytes, decode_token};
pub use credential::{
    requirements_satisfied, Constraint, CredentialOffer, CredentialRequirement,
    SelectedCredential, SignedCredential, UnsignedCredential,
};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ValidationError};
pub use message::{
    AuthenticationBody, AuthorizationDetails, AuthorizationRequest, CredentialOfferRequest,
    CredentialOfferResponse, CredentialRequest, CredentialResponse, CredentialsReceive,
    EstablishChannelRequest, EstablishChannelResponse, Message, ResolutionRequest,
    ResolutionResponse, RpcPayload, RpcRequest, RpcResponse, TransportDescriptor,
};
pub use token::{InteractionType, Token, TokenBuilder, TokenHeader, TOKEN_VERSION};
pub use types::{now_millis, Did, Nonce, TokenId, DID_METHOD_PREFIX};
pub use validation::{
    validate_first, validate_successor, validate_token, validate_token_structure,
    MAX_CLOCK_SKEW_MILLIS,
};
