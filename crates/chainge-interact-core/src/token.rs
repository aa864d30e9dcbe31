//! Token: the signed envelope exchanged between two parties.
//!
//! A token is immutable once signed. Each interaction is an ordered chain of
//! tokens sharing one nonce, where every token after the first names its
//! predecessor by id.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::{canonical_bytes, decode_token, signed_message_from_parts};
use crate::crypto::{Blake3Hash, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::message::Message;
use crate::types::{now_millis, Did, Nonce, TokenId};

/// The current token schema version.
pub const TOKEN_VERSION: u8 = 0;

/// Protocol discriminant carried in every token header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum InteractionType {
    // Authentication (0x0001) shares one type for request and response.
    Authentication = 0x0001,

    AuthorizationRequest = 0x0010,
    AuthorizationResponse = 0x0011,

    CredentialOfferRequest = 0x0020,
    CredentialOfferResponse = 0x0021,
    CredentialsReceive = 0x0022,

    CredentialRequest = 0x0030,
    CredentialResponse = 0x0031,

    EstablishChannelRequest = 0x0040,
    EstablishChannelResponse = 0x0041,

    EncryptionRequest = 0x0050,
    EncryptionResponse = 0x0051,

    DecryptionRequest = 0x0060,
    DecryptionResponse = 0x0061,

    SigningRequest = 0x0070,
    SigningResponse = 0x0071,

    ResolutionRequest = 0x0080,
    ResolutionResponse = 0x0081,
}

impl InteractionType {
    /// Every interaction type, in code order.
    pub const ALL: [InteractionType; 18] = [
        Self::Authentication,
        Self::AuthorizationRequest,
        Self::AuthorizationResponse,
        Self::CredentialOfferRequest,
        Self::CredentialOfferResponse,
        Self::CredentialsReceive,
        Self::CredentialRequest,
        Self::CredentialResponse,
        Self::EstablishChannelRequest,
        Self::EstablishChannelResponse,
        Self::EncryptionRequest,
        Self::EncryptionResponse,
        Self::DecryptionRequest,
        Self::DecryptionResponse,
        Self::SigningRequest,
        Self::SigningResponse,
        Self::ResolutionRequest,
        Self::ResolutionResponse,
    ];

    /// Convert to u16 for serialization.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Try to parse from u16.
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.to_u16() == value)
    }

    /// Stable text name, used for storage and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::AuthorizationRequest => "authorizationRequest",
            Self::AuthorizationResponse => "authorizationResponse",
            Self::CredentialOfferRequest => "credentialOfferRequest",
            Self::CredentialOfferResponse => "credentialOfferResponse",
            Self::CredentialsReceive => "credentialsReceive",
            Self::CredentialRequest => "credentialRequest",
            Self::CredentialResponse => "credentialResponse",
            Self::EstablishChannelRequest => "establishChannelRequest",
            Self::EstablishChannelResponse => "establishChannelResponse",
            Self::EncryptionRequest => "encryptionRequest",
            Self::EncryptionResponse => "encryptionResponse",
            Self::DecryptionRequest => "decryptionRequest",
            Self::DecryptionResponse => "decryptionResponse",
            Self::SigningRequest => "signingRequest",
            Self::SigningResponse => "signingResponse",
            Self::ResolutionRequest => "resolutionRequest",
            Self::ResolutionResponse => "resolutionResponse",
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The header of a token, containing all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Schema version (currently 0).
    pub version: u8,

    /// Correlation id shared by every token of one interaction.
    pub nonce: Nonce,

    /// How the payload is interpreted.
    pub interaction_type: InteractionType,

    /// The signer.
    pub issuer: Did,

    /// Intended recipient, when known.
    pub audience: Option<Did>,

    /// Position within the interaction (1-indexed).
    pub seq: u32,

    /// Issuer-claimed creation time (Unix milliseconds).
    pub issued_at: i64,

    /// Expiry (Unix milliseconds), if any.
    pub expires_at: Option<i64>,

    /// Id of the previous token in the interaction (None if seq=1).
    pub prev_token_id: Option<TokenId>,

    /// Blake3 hash of the payload bytes.
    pub payload_hash: Blake3Hash,
}

/// A complete token: header + payload + signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub header: TokenHeader,

    /// JSON encoding of the message body.
    pub payload: Bytes,

    /// Ed25519 signature over (canonical_header || payload).
    pub signature: Ed25519Signature,
}

impl Token {
    /// Compute the token ID (Blake3 hash of canonical bytes).
    pub fn compute_id(&self) -> TokenId {
        TokenId(Blake3Hash::hash(&canonical_bytes(self)).0)
    }

    pub fn nonce(&self) -> &Nonce {
        &self.header.nonce
    }

    pub fn issuer(&self) -> &Did {
        &self.header.issuer
    }

    pub fn seq(&self) -> u32 {
        self.header.seq
    }

    pub fn interaction_type(&self) -> InteractionType {
        self.header.interaction_type
    }

    /// Decode the typed message body.
    pub fn message(&self) -> Result<Message, CoreError> {
        Message::decode(self.header.interaction_type, &self.payload)
    }

    /// Check whether the token has expired at `now` (Unix ms).
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.header.expires_at, Some(at) if at <= now)
    }

    /// Wire form: base64url (no padding) of the canonical bytes.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(canonical_bytes(self))
    }

    /// Parse the wire form.
    pub fn decode(raw: &str) -> Result<Self, CoreError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|e| CoreError::DecodingError(e.to_string()))?;
        decode_token(&bytes)
    }
}

/// Builder for creating signed tokens.
///
/// `request` starts a new interaction; `reply` continues one after `prev`.
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    message: Message,
    nonce: Nonce,
    issuer: Option<Did>,
    audience: Option<Did>,
    seq: u32,
    issued_at: Option<i64>,
    expires_at: Option<i64>,
    prev_token_id: Option<TokenId>,
}

impl TokenBuilder {
    /// First token of a new interaction, under a fresh nonce.
    pub fn request(message: Message) -> Self {
        Self {
            message,
            nonce: Nonce::random(),
            issuer: None,
            audience: None,
            seq: 1,
            issued_at: None,
            expires_at: None,
            prev_token_id: None,
        }
    }

    /// Next token after `prev`, addressed to its issuer.
    pub fn reply(message: Message, prev: &Token) -> Self {
        Self {
            message,
            nonce: prev.header.nonce.clone(),
            issuer: None,
            audience: Some(prev.header.issuer.clone()),
            seq: prev.header.seq.saturating_add(1),
            issued_at: None,
            expires_at: None,
            prev_token_id: Some(prev.compute_id()),
        }
    }

    /// Override the nonce of a first token.
    pub fn nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = nonce;
        self
    }

    /// Set the issuer. Defaults to the DID of the signing key.
    pub fn issuer(mut self, issuer: Did) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn audience(mut self, audience: Option<Did>) -> Self {
        self.audience = audience;
        self
    }

    /// Set the creation time. Defaults to now.
    pub fn issued_at(mut self, issued_at: i64) -> Self {
        self.issued_at = Some(issued_at);
        self
    }

    pub fn expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set expiry relative to the creation time.
    pub fn ttl_millis(mut self, ttl: i64) -> Self {
        let issued_at = *self.issued_at.get_or_insert_with(now_millis);
        self.expires_at = Some(issued_at.saturating_add(ttl));
        self
    }

    /// The message this builder will sign.
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn nonce_ref(&self) -> &Nonce {
        &self.nonce
    }

    /// Encode the payload, sign, and produce the token.
    pub fn sign(self, keypair: &Keypair) -> Result<Token, CoreError> {
        let payload = self.message.encode()?;
        let header = TokenHeader {
            version: TOKEN_VERSION,
            nonce: self.nonce,
            interaction_type: self.message.interaction_type(),
            issuer: self
                .issuer
                .unwrap_or_else(|| Did::from_public_key(&keypair.public_key())),
            audience: self.audience,
            seq: self.seq,
            issued_at: self.issued_at.unwrap_or_else(now_millis),
            expires_at: self.expires_at,
            prev_token_id: self.prev_token_id,
            payload_hash: Blake3Hash::hash(&payload),
        };

        let signature = keypair.sign(&signed_message_from_parts(&header, &payload));

        Ok(Token {
            header,
            payload: payload.into(),
            signature,
        })
    }
}
