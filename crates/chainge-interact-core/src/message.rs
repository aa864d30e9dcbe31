//! Typed message bodies carried in token payloads.
//!
//! Each interaction type has exactly one body shape. Bodies are JSON with
//! camelCase field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credential::{CredentialOffer, CredentialRequirement, SelectedCredential, SignedCredential};
use crate::error::CoreError;
use crate::token::InteractionType;
use crate::types::Did;

/// A transport the requester offers for a channel: `{type, config}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

impl TransportDescriptor {
    pub fn new(kind: impl Into<String>, config: Value) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationBody {
    pub description: String,
    #[serde(rename = "callbackURL", default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub description: String,
    #[serde(rename = "imageURL", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
}

/// Echo of the authorization details the responder agrees to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDetails {
    pub description: String,
    #[serde(rename = "imageURL", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl From<&AuthorizationRequest> for AuthorizationDetails {
    fn from(req: &AuthorizationRequest) -> Self {
        Self {
            description: req.description.clone(),
            image_url: req.image_url.clone(),
            action: req.action.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstablishChannelRequest {
    pub description: String,
    pub transports: Vec<TransportDescriptor>,
}

/// Selected transport index. Signed so that bad input is representable and
/// can be rejected by the flow rather than by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstablishChannelResponse {
    pub transport_idx: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialOfferRequest {
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    pub offered_credentials: Vec<CredentialOffer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialOfferResponse {
    pub selected_credentials: Vec<SelectedCredential>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsReceive {
    pub signed_credentials: Vec<SignedCredential>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    pub credential_requirements: Vec<CredentialRequirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    pub supplied_credentials: Vec<SignedCredential>,
}

/// Inner request of an encrypt/decrypt/sign call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Did>,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    pub request: RpcPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(with = "base64_bytes")]
    pub result: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolutionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(rename = "callbackURL", default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResponse {
    #[serde(rename = "@context", default)]
    pub context: Value,
    #[serde(default)]
    pub did_document: Value,
    #[serde(default)]
    pub resolver_metadata: Value,
    #[serde(default)]
    pub method_metadata: Value,
}

/// A decoded token payload, tagged by interaction type.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Authentication(AuthenticationBody),
    AuthorizationRequest(AuthorizationRequest),
    AuthorizationResponse(AuthorizationDetails),
    EstablishChannelRequest(EstablishChannelRequest),
    EstablishChannelResponse(EstablishChannelResponse),
    CredentialOfferRequest(CredentialOfferRequest),
    CredentialOfferResponse(CredentialOfferResponse),
    CredentialsReceive(CredentialsReceive),
    CredentialRequest(CredentialRequest),
    CredentialResponse(CredentialResponse),
    EncryptionRequest(RpcRequest),
    EncryptionResponse(RpcResponse),
    DecryptionRequest(RpcRequest),
    DecryptionResponse(RpcResponse),
    SigningRequest(RpcRequest),
    SigningResponse(RpcResponse),
    ResolutionRequest(ResolutionRequest),
    ResolutionResponse(ResolutionResponse),
}

impl Message {
    pub fn interaction_type(&self) -> InteractionType {
        match self {
            Message::Authentication(_) => InteractionType::Authentication,
            Message::AuthorizationRequest(_) => InteractionType::AuthorizationRequest,
            Message::AuthorizationResponse(_) => InteractionType::AuthorizationResponse,
            Message::EstablishChannelRequest(_) => InteractionType::EstablishChannelRequest,
            Message::EstablishChannelResponse(_) => InteractionType::EstablishChannelResponse,
            Message::CredentialOfferRequest(_) => InteractionType::CredentialOfferRequest,
            Message::CredentialOfferResponse(_) => InteractionType::CredentialOfferResponse,
            Message::CredentialsReceive(_) => InteractionType::CredentialsReceive,
            Message::CredentialRequest(_) => InteractionType::CredentialRequest,
            Message::CredentialResponse(_) => InteractionType::CredentialResponse,
            Message::EncryptionRequest(_) => InteractionType::EncryptionRequest,
            Message::EncryptionResponse(_) => InteractionType::EncryptionResponse,
            Message::DecryptionRequest(_) => InteractionType::DecryptionRequest,
            Message::DecryptionResponse(_) => InteractionType::DecryptionResponse,
            Message::SigningRequest(_) => InteractionType::SigningRequest,
            Message::SigningResponse(_) => InteractionType::SigningResponse,
            Message::ResolutionRequest(_) => InteractionType::ResolutionRequest,
            Message::ResolutionResponse(_) => InteractionType::ResolutionResponse,
        }
    }

    /// The callback locator the sender asked replies to be posted to.
    pub fn callback_url(&self) -> Option<&str> {
        match self {
            Message::Authentication(b) => b.callback_url.as_deref(),
            Message::AuthorizationRequest(b) => Some(&b.callback_url),
            Message::CredentialOfferRequest(b) => Some(&b.callback_url),
            Message::CredentialRequest(b) => Some(&b.callback_url),
            Message::EncryptionRequest(b)
            | Message::DecryptionRequest(b)
            | Message::SigningRequest(b) => Some(&b.callback_url),
            Message::ResolutionRequest(b) => b.callback_url.as_deref(),
            Message::AuthorizationResponse(_)
            | Message::EstablishChannelRequest(_)
            | Message::EstablishChannelResponse(_)
            | Message::CredentialOfferResponse(_)
            | Message::CredentialsReceive(_)
            | Message::CredentialResponse(_)
            | Message::EncryptionResponse(_)
            | Message::DecryptionResponse(_)
            | Message::SigningResponse(_)
            | Message::ResolutionResponse(_) => None,
        }
    }

    /// Credentials carried by the message, in message order.
    pub fn credentials(&self) -> &[SignedCredential] {
        match self {
            Message::CredentialsReceive(b) => &b.signed_credentials,
            Message::CredentialResponse(b) => &b.supplied_credentials,
            _ => &[],
        }
    }

    /// JSON-encode the body.
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        let encoded = match self {
            Message::Authentication(b) => serde_json::to_vec(b),
            Message::AuthorizationRequest(b) => serde_json::to_vec(b),
            Message::AuthorizationResponse(b) => serde_json::to_vec(b),
            Message::EstablishChannelRequest(b) => serde_json::to_vec(b),
            Message::EstablishChannelResponse(b) => serde_json::to_vec(b),
            Message::CredentialOfferRequest(b) => serde_json::to_vec(b),
            Message::CredentialOfferResponse(b) => serde_json::to_vec(b),
            Message::CredentialsReceive(b) => serde_json::to_vec(b),
            Message::CredentialRequest(b) => serde_json::to_vec(b),
            Message::CredentialResponse(b) => serde_json::to_vec(b),
            Message::EncryptionRequest(b)
            | Message::DecryptionRequest(b)
            | Message::SigningRequest(b) => serde_json::to_vec(b),
            Message::EncryptionResponse(b)
            | Message::DecryptionResponse(b)
            | Message::SigningResponse(b) => serde_json::to_vec(b),
            Message::ResolutionRequest(b) => serde_json::to_vec(b),
            Message::ResolutionResponse(b) => serde_json::to_vec(b),
        };
        encoded.map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    /// Decode a body of the given type.
    pub fn decode(kind: InteractionType, payload: &[u8]) -> Result<Self, CoreError> {
        fn body<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, CoreError> {
            serde_json::from_slice(payload).map_err(|e| CoreError::MalformedPayload(e.to_string()))
        }

        Ok(match kind {
            InteractionType::Authentication => Message::Authentication(body(payload)?),
            InteractionType::AuthorizationRequest => Message::AuthorizationRequest(body(payload)?),
            InteractionType::AuthorizationResponse => {
                Message::AuthorizationResponse(body(payload)?)
            }
            InteractionType::EstablishChannelRequest => {
                Message::EstablishChannelRequest(body(payload)?)
            }
            InteractionType::EstablishChannelResponse => {
                Message::EstablishChannelResponse(body(payload)?)
            }
            InteractionType::CredentialOfferRequest => {
                Message::CredentialOfferRequest(body(payload)?)
            }
            InteractionType::CredentialOfferResponse => {
                Message::CredentialOfferResponse(body(payload)?)
            }
            InteractionType::CredentialsReceive => Message::CredentialsReceive(body(payload)?),
            InteractionType::CredentialRequest => Message::CredentialRequest(body(payload)?),
            InteractionType::CredentialResponse => Message::CredentialResponse(body(payload)?),
            InteractionType::EncryptionRequest => Message::EncryptionRequest(body(payload)?),
            InteractionType::EncryptionResponse => Message::EncryptionResponse(body(payload)?),
            InteractionType::DecryptionRequest => Message::DecryptionRequest(body(payload)?),
            InteractionType::DecryptionResponse => Message::DecryptionResponse(body(payload)?),
            InteractionType::SigningRequest => Message::SigningRequest(body(payload)?),
            InteractionType::SigningResponse => Message::SigningResponse(body(payload)?),
            InteractionType::ResolutionRequest => Message::ResolutionRequest(body(payload)?),
            InteractionType::ResolutionResponse => Message::ResolutionResponse(body(payload)?),
        })
    }
}

/// Standard base64 for binary fields inside JSON bodies.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_field_names() {
        let msg = Message::AuthorizationRequest(AuthorizationRequest {
            description: "open door".into(),
            image_url: Some("https://img".into()),
            action: None,
            callback_url: "https://cb".into(),
        });
        let value: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"description": "open door", "imageURL": "https://img", "callbackURL": "https://cb"})
        );
    }

    #[test]
    fn test_establish_channel_shapes() {
        let req = br#"{"description":"chan","transports":[{"type":"websocket","config":"ws://h"}]}"#;
        let msg = Message::decode(InteractionType::EstablishChannelRequest, req).unwrap();
        match msg {
            Message::EstablishChannelRequest(body) => {
                assert_eq!(body.transports[0].kind, "websocket");
                assert_eq!(body.transports[0].config, json!("ws://h"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let resp = Message::decode(InteractionType::EstablishChannelResponse, br#"{"transportIdx":0}"#)
            .unwrap();
        assert_eq!(
            resp,
            Message::EstablishChannelResponse(EstablishChannelResponse { transport_idx: 0 })
        );
    }

    #[test]
    fn test_rpc_data_is_base64() {
        let msg = Message::SigningRequest(RpcRequest {
            callback_url: "https://cb".into(),
            request: RpcPayload {
                target: None,
                data: b"hello".to_vec(),
            },
        });
        let value: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["request"]["data"], json!("aGVsbG8="));
    }

    #[test]
    fn test_invalid_base64_result_rejected() {
        let err = Message::decode(InteractionType::SigningResponse, br#"{"result":"***"}"#);
        assert!(matches!(err, Err(CoreError::MalformedPayload(_))));
    }

    #[test]
    fn test_resolution_response_context_key() {
        let raw = br#"{"@context":"https://w3id.org/did-resolution/v1","didDocument":{"id":"did:x:y"},"resolverMetadata":{},"methodMetadata":{}}"#;
        let msg = Message::decode(InteractionType::ResolutionResponse, raw).unwrap();
        match &msg {
            Message::ResolutionResponse(r) => {
                assert_eq!(r.did_document["id"], json!("did:x:y"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(msg.callback_url(), None);
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let err = Message::decode(InteractionType::CredentialOfferResponse, br#"{"foo":1}"#);
        assert!(err.is_err());
    }
}
