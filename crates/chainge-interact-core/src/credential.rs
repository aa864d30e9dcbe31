//! Verifiable credentials and the requirement language used to ask for them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crypto::{Ed25519PublicKey, Ed25519Signature};
use crate::error::CoreError;
use crate::types::Did;

/// Domain separator for credential signatures.
const CREDENTIAL_DOMAIN: &[u8] = b"chainge-interact/credential/v0\n";

/// A credential before the issuer signs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedCredential {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub issuer: Did,
    pub subject: Did,
    #[serde(default)]
    pub claim: Value,
    /// Issue time (Unix ms).
    pub issued: i64,
    /// Expiry (Unix ms), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
}

impl UnsignedCredential {
    /// Bytes the issuer signs.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let body = serde_json::to_vec(self).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        let mut buf = Vec::with_capacity(CREDENTIAL_DOMAIN.len() + body.len());
        buf.extend_from_slice(CREDENTIAL_DOMAIN);
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Attach an issuer signature.
    pub fn into_signed(self, signature: Ed25519Signature) -> SignedCredential {
        SignedCredential {
            id: self.id,
            kind: self.kind,
            issuer: self.issuer,
            subject: self.subject,
            claim: self.claim,
            issued: self.issued,
            expires: self.expires,
            signature,
        }
    }
}

/// A credential signed by its issuer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedCredential {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub issuer: Did,
    pub subject: Did,
    #[serde(default)]
    pub claim: Value,
    pub issued: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    pub signature: Ed25519Signature,
}

impl SignedCredential {
    /// The credential without its signature.
    pub fn unsigned(&self) -> UnsignedCredential {
        UnsignedCredential {
            id: self.id.clone(),
            kind: self.kind.clone(),
            issuer: self.issuer.clone(),
            subject: self.subject.clone(),
            claim: self.claim.clone(),
            issued: self.issued,
            expires: self.expires,
        }
    }

    /// Verify the issuer signature with the issuer's resolved key.
    pub fn verify(&self, issuer_key: &Ed25519PublicKey) -> Result<(), CoreError> {
        let message = self.unsigned().signing_bytes()?;
        issuer_key.verify(&message, &self.signature)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires, Some(at) if at <= now)
    }

    /// Look up a dotted path (`claim.age`) in the credential's JSON view.
    pub fn field(&self, path: &str) -> Option<Value> {
        let mut current = serde_json::to_value(self).ok()?;
        for segment in path.split('.') {
            current = match current {
                Value::Object(mut map) => map.remove(segment)?,
                Value::Array(mut items) => {
                    let idx: usize = segment.parse().ok()?;
                    if idx >= items.len() {
                        return None;
                    }
                    items.swap_remove(idx)
                }
                _ => return None,
            };
        }
        Some(current)
    }
}

/// One entry of a credential offer: `{type, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialOffer {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl CredentialOffer {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            metadata: Map::new(),
        }
    }
}

/// A type chosen from an offer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectedCredential {
    #[serde(rename = "type")]
    pub kind: String,
}

impl SelectedCredential {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

/// A comparison over a dotted field path of a credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Constraint {
    Is { path: String, value: Value },
    Not { path: String, value: Value },
    GreaterThan { path: String, value: Value },
    SmallerThan { path: String, value: Value },
}

impl Constraint {
    /// Check the constraint against a credential. A missing field fails every
    /// comparison except `not`.
    pub fn holds_for(&self, credential: &SignedCredential) -> bool {
        match self {
            Constraint::Is { path, value } => credential.field(path).as_ref() == Some(value),
            Constraint::Not { path, value } => credential.field(path).as_ref() != Some(value),
            Constraint::GreaterThan { path, value } => {
                compare(credential.field(path).as_ref(), value) == Some(std::cmp::Ordering::Greater)
            }
            Constraint::SmallerThan { path, value } => {
                compare(credential.field(path).as_ref(), value) == Some(std::cmp::Ordering::Less)
            }
        }
    }
}

fn compare(actual: Option<&Value>, expected: &Value) -> Option<std::cmp::Ordering> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// A credential a verifier asks for: `{type, constraints}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRequirement {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl CredentialRequirement {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn is_met_by(&self, credential: &SignedCredential) -> bool {
        credential.kind == self.kind && self.constraints.iter().all(|c| c.holds_for(credential))
    }
}

/// True when every requirement is met by at least one supplied credential.
pub fn requirements_satisfied(
    requirements: &[CredentialRequirement],
    credentials: &[SignedCredential],
) -> bool {
    requirements
        .iter()
        .all(|req| credentials.iter().any(|c| req.is_met_by(c)))
}
