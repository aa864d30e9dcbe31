//! Strong type definitions for Chainge Interact.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::Ed25519PublicKey;
use crate::error::CoreError;

/// A 32-byte token identifier, computed as Blake3(canonical_bytes(token)).
///
/// Each token after the first in an interaction names its predecessor by
/// this id, which is what makes the message list a hash chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(pub [u8; 32]);

impl TokenId {
    /// Create a new TokenId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl From<[u8; 32]> for TokenId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Correlation id of an interaction, taken from its first token.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a fresh random nonce (16 bytes, hex).
    pub fn random() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    /// Wrap an existing nonce string.
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        if value.is_empty() {
            return Err(CoreError::MalformedToken("empty nonce".into()));
        }
        Ok(Self(value))
    }

    /// Borrow the nonce as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.0)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prefix of identifiers minted by this workspace.
pub const DID_METHOD_PREFIX: &str = "did:chainge:";

/// A decentralized identifier naming a signer.
///
/// Only the `did:<method>:<id>` shape is checked. Mapping an identifier to
/// keys is the resolver's job.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Derive the identifier for an Ed25519 signing key.
    pub fn from_public_key(key: &Ed25519PublicKey) -> Self {
        Self(format!("{}{}", DID_METHOD_PREFIX, key.to_hex()))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The DID method name (`chainge` in `did:chainge:...`).
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }
}

impl FromStr for Did {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("did"), Some(method), Some(id)) if !method.is_empty() && !id.is_empty() => {
                Ok(Self(s.to_string()))
            }
            _ => Err(CoreError::InvalidDid(s.to_string())),
        }
    }
}

impl TryFrom<String> for Did {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn test_token_id_hex_roundtrip() {
        let id = TokenId::from_bytes([0x42; 32]);
        let hex = id.to_hex();
        let recovered = TokenId::from_hex(&hex).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_token_id_display() {
        let id = TokenId::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", id), "abababababababab");
    }

    #[test]
    fn test_nonce_random_is_unique() {
        let a = Nonce::random();
        let b = Nonce::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_empty_nonce_rejected() {
        assert!(Nonce::new("").is_err());
    }

    #[test]
    fn test_did_from_public_key() {
        let keypair = Keypair::from_seed(&[0x07; 32]);
        let did = Did::from_public_key(&keypair.public_key());
        assert!(did.as_str().starts_with(DID_METHOD_PREFIX));
        assert_eq!(did.method(), "chainge");
    }

    #[test]
    fn test_did_parse() {
        assert!("did:web:example.com".parse::<Did>().is_ok());
        assert!("not-a-did".parse::<Did>().is_err());
        assert!("did::x".parse::<Did>().is_err());
    }

    #[test]
    fn test_did_serde_validates() {
        let ok: Result<Did, _> = serde_json::from_str("\"did:chainge:abc\"");
        assert!(ok.is_ok());
        let bad: Result<Did, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
