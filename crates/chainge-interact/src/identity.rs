//! Identity contracts: the wallet that signs and decrypts for us, and the
//! resolver that maps DIDs to keys.
//!
//! [`SoftwareWallet`] and [`MemoryResolver`] are in-process implementations
//! used by hosts without a hardware or remote wallet, and by tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use chainge_interact_core::{
    Did, Ed25519PublicKey, Ed25519Signature, Keypair, SignedCredential, Token, TokenBuilder,
    UnsignedCredential, DID_METHOD_PREFIX,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::IdentityError;

type Result<T> = std::result::Result<T, IdentityError>;

/// An X25519 public key used to encrypt data to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionPublicKey(pub [u8; 32]);

impl EncryptionPublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// A resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub did: Did,
    pub signing_key: Ed25519PublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<EncryptionPublicKey>,
}

impl Identity {
    /// Recover the signing key embedded in a `did:chainge:` identifier.
    /// Such identities carry no encryption key.
    pub fn from_did(did: &Did) -> Result<Self> {
        let key = did
            .as_str()
            .strip_prefix(DID_METHOD_PREFIX)
            .ok_or_else(|| IdentityError::UnknownIdentity(did.to_string()))
            .and_then(|hex| {
                Ed25519PublicKey::from_hex(hex)
                    .map_err(|_| IdentityError::UnknownIdentity(did.to_string()))
            })?;
        Ok(Self {
            did: did.clone(),
            signing_key: key,
            encryption_key: None,
        })
    }

    /// A minimal DID document for resolution responses.
    pub fn did_document(&self) -> Value {
        let did = self.did.as_str();
        let mut doc = json!({
            "@context": "https://www.w3.org/ns/did/v1",
            "id": did,
            "verificationMethod": [{
                "id": format!("{did}#signing"),
                "type": "Ed25519VerificationKey2018",
                "controller": did,
                "publicKeyHex": self.signing_key.to_hex(),
            }],
            "authentication": [format!("{did}#signing")],
        });
        if let Some(key) = &self.encryption_key {
            doc["keyAgreement"] = json!([{
                "id": format!("{did}#encryption"),
                "type": "X25519KeyAgreementKey2019",
                "controller": did,
                "publicKeyHex": key.to_hex(),
            }]);
        }
        doc
    }
}

/// Maps identifiers to keys.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, did: &Did) -> Result<Identity>;
}

/// Produces signatures and plaintext for the local identity.
#[async_trait]
pub trait IdentityWallet: Send + Sync {
    fn did(&self) -> &Did;

    /// The public view of this wallet's identity.
    fn identity(&self) -> Identity;

    /// Sign an interaction token as this identity.
    async fn sign_token(&self, builder: TokenBuilder) -> Result<Token>;

    /// Sign a credential. The credential's issuer should be this identity.
    async fn sign_credential(&self, credential: UnsignedCredential) -> Result<SignedCredential>;

    async fn sign_data(&self, data: &[u8]) -> Result<Ed25519Signature>;

    /// Encrypt `data` so that only `recipient` can read it.
    async fn encrypt(&self, recipient: &Identity, data: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt data encrypted to this identity.
    async fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Sealed boxes
// ─────────────────────────────────────────────────────────────────────────────

const SEAL_CONTEXT: &str = "chainge-interact v0 sealed box";
const SEAL_HEADER: usize = 32 + 12;

fn seal_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(SEAL_CONTEXT);
    hasher.update(shared);
    hasher.update(ephemeral);
    hasher.update(recipient);
    *hasher.finalize().as_bytes()
}

/// `ephemeral_public || nonce || ciphertext`, ChaCha20-Poly1305 under a key
/// agreed between a fresh ephemeral key and the recipient.
fn seal(recipient: &EncryptionPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&PublicKey::from(recipient.0));
    let key = seal_key(shared.as_bytes(), ephemeral_public.as_bytes(), &recipient.0);

    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| IdentityError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(chacha20poly1305::Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| IdentityError::Encryption(e.to_string()))?;

    let mut sealed = Vec::with_capacity(SEAL_HEADER + ciphertext.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open(secret: &StaticSecret, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < SEAL_HEADER {
        return Err(IdentityError::Decryption("sealed box too short".into()));
    }
    let (ephemeral, rest) = sealed.split_at(32);
    let (nonce, ciphertext) = rest.split_at(12);

    let mut ephemeral_bytes = [0u8; 32];
    ephemeral_bytes.copy_from_slice(ephemeral);
    let recipient = PublicKey::from(secret);
    let shared = secret.diffie_hellman(&PublicKey::from(ephemeral_bytes));
    let key = seal_key(shared.as_bytes(), &ephemeral_bytes, recipient.as_bytes());

    let cipher = ChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| IdentityError::Decryption(e.to_string()))?;
    cipher
        .decrypt(chacha20poly1305::Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| IdentityError::Decryption(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Software wallet
// ─────────────────────────────────────────────────────────────────────────────

/// Wallet holding an Ed25519 signing key and an X25519 encryption key in
/// process memory.
pub struct SoftwareWallet {
    keypair: Keypair,
    encryption: StaticSecret,
    did: Did,
}

impl SoftwareWallet {
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Deterministic wallet. Both keys derive from `seed`.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let keypair = Keypair::from_seed(seed);
        let encryption = StaticSecret::from(blake3::derive_key(
            "chainge-interact v0 wallet encryption key",
            seed,
        ));
        let did = Did::from_public_key(&keypair.public_key());
        Self {
            keypair,
            encryption,
            did,
        }
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn encryption_key(&self) -> EncryptionPublicKey {
        EncryptionPublicKey(*PublicKey::from(&self.encryption).as_bytes())
    }
}

impl fmt::Debug for SoftwareWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SoftwareWallet({})", self.did)
    }
}

#[async_trait]
impl IdentityWallet for SoftwareWallet {
    fn did(&self) -> &Did {
        &self.did
    }

    fn identity(&self) -> Identity {
        Identity {
            did: self.did.clone(),
            signing_key: self.keypair.public_key(),
            encryption_key: Some(self.encryption_key()),
        }
    }

    async fn sign_token(&self, builder: TokenBuilder) -> Result<Token> {
        Ok(builder.issuer(self.did.clone()).sign(&self.keypair)?)
    }

    async fn sign_credential(&self, credential: UnsignedCredential) -> Result<SignedCredential> {
        let signature = self.keypair.sign(&credential.signing_bytes()?);
        Ok(credential.into_signed(signature))
    }

    async fn sign_data(&self, data: &[u8]) -> Result<Ed25519Signature> {
        Ok(self.keypair.sign(data))
    }

    async fn encrypt(&self, recipient: &Identity, data: &[u8]) -> Result<Vec<u8>> {
        let key = recipient
            .encryption_key
            .ok_or_else(|| IdentityError::NoEncryptionKey(recipient.did.to_string()))?;
        seal(&key, data)
    }

    async fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        open(&self.encryption, data)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Resolver backed by a local registry.
///
/// Registered identities win. Unregistered `did:chainge:` identifiers
/// resolve to the signing key they embed.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    identities: RwLock<HashMap<Did, Identity>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, identity: Identity) {
        self.identities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.did.clone(), identity);
    }
}

#[async_trait]
impl Resolver for MemoryResolver {
    async fn resolve(&self, did: &Did) -> Result<Identity> {
        let registered = self
            .identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(did)
            .cloned();
        match registered {
            Some(identity) => Ok(identity),
            None => Identity::from_did(did),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainge_interact_core::{AuthenticationBody, Message};

    #[tokio::test]
    async fn test_seal_round_trip() {
        let alice = SoftwareWallet::from_seed(&[1; 32]);
        let bob = SoftwareWallet::from_seed(&[2; 32]);

        let sealed = alice.encrypt(&bob.identity(), b"secret").await.unwrap();
        assert_eq!(bob.decrypt(&sealed).await.unwrap(), b"secret");
        assert!(matches!(
            alice.decrypt(&sealed).await,
            Err(IdentityError::Decryption(_))
        ));
    }

    #[tokio::test]
    async fn test_encrypt_needs_encryption_key() {
        let alice = SoftwareWallet::from_seed(&[1; 32]);
        let bare = Identity::from_did(alice.did()).unwrap();
        assert!(matches!(
            alice.encrypt(&bare, b"x").await,
            Err(IdentityError::NoEncryptionKey(_))
        ));
    }

    #[tokio::test]
    async fn test_resolver_prefers_registered() {
        let wallet = SoftwareWallet::from_seed(&[3; 32]);
        let resolver = MemoryResolver::new();

        let derived = resolver.resolve(wallet.did()).await.unwrap();
        assert_eq!(derived.signing_key, wallet.keypair().public_key());
        assert!(derived.encryption_key.is_none());

        resolver.register(wallet.identity());
        let registered = resolver.resolve(wallet.did()).await.unwrap();
        assert_eq!(registered.encryption_key, Some(wallet.encryption_key()));
    }

    #[tokio::test]
    async fn test_foreign_did_is_unknown() {
        let resolver = MemoryResolver::new();
        let did: Did = "did:web:example.com".parse().unwrap();
        assert!(matches!(
            resolver.resolve(&did).await,
            Err(IdentityError::UnknownIdentity(_))
        ));
    }

    #[tokio::test]
    async fn test_signed_token_verifies() {
        let wallet = SoftwareWallet::from_seed(&[4; 32]);
        let token = wallet
            .sign_token(TokenBuilder::request(Message::Authentication(
                AuthenticationBody {
                    description: "hi".into(),
                    callback_url: None,
                },
            )))
            .await
            .unwrap();
        assert_eq!(token.issuer(), wallet.did());
        chainge_interact_core::validate_token(
            &token,
            &wallet.keypair().public_key(),
            chainge_interact_core::now_millis(),
        )
        .unwrap();
    }

    #[test]
    fn test_did_document_lists_keys() {
        let wallet = SoftwareWallet::from_seed(&[5; 32]);
        let doc = wallet.identity().did_document();
        assert_eq!(doc["id"], wallet.did().as_str());
        assert_eq!(
            doc["keyAgreement"][0]["publicKeyHex"],
            wallet.encryption_key().to_hex()
        );
    }
}
