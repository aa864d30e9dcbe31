//! Token validation: structural checks, chain checks, and signatures.
//!
//! Chain checks tie a token to the one before it in the same interaction.
//! Together they reject replays and out-of-order delivery.

use crate::canonical::signed_message;
use crate::crypto::{Blake3Hash, Ed25519PublicKey};
use crate::error::ValidationError;
use crate::token::{Token, TOKEN_VERSION};

/// How far ahead of the local clock `issued_at` may be.
pub const MAX_CLOCK_SKEW_MILLIS: i64 = 5 * 60 * 1000;

/// Validate a token's structure without checking its signature.
///
/// This performs:
/// - Version check
/// - Payload hash verification
/// - Sequence/prev-link consistency
/// - Payload shape for the declared interaction type
pub fn validate_token_structure(token: &Token) -> Result<(), ValidationError> {
    let header = &token.header;

    if header.version != TOKEN_VERSION {
        return Err(ValidationError::UnsupportedVersion(header.version));
    }

    if Blake3Hash::hash(&token.payload) != header.payload_hash {
        return Err(ValidationError::PayloadHashMismatch);
    }

    if header.seq == 0 {
        return Err(ValidationError::StructuralError("seq starts at 1".into()));
    }
    if header.seq == 1 && header.prev_token_id.is_some() {
        return Err(ValidationError::InvalidPrevToken {
            expected: None,
            got: header.prev_token_id,
        });
    }
    if header.seq > 1 && header.prev_token_id.is_none() {
        return Err(ValidationError::StructuralError(
            "seq > 1 requires prev_token_id".into(),
        ));
    }

    token.message()?;

    Ok(())
}

/// Full standalone validation: structure, issue time and expiry at `now`,
/// and the signature against the issuer's resolved key.
///
/// Expiry is derived from `issued_at`, so a token dated more than
/// [`MAX_CLOCK_SKEW_MILLIS`] ahead of `now` is refused.
pub fn validate_token(
    token: &Token,
    issuer_key: &Ed25519PublicKey,
    now: i64,
) -> Result<(), ValidationError> {
    validate_token_structure(token)?;

    let issued_at = token.header.issued_at;
    if issued_at > now.saturating_add(MAX_CLOCK_SKEW_MILLIS) {
        return Err(ValidationError::IssuedInFuture { issued_at, now });
    }

    if let Some(expires_at) = token.header.expires_at {
        if expires_at <= now {
            return Err(ValidationError::Expired { expires_at, now });
        }
    }

    issuer_key
        .verify(&signed_message(token), &token.signature)
        .map_err(|_| ValidationError::SignatureFailed)
}

/// Check that a token can open an interaction.
pub fn validate_first(token: &Token) -> Result<(), ValidationError> {
    if token.header.seq != 1 {
        return Err(ValidationError::InvalidSequence {
            expected: 1,
            got: token.header.seq,
        });
    }
    if token.header.prev_token_id.is_some() {
        return Err(ValidationError::InvalidPrevToken {
            expected: None,
            got: token.header.prev_token_id,
        });
    }
    Ok(())
}

/// Check that `token` directly follows `prev` in the same interaction.
pub fn validate_successor(token: &Token, prev: &Token) -> Result<(), ValidationError> {
    if token.header.nonce != prev.header.nonce {
        return Err(ValidationError::NonceMismatch {
            expected: prev.header.nonce.to_string(),
            got: token.header.nonce.to_string(),
        });
    }

    let expected_seq = prev.header.seq.saturating_add(1);
    if token.header.seq != expected_seq {
        return Err(ValidationError::InvalidSequence {
            expected: expected_seq,
            got: token.header.seq,
        });
    }

    let prev_id = prev.compute_id();
    if token.header.prev_token_id != Some(prev_id) {
        return Err(ValidationError::InvalidPrevToken {
            expected: Some(prev_id),
            got: token.header.prev_token_id,
        });
    }

    if let Some(audience) = &token.header.audience {
        if audience != &prev.header.issuer {
            return Err(ValidationError::AudienceMismatch {
                expected: prev.header.issuer.to_string(),
                got: audience.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::message::{AuthenticationBody, Message};
    use crate::token::TokenBuilder;
    use crate::types::{now_millis, Did, TokenId};

    fn auth() -> Message {
        Message::Authentication(AuthenticationBody {
            description: "login".into(),
            callback_url: None,
        })
    }

    #[test]
    fn test_valid_token_passes() {
        let keypair = Keypair::from_seed(&[1; 32]);
        let token = TokenBuilder::request(auth()).sign(&keypair).unwrap();
        validate_token(&token, &keypair.public_key(), now_millis()).unwrap();
        validate_first(&token).unwrap();
    }

    #[test]
    fn test_wrong_key_fails() {
        let keypair = Keypair::from_seed(&[1; 32]);
        let other = Keypair::from_seed(&[2; 32]);
        let token = TokenBuilder::request(auth()).sign(&keypair).unwrap();
        assert!(matches!(
            validate_token(&token, &other.public_key(), now_millis()),
            Err(ValidationError::SignatureFailed)
        ));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let keypair = Keypair::from_seed(&[1; 32]);
        let mut token = TokenBuilder::request(auth()).sign(&keypair).unwrap();
        token.payload = bytes::Bytes::from_static(br#"{"description":"other"}"#);
        assert!(matches!(
            validate_token_structure(&token),
            Err(ValidationError::PayloadHashMismatch)
        ));
    }

    #[test]
    fn test_expired_token_fails() {
        let keypair = Keypair::from_seed(&[1; 32]);
        let token = TokenBuilder::request(auth())
            .issued_at(100)
            .expires_at(200)
            .sign(&keypair)
            .unwrap();
        assert!(matches!(
            validate_token(&token, &keypair.public_key(), 500),
            Err(ValidationError::Expired { .. })
        ));
    }

    #[test]
    fn test_future_dated_token_fails() {
        let keypair = Keypair::from_seed(&[1; 32]);
        let now = 1_000_000;

        let within = TokenBuilder::request(auth())
            .issued_at(now + MAX_CLOCK_SKEW_MILLIS)
            .sign(&keypair)
            .unwrap();
        validate_token(&within, &keypair.public_key(), now).unwrap();

        // a far-future issue time would stretch any ttl derived from it
        let ahead = TokenBuilder::request(auth())
            .issued_at(now + 86_400_000)
            .ttl_millis(60_000)
            .sign(&keypair)
            .unwrap();
        assert!(matches!(
            validate_token(&ahead, &keypair.public_key(), now),
            Err(ValidationError::IssuedInFuture { issued_at, now: at })
                if issued_at == now + 86_400_000 && at == now
        ));
    }

    #[test]
    fn test_successor_checks() {
        let alice = Keypair::from_seed(&[1; 32]);
        let bob = Keypair::from_seed(&[2; 32]);
        let first = TokenBuilder::request(auth()).sign(&alice).unwrap();
        let second = TokenBuilder::reply(auth(), &first).sign(&bob).unwrap();
        validate_successor(&second, &first).unwrap();

        // replaying the first token as a successor of itself fails
        assert!(matches!(
            validate_successor(&first, &first),
            Err(ValidationError::InvalidSequence { .. })
        ));

        // a token from a different interaction fails
        let stranger = TokenBuilder::request(auth()).sign(&bob).unwrap();
        assert!(matches!(
            validate_successor(&stranger, &first),
            Err(ValidationError::NonceMismatch { .. })
        ));
    }

    #[test]
    fn test_successor_wrong_prev_and_audience() {
        let alice = Keypair::from_seed(&[1; 32]);
        let bob = Keypair::from_seed(&[2; 32]);
        let first = TokenBuilder::request(auth()).sign(&alice).unwrap();

        let mut forged = TokenBuilder::reply(auth(), &first).sign(&bob).unwrap();
        forged.header.prev_token_id = Some(TokenId::from_bytes([0; 32]));
        assert!(matches!(
            validate_successor(&forged, &first),
            Err(ValidationError::InvalidPrevToken { .. })
        ));

        let misaddressed = TokenBuilder::reply(auth(), &first)
            .audience(Some(Did::from_public_key(&bob.public_key())))
            .sign(&bob)
            .unwrap();
        assert!(matches!(
            validate_successor(&misaddressed, &first),
            Err(ValidationError::AudienceMismatch { .. })
        ));
    }

    fn chain(len: usize) -> Vec<Token> {
        let parties = [Keypair::from_seed(&[1; 32]), Keypair::from_seed(&[2; 32])];
        let mut tokens = vec![TokenBuilder::request(auth()).sign(&parties[0]).unwrap()];
        for i in 1..len {
            let next = TokenBuilder::reply(auth(), &tokens[i - 1])
                .sign(&parties[i % 2])
                .unwrap();
            tokens.push(next);
        }
        tokens
    }

    proptest::proptest! {
        #[test]
        fn prop_chain_validates_in_order(len in 2usize..8) {
            let tokens = chain(len);
            for pair in tokens.windows(2) {
                proptest::prop_assert!(validate_successor(&pair[1], &pair[0]).is_ok());
            }
        }

        #[test]
        fn prop_out_of_order_delivery_detected(len in 3usize..8, pick in 0usize..100) {
            let tokens = chain(len);
            let i = pick % (len - 2);
            // skipping one token breaks the chain
            proptest::prop_assert!(validate_successor(&tokens[i + 2], &tokens[i]).is_err());
            // delivering backwards breaks the chain
            proptest::prop_assert!(validate_successor(&tokens[i], &tokens[i + 1]).is_err());
        }
    }

    #[test]
    fn test_first_token_rules() {
        let alice = Keypair::from_seed(&[1; 32]);
        let bob = Keypair::from_seed(&[2; 32]);
        let first = TokenBuilder::request(auth()).sign(&alice).unwrap();
        let second = TokenBuilder::reply(auth(), &first).sign(&bob).unwrap();
        assert!(validate_first(&second).is_err());
    }
}
