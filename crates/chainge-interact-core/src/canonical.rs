//! Canonical CBOR encoding for token headers.
//!
//! Headers are written in RFC 8949 Core Deterministic Encoding:
//! - Integer map keys in ascending order
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Token ids are hashes of these bytes, so two parties must produce the
//! exact same encoding for the same header.

use ciborium::value::{Integer, Value};

use crate::crypto::{Blake3Hash, Ed25519Signature};
use crate::error::CoreError;
use crate::token::{InteractionType, Token, TokenHeader};
use crate::types::{Did, Nonce, TokenId};

/// Header field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const VERSION: u64 = 0;
    pub const NONCE: u64 = 1;
    pub const INTERACTION_TYPE: u64 = 2;
    pub const ISSUER: u64 = 3;
    pub const AUDIENCE: u64 = 4;
    pub const SEQ: u64 = 5;
    pub const ISSUED_AT: u64 = 6;
    pub const EXPIRES_AT: u64 = 7;
    pub const PREV_TOKEN_ID: u64 = 8;
    pub const PAYLOAD_HASH: u64 = 9;
}

const FIELD_COUNT: u64 = 10;
const SIGNATURE_LEN: usize = 64;

/// Encode a token header to canonical CBOR bytes.
pub fn canonical_header_bytes(header: &TokenHeader) -> Vec<u8> {
    let mut buf = Vec::with_capacity(160);

    // Keys are emitted in ascending order, which is their canonical order.
    encode_uint(&mut buf, 5, FIELD_COUNT);

    encode_uint(&mut buf, 0, keys::VERSION);
    encode_uint(&mut buf, 0, u64::from(header.version));

    encode_uint(&mut buf, 0, keys::NONCE);
    encode_text(&mut buf, header.nonce.as_str());

    encode_uint(&mut buf, 0, keys::INTERACTION_TYPE);
    encode_uint(&mut buf, 0, u64::from(header.interaction_type.to_u16()));

    encode_uint(&mut buf, 0, keys::ISSUER);
    encode_text(&mut buf, header.issuer.as_str());

    encode_uint(&mut buf, 0, keys::AUDIENCE);
    match &header.audience {
        Some(did) => encode_text(&mut buf, did.as_str()),
        None => encode_null(&mut buf),
    }

    encode_uint(&mut buf, 0, keys::SEQ);
    encode_uint(&mut buf, 0, u64::from(header.seq));

    encode_uint(&mut buf, 0, keys::ISSUED_AT);
    encode_int(&mut buf, header.issued_at);

    encode_uint(&mut buf, 0, keys::EXPIRES_AT);
    match header.expires_at {
        Some(at) => encode_int(&mut buf, at),
        None => encode_null(&mut buf),
    }

    encode_uint(&mut buf, 0, keys::PREV_TOKEN_ID);
    match &header.prev_token_id {
        Some(id) => encode_bytes(&mut buf, id.as_bytes()),
        None => encode_null(&mut buf),
    }

    encode_uint(&mut buf, 0, keys::PAYLOAD_HASH);
    encode_bytes(&mut buf, header.payload_hash.as_bytes());

    buf
}

/// Encode an entire token to canonical bytes.
///
/// Format: canonical_header || payload || signature
pub fn canonical_bytes(token: &Token) -> Vec<u8> {
    let mut buf = canonical_header_bytes(&token.header);
    buf.extend_from_slice(&token.payload);
    buf.extend_from_slice(token.signature.as_bytes());
    buf
}

/// Construct the signed message (header || payload).
pub fn signed_message(token: &Token) -> Vec<u8> {
    signed_message_from_parts(&token.header, &token.payload)
}

/// Construct the signed message from header and payload.
pub fn signed_message_from_parts(header: &TokenHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = canonical_header_bytes(header);
    buf.extend_from_slice(payload);
    buf
}

fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Major type 0 for non-negative values, 1 for negative (-1 encodes as 0).
fn encode_int(buf: &mut Vec<u8>, n: i64) {
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn encode_null(buf: &mut Vec<u8>) {
    buf.push(0xf6);
}

/// Decode a token from canonical bytes.
///
/// The header must be in canonical form: it is re-encoded and compared with
/// the input prefix, so two encodings of one header can never both verify.
pub fn decode_token(bytes: &[u8]) -> Result<Token, CoreError> {
    if bytes.len() < SIGNATURE_LEN {
        return Err(CoreError::MalformedToken("too short".into()));
    }

    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    let header = cbor_value_to_header(&value)?;

    let header_bytes = canonical_header_bytes(&header);
    let header_len = header_bytes.len();
    if bytes.len() < header_len || bytes[..header_len] != header_bytes[..] {
        return Err(CoreError::MalformedToken("non-canonical header".into()));
    }

    let remaining = &bytes[header_len..];
    if remaining.len() < SIGNATURE_LEN {
        return Err(CoreError::MalformedToken(
            "insufficient bytes for signature".into(),
        ));
    }

    let payload_len = remaining.len() - SIGNATURE_LEN;
    let payload = remaining[..payload_len].to_vec();
    let sig_bytes: [u8; 64] = remaining[payload_len..]
        .try_into()
        .map_err(|_| CoreError::MalformedToken("invalid signature length".into()))?;

    Ok(Token {
        header,
        payload: payload.into(),
        signature: Ed25519Signature(sig_bytes),
    })
}

fn cbor_value_to_header(value: &Value) -> Result<TokenHeader, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedToken("expected map".into())),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == i128::from(key)))
            .map(|(_, v)| v)
    };

    let version = match get(keys::VERSION) {
        Some(Value::Integer(i)) => as_unsigned::<u8>(*i, "version")?,
        _ => return Err(CoreError::MalformedToken("missing version".into())),
    };

    let nonce = match get(keys::NONCE) {
        Some(Value::Text(s)) => Nonce::new(s.clone())?,
        _ => return Err(CoreError::MalformedToken("missing nonce".into())),
    };

    let interaction_type = match get(keys::INTERACTION_TYPE) {
        Some(Value::Integer(i)) => {
            let code = as_unsigned::<u16>(*i, "interaction_type")?;
            InteractionType::from_u16(code).ok_or(CoreError::UnknownInteractionType(code))?
        }
        _ => return Err(CoreError::MalformedToken("missing interaction_type".into())),
    };

    let issuer: Did = match get(keys::ISSUER) {
        Some(Value::Text(s)) => s.parse()?,
        _ => return Err(CoreError::MalformedToken("missing issuer".into())),
    };

    let audience = match get(keys::AUDIENCE) {
        Some(Value::Text(s)) => Some(s.parse::<Did>()?),
        Some(Value::Null) | None => None,
        _ => return Err(CoreError::MalformedToken("invalid audience".into())),
    };

    let seq = match get(keys::SEQ) {
        Some(Value::Integer(i)) => as_unsigned::<u32>(*i, "seq")?,
        _ => return Err(CoreError::MalformedToken("missing seq".into())),
    };

    let issued_at = match get(keys::ISSUED_AT) {
        Some(Value::Integer(i)) => i64::try_from(*i)
            .map_err(|_| CoreError::MalformedToken("issued_at out of range".into()))?,
        _ => return Err(CoreError::MalformedToken("missing issued_at".into())),
    };

    let expires_at = match get(keys::EXPIRES_AT) {
        Some(Value::Integer(i)) => Some(
            i64::try_from(*i)
                .map_err(|_| CoreError::MalformedToken("expires_at out of range".into()))?,
        ),
        Some(Value::Null) | None => None,
        _ => return Err(CoreError::MalformedToken("invalid expires_at".into())),
    };

    let prev_token_id = match get(keys::PREV_TOKEN_ID) {
        Some(Value::Bytes(b)) => Some(TokenId(fixed_32(b, "prev_token_id")?)),
        Some(Value::Null) | None => None,
        _ => return Err(CoreError::MalformedToken("invalid prev_token_id".into())),
    };

    let payload_hash = match get(keys::PAYLOAD_HASH) {
        Some(Value::Bytes(b)) => Blake3Hash(fixed_32(b, "payload_hash")?),
        _ => return Err(CoreError::MalformedToken("invalid payload_hash".into())),
    };

    Ok(TokenHeader {
        version,
        nonce,
        interaction_type,
        issuer,
        audience,
        seq,
        issued_at,
        expires_at,
        prev_token_id,
        payload_hash,
    })
}

fn as_unsigned<T: TryFrom<u64>>(i: Integer, field: &str) -> Result<T, CoreError> {
    u64::try_from(i)
        .ok()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| CoreError::MalformedToken(format!("{field} out of range")))
}

fn fixed_32(bytes: &[u8], field: &str) -> Result<[u8; 32], CoreError> {
    bytes
        .try_into()
        .map_err(|_| CoreError::MalformedToken(format!("invalid {field} length")))
}
