//! Compact token segments.
//!
//! Only what the service needs to build its own RS256 tokens and to peek into
//! tokens for audit. Verification of inbound tokens lives in `oidc`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// The only algorithm this service signs with.
pub const ALGORITHM: &str = "RS256";

/// Header of tokens issued by this service.
#[derive(Debug, Serialize)]
pub struct OutputHeader<'a> {
    pub alg: &'static str,
    pub kid: &'a str,
    pub typ: &'static str,
}

impl<'a> OutputHeader<'a> {
    pub fn new(kid: &'a str) -> Self {
        Self {
            alg: ALGORITHM,
            kid,
            typ: "JWT",
        }
    }
}

/// Serialize a value to JSON and base64url-encode it without padding.
pub fn encode_segment<T: Serialize>(value: &T) -> serde_json::Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(value)?))
}

/// SHA-256 of the signing input (`header.payload`).
pub fn signing_digest(signing_input: &str) -> Vec<u8> {
    Sha256::digest(signing_input.as_bytes()).to_vec()
}

/// Decode the header and payload of a compact token without verifying it.
///
/// Each side is `None` when the token does not have exactly three segments,
/// or when that segment is not base64url-encoded JSON.
pub fn decode_unverified(token: &str) -> (Option<Value>, Option<Value>) {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return (None, None);
    }

    (decode_segment(segments[0]), decode_segment(segments[1]))
}

fn decode_segment(segment: &str) -> Option<Value> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}
