//! Key custody boundary.
//!
//! The exchange pipeline hands a SHA-256 digest across this boundary and gets
//! a signature back. Private key material never leaves the signer
//! implementation, so a custody service or HSM can stand behind the same trait
//! as the in-process key used for development and tests.

pub mod local;

pub use local::LocalRsaSigner;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha224};

/// RSA public key components as unsigned big-endian integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicComponents {
    /// Modulus.
    pub n: Vec<u8>,
    /// Public exponent.
    pub e: Vec<u8>,
}

/// Signing capability for RS256 tokens.
///
/// Implementations must be safe for concurrent use; the engine never
/// serializes calls.
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    /// Sign a SHA-256 digest with RSASSA-PKCS1-v1_5.
    async fn sign(&self, digest: &[u8]) -> Result<Vec<u8>>;

    /// Public half of the signing key.
    fn public_key(&self) -> RsaPublicComponents;
}

/// Derive the published `kid` from a custody key identifier.
///
/// The key id is the lowercase hex SHA-224 of the identifier, so the
/// identifier itself (an ARN, a file path) is never exposed to relying parties.
pub fn derive_key_id(key_identifier: &str) -> String {
    hex::encode(Sha224::digest(key_identifier.as_bytes()))
}
