//! OIDC discovery and JWKS documents for tokens this service issues.
//!
//! Relying parties fetch these to locate and verify our signing key. Both
//! documents are derived from configuration and the signer's public key; they
//! carry no per-request state.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::exchange::token::ALGORITHM;
use crate::exchange::TokenExchangeConfig;
use crate::signer::ExternalSigner;

/// `/.well-known/openid-configuration` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub jwks_uri: String,
    pub subject_types_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
}

/// `/.well-known/jwks` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Published RSA signing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    pub alg: String,
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub kid: String,
    /// Modulus, base64url without padding.
    pub n: String,
    /// Public exponent, base64url without padding.
    pub e: String,
}

/// Publishes discovery metadata for this service's issuer identity.
pub struct DiscoveryPublisher {
    issuer: String,
    jwks_uri: String,
    key_id: String,
    signer: Arc<dyn ExternalSigner>,
}

impl DiscoveryPublisher {
    pub fn new(config: &TokenExchangeConfig, signer: Arc<dyn ExternalSigner>) -> Self {
        Self {
            issuer: config.issuer.clone(),
            jwks_uri: config.jwks_url(),
            key_id: config.key_id.clone(),
            signer,
        }
    }

    pub fn discovery_document(&self) -> DiscoveryDocument {
        DiscoveryDocument {
            issuer: self.issuer.clone(),
            jwks_uri: self.jwks_uri.clone(),
            subject_types_supported: vec!["public".to_string()],
            response_types_supported: vec!["id_token".to_string()],
            id_token_signing_alg_values_supported: vec![ALGORITHM.to_string()],
            scopes_supported: vec!["openid".to_string()],
        }
    }

    /// Single-key JWKS for the signer's current public key.
    pub fn jwks(&self) -> Jwks {
        let public_key = self.signer.public_key();

        Jwks {
            keys: vec![Jwk {
                alg: ALGORITHM.to_string(),
                kty: "RSA".to_string(),
                key_use: "sig".to_string(),
                kid: self.key_id.clone(),
                n: encode_uint(&public_key.n),
                e: encode_uint(&public_key.e),
            }],
        }
    }
}

/// Base64url of an unsigned big-endian integer, minimal length.
fn encode_uint(bytes: &[u8]) -> String {
    let start = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len().saturating_sub(1));
    URL_SAFE_NO_PAD.encode(&bytes[start..])
}
