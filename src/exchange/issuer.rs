//! Token issuer for exchanged tokens.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::config::TokenExchangeConfig;
use super::token::{encode_segment, signing_digest, OutputHeader};
use crate::signer::ExternalSigner;

/// Builds and signs RS256 tokens under this service's issuer identity.
pub struct TokenIssuer {
    /// Signing capability; never exposes key material.
    signer: Arc<dyn ExternalSigner>,
    /// Issuer claim.
    issuer: String,
    /// Key id stamped into the header.
    key_id: String,
}

impl TokenIssuer {
    /// Create a new token issuer.
    pub fn new(config: &TokenExchangeConfig, signer: Arc<dyn ExternalSigner>) -> Self {
        Self {
            signer,
            issuer: config.issuer.clone(),
            key_id: config.key_id.clone(),
        }
    }

    /// Issue a token carrying `claims`.
    ///
    /// `iss` is always overwritten with this service's issuer; whatever the
    /// caller put there is discarded.
    pub async fn issue_token(&self, mut claims: Map<String, Value>) -> Result<String> {
        claims.insert("iss".to_string(), Value::String(self.issuer.clone()));

        let header = encode_segment(&OutputHeader::new(&self.key_id))
            .context("Failed to encode token header")?;
        let payload = encode_segment(&claims).context("Failed to encode token claims")?;
        let signing_input = format!("{}.{}", header, payload);

        let signature = self
            .signer
            .sign(&signing_digest(&signing_input))
            .await
            .context("External signer failed")?;

        debug!(
            kid = %self.key_id,
            sub = ?claims.get("sub"),
            "Issued new token"
        );

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }
}
