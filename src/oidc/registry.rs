//! Issuer id -> verifier lookup.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::config::IssuersConfig;
use super::validator::{IssuerVerifier, TokenVerifier};

/// Immutable set of trusted issuers, built once at startup.
///
/// Lookups take `&self` only, so the registry is shared behind an `Arc`
/// without locking.
#[derive(Default)]
pub struct IssuerRegistry {
    verifiers: HashMap<String, Arc<dyn TokenVerifier>>,
}

impl IssuerRegistry {
    /// Create a registry from pre-built verifiers.
    pub fn new(verifiers: HashMap<String, Arc<dyn TokenVerifier>>) -> Self {
        Self { verifiers }
    }

    /// Build a verifier for every configured issuer via OIDC discovery.
    ///
    /// Any issuer that cannot be resolved fails the whole build.
    pub async fn discover(config: &IssuersConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let mut verifiers: HashMap<String, Arc<dyn TokenVerifier>> = HashMap::new();
        for (issuer_id, issuer) in &config.issuers {
            let verifier = IssuerVerifier::discover(&http_client, issuer.clone())
                .await
                .with_context(|| format!("Failed to set up issuer {}", issuer_id))?;

            info!(
                issuer_id = %issuer_id,
                url = %issuer.issuer,
                aud = ?issuer.expected_audience(),
                "Registered issuer"
            );
            verifiers.insert(issuer_id.clone(), Arc::new(verifier));
        }

        Ok(Self::new(verifiers))
    }

    /// Verifier for an issuer id.
    pub fn lookup(&self, issuer_id: &str) -> Option<&dyn TokenVerifier> {
        self.verifiers.get(issuer_id).map(|v| v.as_ref())
    }

    pub fn len(&self) -> usize {
        self.verifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verifiers.is_empty()
    }
}
