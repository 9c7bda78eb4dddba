//! Token exchange pipeline: verify -> map -> authorize -> sign.

use std::sync::Arc;
use tracing::{info, warn};

use super::issuer::TokenIssuer;
use super::mapper::{ClaimsMapper, ClaimsMapperRequest};
use crate::audit::AuditRecorder;
use crate::oidc::{IssuerRegistry, VerificationError};

/// Why an exchange did not produce a token. Every variant is terminal;
/// nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("unrecognised issuer id: {0}")]
    UnrecognizedIssuer(String),
    #[error("input token verification failed")]
    VerificationFailed(#[source] VerificationError),
    #[error("claims mapper invocation failed")]
    MapperInvocationFailed(#[source] anyhow::Error),
    #[error("disallowed by claims mapper")]
    DeniedByPolicy,
    #[error("signing failed")]
    SigningFailed(#[source] anyhow::Error),
}

/// Result of an allowed exchange.
#[derive(Debug, Clone)]
pub struct ExchangeOutput {
    pub allowed: bool,
    pub token: String,
}

/// Orchestrates one exchange per call. Holds no per-request state, so a
/// single engine serves any number of concurrent exchanges.
pub struct TokenExchangeEngine {
    registry: Arc<IssuerRegistry>,
    mapper: Arc<dyn ClaimsMapper>,
    issuer: TokenIssuer,
    audit: AuditRecorder,
}

impl TokenExchangeEngine {
    pub fn new(
        registry: Arc<IssuerRegistry>,
        mapper: Arc<dyn ClaimsMapper>,
        issuer: TokenIssuer,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            registry,
            mapper,
            issuer,
            audit,
        }
    }

    /// Exchange `input_token`, issued by the issuer registered as `issuer_id`,
    /// for a token signed by this service.
    ///
    /// Exactly one audit record is written per call, including when the
    /// returned future is dropped before completion.
    pub async fn exchange(
        &self,
        issuer_id: &str,
        input_token: &str,
        trace_id: &str,
    ) -> Result<ExchangeOutput, ExchangeError> {
        let mut audit = self.audit.begin(trace_id, issuer_id, input_token);

        let result = self.run(issuer_id, input_token).await;
        match &result {
            Ok(output) => {
                audit.succeeded(&output.token);
                info!(
                    issuer_id = %issuer_id,
                    trace_id = %trace_id,
                    output_size = output.token.len(),
                    "Token exchange successful"
                );
            }
            Err(e) => {
                warn!(
                    issuer_id = %issuer_id,
                    trace_id = %trace_id,
                    error = ?e,
                    "Token exchange failed"
                );
            }
        }

        result
    }

    async fn run(&self, issuer_id: &str, input_token: &str) -> Result<ExchangeOutput, ExchangeError> {
        let verifier = self
            .registry
            .lookup(issuer_id)
            .ok_or_else(|| ExchangeError::UnrecognizedIssuer(issuer_id.to_string()))?;

        let verified = verifier
            .verify(input_token)
            .await
            .map_err(ExchangeError::VerificationFailed)?;

        let request = ClaimsMapperRequest::new(issuer_id, verified.claims);
        let decision = self
            .mapper
            .invoke(&request)
            .await
            .map_err(ExchangeError::MapperInvocationFailed)?;

        if !decision.allow {
            return Err(ExchangeError::DeniedByPolicy);
        }

        // The mapper's claims replace the input claims wholesale; the issuer
        // overwrites `iss`.
        let token = self
            .issuer
            .issue_token(decision.claims)
            .await
            .map_err(ExchangeError::SigningFailed)?;

        Ok(ExchangeOutput {
            allowed: true,
            token,
        })
    }
}
