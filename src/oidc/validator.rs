//! Upstream token verification.

use anyhow::Result;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, Header, Validation};
use serde_json::{Map, Value};
use tracing::debug;

use super::config::IssuerConfig;
use super::jwks::{discover, JwksCache};

/// Algorithms accepted on inbound tokens. Symmetric algorithms are never
/// accepted: the key would have to be shared with the issuer.
const SUPPORTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// A token whose signature, issuer, time bounds and audience were checked.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// Decoded header, kept for audit.
    pub header: Header,
    /// All payload claims.
    pub claims: Map<String, Value>,
}

/// Why a token failed verification.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("malformed token")]
    Malformed(#[source] jsonwebtoken::errors::Error),
    #[error("unsupported algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    #[error("signing key unavailable")]
    KeyUnavailable(#[source] anyhow::Error),
    #[error("token rejected")]
    Rejected(#[source] jsonwebtoken::errors::Error),
}

/// Verifies tokens from one issuer.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedToken, VerificationError>;
}

/// Verifier backed by the issuer's published JWKS.
pub struct IssuerVerifier {
    config: IssuerConfig,
    jwks: JwksCache,
}

impl IssuerVerifier {
    /// Create a verifier over an already-populated key cache.
    pub fn new(config: IssuerConfig, jwks: JwksCache) -> Self {
        Self { config, jwks }
    }

    /// Resolve the issuer's JWKS through OIDC discovery and load its keys.
    pub async fn discover(http_client: &reqwest::Client, config: IssuerConfig) -> Result<Self> {
        let metadata = discover(http_client, &config.issuer).await?;
        let jwks = JwksCache::new(
            http_client.clone(),
            metadata.jwks_uri,
            config.jwks_refresh_secs,
            config.jwks_min_refresh_secs,
        )
        .await?;

        Ok(Self::new(config, jwks))
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.config.clock_skew_secs;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.config.issuer]);

        if let Some(aud) = self.config.expected_audience() {
            validation.set_audience(&[aud]);
        } else {
            validation.validate_aud = false;
        }

        validation.set_required_spec_claims(&["exp", "iss"]);
        validation
    }
}

#[async_trait]
impl TokenVerifier for IssuerVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedToken, VerificationError> {
        let header = decode_header(token).map_err(VerificationError::Malformed)?;

        debug!(
            issuer = %self.config.issuer,
            kid = ?header.kid,
            alg = ?header.alg,
            "Verifying upstream token"
        );

        if !SUPPORTED_ALGORITHMS.contains(&header.alg) {
            return Err(VerificationError::UnsupportedAlgorithm(header.alg));
        }

        let keys = self
            .jwks
            .keys_for(header.kid.as_deref())
            .await
            .map_err(VerificationError::KeyUnavailable)?;

        let validation = self.validation(header.alg);

        // Without a kid every cached key is a candidate; keep the last failure.
        let mut last_error = None;
        for key in &keys {
            match decode::<Map<String, Value>>(token, key, &validation) {
                Ok(data) => {
                    return Ok(VerifiedToken {
                        header: data.header,
                        claims: data.claims,
                    })
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => VerificationError::Rejected(e),
            None => VerificationError::KeyUnavailable(anyhow::anyhow!("No candidate keys")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mock_issuer, now, upstream_token, upstream_token_with_header};
    use jsonwebtoken::{encode, EncodingKey};
    use serde_json::json;

    async fn verifier(issuer: &str, audience: Option<&str>) -> IssuerVerifier {
        let mut config = IssuerConfig::new(issuer);
        config.audience = audience.map(String::from);
        IssuerVerifier::discover(&reqwest::Client::new(), config)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token() {
        let server = mock_issuer().await;
        let verifier = verifier(&server.uri(), Some("sts.example.com")).await;

        let token = upstream_token(&json!({
            "iss": server.uri(),
            "aud": "sts.example.com",
            "sub": "repo:octo-org/app:ref:refs/heads/main",
            "repository_owner": "octo-org",
            "exp": now() + 300,
        }));

        let verified = verifier.verify(&token).await.unwrap();
        assert_eq!(verified.header.kid.as_deref(), Some("upstream-key-1"));
        assert_eq!(verified.claims["repository_owner"], "octo-org");
        assert_eq!(verified.claims["aud"], "sts.example.com");
    }

    #[tokio::test]
    async fn test_audience_mismatch() {
        let server = mock_issuer().await;
        let verifier = verifier(&server.uri(), Some("sts.example.com")).await;

        let token = upstream_token(&json!({
            "iss": server.uri(),
            "aud": "someone-else",
            "sub": "u1",
            "exp": now() + 300,
        }));

        assert!(matches!(
            verifier.verify(&token).await,
            Err(VerificationError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_audience_skipped_when_not_configured() {
        let server = mock_issuer().await;
        let verifier = verifier(&server.uri(), None).await;

        let token = upstream_token(&json!({
            "iss": server.uri(),
            "aud": "anything",
            "sub": "u1",
            "exp": now() + 300,
        }));

        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_and_not_yet_valid() {
        let server = mock_issuer().await;
        let verifier = verifier(&server.uri(), None).await;

        let expired = upstream_token(&json!({
            "iss": server.uri(),
            "sub": "u1",
            "exp": now() - 3600,
        }));
        assert!(verifier.verify(&expired).await.is_err());

        let early = upstream_token(&json!({
            "iss": server.uri(),
            "sub": "u1",
            "nbf": now() + 3600,
            "exp": now() + 7200,
        }));
        assert!(verifier.verify(&early).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_issuer() {
        let server = mock_issuer().await;
        let verifier = verifier(&server.uri(), None).await;

        let token = upstream_token(&json!({
            "iss": "https://evil.example",
            "sub": "u1",
            "exp": now() + 300,
        }));
        assert!(verifier.verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_symmetric_algorithm_rejected() {
        let server = mock_issuer().await;
        let verifier = verifier(&server.uri(), None).await;

        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({"iss": server.uri(), "sub": "u1", "exp": now() + 300}),
            &EncodingKey::from_secret(b"guessable"),
        )
        .unwrap();

        assert!(matches!(
            verifier.verify(&token).await,
            Err(VerificationError::UnsupportedAlgorithm(Algorithm::HS256))
        ));
    }

    #[tokio::test]
    async fn test_token_without_kid() {
        let server = mock_issuer().await;
        let verifier = verifier(&server.uri(), None).await;

        let token = upstream_token_with_header(
            Header::new(Algorithm::RS256),
            &json!({"iss": server.uri(), "sub": "u1", "exp": now() + 300}),
        );
        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_kids_do_not_hammer_issuer() {
        let server = mock_issuer().await;
        let verifier = verifier(&server.uri(), None).await;

        for i in 0..20 {
            let mut header = Header::new(Algorithm::RS256);
            header.kid = Some(format!("bogus-{}", i));
            let token = upstream_token_with_header(
                header,
                &json!({"iss": server.uri(), "sub": "u1", "exp": now() + 300}),
            );
            assert!(matches!(
                verifier.verify(&token).await,
                Err(VerificationError::KeyUnavailable(_))
            ));
        }

        let jwks_fetches = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/jwks")
            .count();
        assert_eq!(jwks_fetches, 1);
    }

    #[tokio::test]
    async fn test_malformed_token() {
        let server = mock_issuer().await;
        let verifier = verifier(&server.uri(), None).await;

        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(VerificationError::Malformed(_))
        ));
    }
}
