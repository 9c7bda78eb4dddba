//! External claims mapper.
//!
//! Policy that decides whether an exchange is allowed, and which claims the
//! issued token carries, lives outside this service. The engine sends it the
//! verified input claims and takes back a decision plus a replacement claim set.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

use super::config::ClaimsMapperConfig;

/// Protocol version sent with every mapper request.
pub const CLAIMS_MAPPER_VERSION: &str = "1.0";

/// Request sent to the claims mapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsMapperRequest {
    pub version: String,
    pub issuer_id: String,
    pub claims: Map<String, Value>,
}

impl ClaimsMapperRequest {
    pub fn new(issuer_id: &str, claims: Map<String, Value>) -> Self {
        Self {
            version: CLAIMS_MAPPER_VERSION.to_string(),
            issuer_id: issuer_id.to_string(),
            claims,
        }
    }
}

/// Decision returned by the claims mapper.
///
/// When `allow` is true, `claims` replaces the input claims entirely.
/// A missing `allow` is a denial.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClaimsMapperResponse {
    #[serde(default)]
    pub allow: bool,
    #[serde(default)]
    pub claims: Map<String, Value>,
}

/// Claims mapping and authorization capability.
///
/// One synchronous round trip per exchange. Any `Err` is a transport or
/// serialization failure; a denial is `Ok` with `allow == false`.
#[async_trait]
pub trait ClaimsMapper: Send + Sync {
    async fn invoke(&self, request: &ClaimsMapperRequest) -> Result<ClaimsMapperResponse>;
}

/// Claims mapper reached over HTTP: the request is POSTed as JSON and the
/// response body is the decision.
pub struct HttpClaimsMapper {
    url: String,
    http_client: reqwest::Client,
}

impl HttpClaimsMapper {
    /// Create a mapper client from configuration.
    pub fn new(config: &ClaimsMapperConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            url: config.url.clone(),
            http_client,
        })
    }
}

#[async_trait]
impl ClaimsMapper for HttpClaimsMapper {
    async fn invoke(&self, request: &ClaimsMapperRequest) -> Result<ClaimsMapperResponse> {
        debug!(url = %self.url, issuer_id = %request.issuer_id, "Invoking claims mapper");

        let response = self
            .http_client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .context("Failed to call claims mapper")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Claims mapper returned status {}",
                response.status()
            ));
        }

        response
            .json::<ClaimsMapperResponse>()
            .await
            .context("Failed to parse claims mapper response")
    }
}
