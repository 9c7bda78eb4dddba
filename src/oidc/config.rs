//! Trusted issuer configuration.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One trusted upstream issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssuerConfig {
    /// Token issuer (iss claim). Must match exactly.
    /// Example: "https://token.actions.githubusercontent.com"
    pub issuer: String,

    /// Expected audience (aud claim). Audience is not checked when absent
    /// or empty.
    #[serde(default)]
    pub audience: Option<String>,

    /// JWKS cache refresh interval in seconds.
    #[serde(default = "default_jwks_refresh")]
    pub jwks_refresh_secs: u64,

    /// Minimum seconds between two JWKS fetches, whether triggered by age or
    /// by an unknown `kid`.
    #[serde(default = "default_jwks_min_refresh")]
    pub jwks_min_refresh_secs: u64,

    /// Clock skew tolerance in seconds for exp/nbf validation.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,
}

fn default_jwks_refresh() -> u64 {
    3600 // 1 hour
}

fn default_jwks_min_refresh() -> u64 {
    5
}

fn default_clock_skew() -> u64 {
    30
}

impl IssuerConfig {
    /// Issuer with default cache and skew settings and no audience check.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: None,
            jwks_refresh_secs: default_jwks_refresh(),
            jwks_min_refresh_secs: default_jwks_min_refresh(),
            clock_skew_secs: default_clock_skew(),
        }
    }

    /// Audience to enforce, if any.
    pub fn expected_audience(&self) -> Option<&str> {
        self.audience.as_deref().filter(|aud| !aud.is_empty())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.issuer.is_empty() {
            return Err("Issuer URL is required".to_string());
        }

        if !self.issuer.starts_with("https://") && !self.issuer.starts_with("http://") {
            return Err(format!("Issuer must be a valid HTTP(S) URL: {}", self.issuer));
        }

        Ok(())
    }
}

/// Issuers file: issuer id -> issuer configuration.
///
/// ```json
/// {"issuers": {"github": {"issuer": "https://token.actions.githubusercontent.com"}}}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssuersConfig {
    #[serde(default)]
    pub issuers: BTreeMap<String, IssuerConfig>,
}

impl IssuersConfig {
    /// Load and validate an issuers file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read issuers config: {:?}", path))?;
        let config: Self = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse issuers config: {:?}", path))?;

        config
            .validate()
            .map_err(|e| anyhow!("Invalid issuers config {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Validate every issuer entry.
    pub fn validate(&self) -> Result<(), String> {
        for (issuer_id, issuer) in &self.issuers {
            if issuer_id.is_empty() || issuer_id.contains('/') {
                return Err(format!("Invalid issuer id: {:?}", issuer_id));
            }

            issuer
                .validate()
                .map_err(|e| format!("issuer {}: {}", issuer_id, e))?;
        }

        Ok(())
    }
}
