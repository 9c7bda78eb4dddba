//! Token exchange configuration.

use serde::{Deserialize, Serialize};

/// Identity this service issues tokens under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenExchangeConfig {
    /// Issuer URL stamped into every issued token's `iss` claim.
    /// Also the base URL of the discovery documents.
    pub issuer: String,

    /// Published key id (`kid`) of the signing key.
    pub key_id: String,
}

impl TokenExchangeConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.issuer.is_empty() {
            return Err("Token exchange requires an issuer URL".to_string());
        }

        if !self.issuer.starts_with("https://") && !self.issuer.starts_with("http://") {
            return Err(format!("Issuer must be an HTTP(S) URL: {}", self.issuer));
        }

        // Discovery URLs are built by appending to the issuer.
        if self.issuer.ends_with('/') {
            return Err(format!("Issuer must not end with '/': {}", self.issuer));
        }

        if self.key_id.is_empty() {
            return Err("Token exchange requires a key id".to_string());
        }

        Ok(())
    }

    /// URL of the published key set.
    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks", self.issuer)
    }
}

/// Claims mapper endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimsMapperConfig {
    /// URL the mapper request is POSTed to.
    pub url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_mapper_timeout")]
    pub timeout_secs: u64,
}

fn default_mapper_timeout() -> u64 {
    10
}

impl ClaimsMapperConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(format!("Claims mapper URL must be HTTP(S): {}", self.url));
        }

        if self.timeout_secs == 0 {
            return Err("Claims mapper timeout must be greater than zero".to_string());
        }

        Ok(())
    }
}
