//! Issuer discovery and JWKS (JSON Web Key Set) caching.

use anyhow::{anyhow, Context, Result};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Subset of the OIDC discovery document needed to locate keys.
#[derive(Debug, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub jwks_uri: String,
}

/// Fetch an issuer's discovery document.
///
/// The document must name the same issuer it was fetched for.
pub async fn discover(http_client: &reqwest::Client, issuer: &str) -> Result<ProviderMetadata> {
    let url = format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    );
    debug!(url = %url, "Fetching OIDC discovery document");

    let response = http_client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch discovery document: {}", url))?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Discovery endpoint {} returned status {}",
            url,
            response.status()
        ));
    }

    let metadata: ProviderMetadata = response
        .json()
        .await
        .context("Failed to parse discovery document")?;

    if metadata.issuer != issuer {
        return Err(anyhow!(
            "Issuer mismatch: expected {:?}, discovery document says {:?}",
            issuer,
            metadata.issuer
        ));
    }

    Ok(metadata)
}

/// Per-issuer signing keys, refreshed on an interval and on unknown `kid`.
///
/// The `kid` is read from an unverified header, so fetches are rate limited:
/// at most one fetch per `min_refresh` interval, and concurrent callers share
/// a single in-flight fetch. A failed refresh keeps the previous keys.
pub struct JwksCache {
    keys: RwLock<HashMap<String, DecodingKey>>,
    /// Last successful fetch.
    fetched_at: RwLock<Instant>,
    /// Last fetch attempt, successful or not.
    attempted_at: RwLock<Instant>,
    max_age: Duration,
    min_refresh: Duration,
    refresh_gate: tokio::sync::Mutex<()>,
    jwks_url: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// One entry of a published key set. Only the members needed to build an
/// RSA or EC verification key are read.
#[derive(Debug, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

impl JwksCache {
    /// Create a cache and perform the initial fetch.
    pub async fn new(
        http_client: reqwest::Client,
        jwks_url: String,
        refresh_secs: u64,
        min_refresh_secs: u64,
    ) -> Result<Self> {
        let keys = fetch_signing_keys(&http_client, &jwks_url).await?;
        info!(url = %jwks_url, key_count = keys.len(), "JWKS loaded");

        let now = Instant::now();
        Ok(Self {
            keys: RwLock::new(keys),
            fetched_at: RwLock::new(now),
            attempted_at: RwLock::new(now),
            max_age: Duration::from_secs(refresh_secs),
            min_refresh: Duration::from_secs(min_refresh_secs),
            refresh_gate: tokio::sync::Mutex::new(()),
            jwks_url,
            http_client,
        })
    }

    /// Keys a token may have been signed with.
    ///
    /// With a `kid`, exactly that key (refreshing first if it is unknown and
    /// the refresh interval allows). Without one, every cached signing key.
    pub async fn keys_for(&self, kid: Option<&str>) -> Result<Vec<DecodingKey>> {
        self.refresh_if_needed().await?;

        match kid {
            Some(kid) => Ok(vec![self.get_key(kid).await?]),
            None => {
                let keys = self.keys.read().map_err(|_| anyhow!("Lock poisoned"))?;
                if keys.is_empty() {
                    return Err(anyhow!("No keys available in JWKS"));
                }
                Ok(keys.values().cloned().collect())
            }
        }
    }

    async fn get_key(&self, kid: &str) -> Result<DecodingKey> {
        if let Some(key) = self.cached(kid)? {
            return Ok(key);
        }

        debug!(kid = %kid, url = %self.jwks_url, "Unknown kid, refreshing JWKS");
        if let Err(e) = self.refresh().await {
            warn!(url = %self.jwks_url, error = %e, "JWKS refresh failed");
        }

        self.cached(kid)?
            .ok_or_else(|| anyhow!("No key with kid {:?} in JWKS", kid))
    }

    fn cached(&self, kid: &str) -> Result<Option<DecodingKey>> {
        let keys = self.keys.read().map_err(|_| anyhow!("Lock poisoned"))?;
        Ok(keys.get(kid).cloned())
    }

    async fn refresh_if_needed(&self) -> Result<()> {
        let stale = self
            .fetched_at
            .read()
            .map_err(|_| anyhow!("Lock poisoned"))?
            .elapsed()
            >= self.max_age;

        if stale {
            if let Err(e) = self.refresh().await {
                warn!(
                    url = %self.jwks_url,
                    error = %e,
                    "JWKS refresh failed, serving cached keys"
                );
            }
        }
        Ok(())
    }

    /// Replace the cached keys with the issuer's current set.
    ///
    /// A no-op when another fetch was attempted within `min_refresh`,
    /// including one that completed while this caller waited on the gate.
    async fn refresh(&self) -> Result<()> {
        let _gate = self.refresh_gate.lock().await;

        {
            let mut attempted_at = self
                .attempted_at
                .write()
                .map_err(|_| anyhow!("Lock poisoned"))?;
            if attempted_at.elapsed() < self.min_refresh {
                debug!(url = %self.jwks_url, "JWKS fetched recently, skipping refresh");
                return Ok(());
            }
            *attempted_at = Instant::now();
        }

        let fresh = fetch_signing_keys(&self.http_client, &self.jwks_url).await?;
        let key_count = fresh.len();

        *self.keys.write().map_err(|_| anyhow!("Lock poisoned"))? = fresh;
        *self.fetched_at.write().map_err(|_| anyhow!("Lock poisoned"))? = Instant::now();

        info!(url = %self.jwks_url, key_count, "JWKS cache refreshed");
        Ok(())
    }
}

/// Fetch a JWKS and keep the keys usable for signature verification.
///
/// Encryption keys and keys that fail to parse are skipped; a set with no
/// usable key is an error.
async fn fetch_signing_keys(
    http_client: &reqwest::Client,
    jwks_url: &str,
) -> Result<HashMap<String, DecodingKey>> {
    debug!(url = %jwks_url, "Fetching JWKS");

    let response = http_client
        .get(jwks_url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch JWKS: {}", jwks_url))?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "JWKS endpoint {} returned status {}",
            jwks_url,
            response.status()
        ));
    }

    let set: JwkSet = response.json().await.context("Failed to parse JWKS")?;

    let keys: HashMap<String, DecodingKey> = set
        .keys
        .iter()
        .filter(|jwk| jwk.key_use.as_deref() != Some("enc"))
        .filter_map(|jwk| match jwk_to_decoding_key(jwk) {
            Ok(key) => {
                let kid = jwk.kid.clone().unwrap_or_else(|| "default".to_string());
                debug!(kid = %kid, kty = %jwk.kty, alg = ?jwk.alg, "Loaded JWK");
                Some((kid, key))
            }
            Err(e) => {
                warn!(kid = ?jwk.kid, kty = %jwk.kty, error = %e, "Skipping unusable JWK");
                None
            }
        })
        .collect();

    if keys.is_empty() {
        return Err(anyhow!("No usable signing keys in JWKS at {}", jwks_url));
    }
    Ok(keys)
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey> {
    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_ref().ok_or_else(|| anyhow!("RSA key missing 'n'"))?;
            let e = jwk.e.as_ref().ok_or_else(|| anyhow!("RSA key missing 'e'"))?;

            DecodingKey::from_rsa_components(n, e).context("Failed to create RSA DecodingKey")
        }
        "EC" => {
            let x = jwk.x.as_ref().ok_or_else(|| anyhow!("EC key missing 'x'"))?;
            let y = jwk.y.as_ref().ok_or_else(|| anyhow!("EC key missing 'y'"))?;

            match jwk.crv.as_deref() {
                Some("P-256") | Some("P-384") => {
                    DecodingKey::from_ec_components(x, y).context("Failed to create EC DecodingKey")
                }
                crv => Err(anyhow!("Unsupported EC curve: {:?}", crv)),
            }
        }
        kty => Err(anyhow!("Unsupported key type: {}", kty)),
    }
}
