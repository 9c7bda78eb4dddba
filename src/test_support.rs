//! Shared fixtures for unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::audit::{AuditRecord, AuditRecorder, AuditSink};
use crate::exchange::mapper::{ClaimsMapper, ClaimsMapperRequest, ClaimsMapperResponse};
use crate::exchange::{TokenExchangeConfig, TokenExchangeEngine, TokenIssuer};
use crate::oidc::config::IssuerConfig;
use crate::oidc::{IssuerRegistry, IssuersConfig};
use crate::signer::{ExternalSigner, LocalRsaSigner, RsaPublicComponents};

/// Key this service signs with (PKCS#1).
pub const SERVICE_KEY_PEM: &str = include_str!("../tests/fixtures/service_key.pem");
/// Key the mock upstream issuer signs with (PKCS#8).
pub const UPSTREAM_KEY_PEM: &str = include_str!("../tests/fixtures/upstream_key.pem");
pub const UPSTREAM_KID: &str = "upstream-key-1";

pub const SERVICE_ISSUER: &str = "https://sts.example.com";
pub const SERVICE_KID: &str = "service-kid";

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn service_signer() -> LocalRsaSigner {
    LocalRsaSigner::from_pem(SERVICE_KEY_PEM).unwrap()
}

fn upstream_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(UPSTREAM_KEY_PEM).unwrap()
}

/// JWKS the mock upstream issuer publishes.
pub fn upstream_jwks() -> Value {
    let key = upstream_key();
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": UPSTREAM_KID,
            "alg": "RS256",
            "use": "sig",
            "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        }]
    })
}

/// Token signed by the upstream key, with its kid.
pub fn upstream_token(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(UPSTREAM_KID.to_string());
    upstream_token_with_header(header, claims)
}

pub fn upstream_token_with_header(header: Header, claims: &Value) -> String {
    let der = upstream_key().to_pkcs1_der().unwrap();
    encode(&header, claims, &EncodingKey::from_rsa_der(der.as_bytes())).unwrap()
}

/// Typical CI-issued token from `upstream`, valid for five minutes.
pub fn upstream_input_token(upstream: &MockServer) -> String {
    upstream_token(&json!({
        "iss": upstream.uri(),
        "sub": "repo:octo-org/app:ref:refs/heads/main",
        "repository_owner": "octo-org",
        "email": "dev@octo-org.example",
        "exp": now() + 300,
    }))
}

/// Upstream issuer serving discovery and JWKS.
pub async fn mock_issuer() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "jwks_uri": format!("{}/jwks", server.uri()),
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_jwks()))
        .mount(&server)
        .await;

    server
}

pub struct FailingSigner;

#[async_trait]
impl ExternalSigner for FailingSigner {
    async fn sign(&self, _digest: &[u8]) -> Result<Vec<u8>> {
        Err(anyhow!("custody service unavailable"))
    }

    fn public_key(&self) -> RsaPublicComponents {
        service_signer().public_key()
    }
}

/// Service signer that counts `sign` calls.
pub struct CountingSigner {
    inner: LocalRsaSigner,
    calls: AtomicUsize,
}

impl CountingSigner {
    pub fn new() -> Self {
        Self {
            inner: service_signer(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalSigner for CountingSigner {
    async fn sign(&self, digest: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sign(digest).await
    }

    fn public_key(&self) -> RsaPublicComponents {
        self.inner.public_key()
    }
}

/// Mapper returning a fixed decision (or a fixed failure).
pub struct StaticMapper {
    response: Option<ClaimsMapperResponse>,
    calls: AtomicUsize,
    last_request: Mutex<Option<ClaimsMapperRequest>>,
}

impl StaticMapper {
    fn with(response: Option<ClaimsMapperResponse>) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn allow(claims: Map<String, Value>) -> Self {
        Self::with(Some(ClaimsMapperResponse {
            allow: true,
            claims,
        }))
    }

    pub fn deny() -> Self {
        Self::with(Some(ClaimsMapperResponse::default()))
    }

    pub fn failing() -> Self {
        Self::with(None)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ClaimsMapperRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClaimsMapper for StaticMapper {
    async fn invoke(&self, request: &ClaimsMapperRequest) -> Result<ClaimsMapperResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.response
            .clone()
            .ok_or_else(|| anyhow!("mapper unreachable"))
    }
}

/// Mapper that never answers.
pub struct PendingMapper;

#[async_trait]
impl ClaimsMapper for PendingMapper {
    async fn invoke(&self, _request: &ClaimsMapperRequest) -> Result<ClaimsMapperResponse> {
        std::future::pending().await
    }
}

#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditSink for MemorySink {
    fn write(&self, record: &AuditRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Engine wired to a mock upstream issuer registered as `upstream`.
pub struct ExchangeFixture {
    pub engine: TokenExchangeEngine,
    pub sink: Arc<MemorySink>,
    pub upstream: MockServer,
}

pub async fn exchange_fixture(
    mapper: Arc<dyn ClaimsMapper>,
    signer: Arc<dyn ExternalSigner>,
) -> ExchangeFixture {
    let upstream = mock_issuer().await;
    let mut issuers = IssuersConfig::default();
    issuers
        .issuers
        .insert("upstream".to_string(), IssuerConfig::new(upstream.uri()));
    let registry = Arc::new(IssuerRegistry::discover(&issuers).await.unwrap());

    let config = TokenExchangeConfig {
        issuer: SERVICE_ISSUER.to_string(),
        key_id: SERVICE_KID.to_string(),
    };
    let sink = Arc::new(MemorySink::default());
    let engine = TokenExchangeEngine::new(
        registry,
        mapper,
        TokenIssuer::new(&config, signer),
        AuditRecorder::new(sink.clone()),
    );

    ExchangeFixture {
        engine,
        sink,
        upstream,
    }
}
