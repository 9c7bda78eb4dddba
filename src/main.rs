//! Zentinel JWT Exchange
//!
//! Exchanges JWTs issued by trusted upstream identity providers (CI systems,
//! workload identity issuers) for JWTs signed by this service, after an
//! external claims mapper has authorized the exchange and shaped the claims.
//! Publishes OIDC discovery metadata so relying parties can verify the issued
//! tokens.

mod audit;
mod discovery;
mod exchange;
mod oidc;
mod server;
mod signer;

#[cfg(test)]
mod test_support;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use audit::{AuditRecorder, AuditSink, FileSink, StdoutSink};
use discovery::DiscoveryPublisher;
use exchange::{
    ClaimsMapperConfig, HttpClaimsMapper, TokenExchangeConfig, TokenExchangeEngine, TokenIssuer,
};
use oidc::{IssuerRegistry, IssuersConfig};
use server::AppState;
use signer::{derive_key_id, ExternalSigner, LocalRsaSigner};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "zentinel-jwt-exchange")]
#[command(about = "JWT exchange service for trusted upstream identity providers")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080", env = "LISTEN_ADDR")]
    listen: SocketAddr,

    /// Issuer URL of this service (iss claim of issued tokens)
    #[arg(long, env = "ISSUER_URL")]
    issuer_url: String,

    /// PEM RSA private key used to sign issued tokens
    #[arg(long, env = "SIGNING_KEY_PATH")]
    signing_key: PathBuf,

    /// Custody key identifier; the published kid is derived from it.
    /// Defaults to the signing key path.
    #[arg(long, env = "KEY_ID")]
    key_id: Option<String>,

    /// Claims mapper endpoint
    #[arg(long, env = "MAPPER_URL")]
    mapper_url: String,

    /// Claims mapper request timeout in seconds
    #[arg(long, default_value = "10", env = "MAPPER_TIMEOUT_SECS")]
    mapper_timeout_secs: u64,

    /// Trusted issuers file (JSON)
    #[arg(long, env = "ISSUERS_CONFIG")]
    issuers_config: Option<PathBuf>,

    /// Append audit records to this file instead of stdout
    #[arg(long, env = "AUDIT_LOG")]
    audit_log: Option<PathBuf>,

    /// Per-request deadline in seconds
    #[arg(long, default_value = "30", env = "REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: u64,

    /// Enable verbose logging
    #[arg(short, long, env = "VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={},tower_http={}",
            env!("CARGO_CRATE_NAME"),
            log_level,
            log_level
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    info!("Starting Zentinel JWT Exchange");

    let key_identifier = args
        .key_id
        .clone()
        .unwrap_or_else(|| args.signing_key.display().to_string());

    let exchange_config = TokenExchangeConfig {
        issuer: args.issuer_url.clone(),
        key_id: derive_key_id(&key_identifier),
    };
    exchange_config
        .validate()
        .map_err(|e| anyhow!("Invalid exchange configuration: {}", e))?;

    let mapper_config = ClaimsMapperConfig {
        url: args.mapper_url.clone(),
        timeout_secs: args.mapper_timeout_secs,
    };
    mapper_config
        .validate()
        .map_err(|e| anyhow!("Invalid claims mapper configuration: {}", e))?;

    let issuers = match &args.issuers_config {
        Some(path) => IssuersConfig::load(path)?,
        None => IssuersConfig::default(),
    };

    info!(
        issuer = %exchange_config.issuer,
        kid = %exchange_config.key_id,
        mapper_url = %mapper_config.url,
        issuers_count = issuers.issuers.len(),
        audit_log = ?args.audit_log,
        "Configuration loaded"
    );

    let signer: Arc<dyn ExternalSigner> = Arc::new(
        LocalRsaSigner::from_pem_file(&args.signing_key).context("Failed to load signing key")?,
    );

    let registry = IssuerRegistry::discover(&issuers)
        .await
        .context("Failed to build issuer registry")?;
    if registry.is_empty() {
        warn!("No issuers configured; every exchange will be rejected");
    }

    let mapper = HttpClaimsMapper::new(&mapper_config)?;

    let sink: Arc<dyn AuditSink> = match &args.audit_log {
        Some(path) => Arc::new(FileSink::open(path)?),
        None => Arc::new(StdoutSink),
    };

    let engine = TokenExchangeEngine::new(
        Arc::new(registry),
        Arc::new(mapper),
        TokenIssuer::new(&exchange_config, signer.clone()),
        AuditRecorder::new(sink),
    );

    let state = AppState {
        engine: Arc::new(engine),
        publisher: Arc::new(DiscoveryPublisher::new(&exchange_config, signer)),
    };
    let app = server::router(state, Duration::from_secs(args.request_timeout_secs));

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!(addr = %args.listen, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
