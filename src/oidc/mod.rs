//! Upstream issuer verification.
//!
//! Each trusted issuer is resolved through OIDC discovery at startup and gets
//! a verifier backed by its JWKS. The resulting registry is read-only.

pub mod config;
pub mod jwks;
pub mod registry;
pub mod validator;

pub use config::IssuersConfig;
pub use registry::IssuerRegistry;
pub use validator::VerificationError;
