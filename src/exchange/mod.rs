//! Token exchange.
//!
//! Exchange a JWT from a trusted upstream issuer for a JWT signed by this
//! service. The external claims mapper decides whether the exchange is
//! allowed and which claims the issued token carries.

pub mod config;
pub mod engine;
pub mod issuer;
pub mod mapper;
pub mod token;

pub use config::{ClaimsMapperConfig, TokenExchangeConfig};
pub use engine::{ExchangeError, TokenExchangeEngine};
pub use issuer::TokenIssuer;
pub use mapper::HttpClaimsMapper;
