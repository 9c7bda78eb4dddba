//! HTTP surface.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::discovery::DiscoveryPublisher;
use crate::exchange::{ExchangeError, TokenExchangeEngine};

/// Header carrying a caller-supplied trace id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const JWT_CONTENT_TYPE: &str = "application/jwt";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TokenExchangeEngine>,
    pub publisher: Arc<DiscoveryPublisher>,
}

#[derive(Debug, Deserialize)]
struct ExchangeParams {
    #[serde(rename = "issuerId", default)]
    issuer_id: String,
}

/// Build the service router.
///
/// Requests running past `request_timeout` are answered 408; an exchange in
/// flight is dropped at its current step and still audited.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/exchange", post(exchange))
        .route("/.well-known/openid-configuration", get(openid_configuration))
        .route("/.well-known/jwks", get(jwks))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn exchange(
    State(state): State<AppState>,
    Query(params): Query<ExchangeParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = trace_id(&headers);
    let input_token = String::from_utf8_lossy(&body);

    match state
        .engine
        .exchange(&params.issuer_id, input_token.trim(), &trace_id)
        .await
    {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, JWT_CONTENT_TYPE)],
            output.token,
        )
            .into_response(),
        Err(e) => exchange_error_response(&e),
    }
}

async fn openid_configuration(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.publisher.discovery_document())
}

async fn jwks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.publisher.jwks())
}

/// Trace id from `X-Request-Id`, or a fresh UUID.
fn trace_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Map an exchange failure to a terse response. Causes are logged by the
/// engine and never returned to the caller.
fn exchange_error_response(error: &ExchangeError) -> Response {
    let (status, message) = match error {
        ExchangeError::UnrecognizedIssuer(_) => (StatusCode::NOT_FOUND, "unrecognized issuer"),
        ExchangeError::VerificationFailed(_) => (StatusCode::UNAUTHORIZED, "invalid token"),
        ExchangeError::DeniedByPolicy => (StatusCode::FORBIDDEN, "exchange denied"),
        ExchangeError::MapperInvocationFailed(_) => (StatusCode::BAD_GATEWAY, "claims mapping failed"),
        ExchangeError::SigningFailed(_) => (StatusCode::BAD_GATEWAY, "signing failed"),
    };

    (status, message).into_response()
}
