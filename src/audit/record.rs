//! Audit record shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::exchange::token::decode_unverified;

/// One exchange attempt.
///
/// Header and claims are the raw decoded segments of the input and output
/// tokens. They are not re-verified and are `null` when a token is absent or
/// cannot be decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub issuer_id: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub output_size: usize,
    pub src_header: Option<Value>,
    pub src_claims: Option<Value>,
    pub dst_header: Option<Value>,
    pub dst_claims: Option<Value>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl AuditRecord {
    /// Build a record from the raw input and output tokens.
    ///
    /// `output_token` is empty when the exchange produced nothing.
    pub fn new(
        trace_id: &str,
        issuer_id: &str,
        input_token: &str,
        output_token: &str,
        allowed: bool,
    ) -> Self {
        let (src_header, src_claims) = decode_unverified(input_token);
        let (dst_header, dst_claims) = decode_unverified(output_token);

        Self {
            timestamp: Utc::now(),
            trace_id: trace_id.to_string(),
            issuer_id: issuer_id.to_string(),
            allowed,
            output_size: output_token.len(),
            src_header,
            src_claims,
            dst_header,
            dst_claims,
        }
    }
}
