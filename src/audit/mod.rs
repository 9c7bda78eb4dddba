//! Exchange audit trail.
//!
//! Every exchange attempt produces exactly one [`AuditRecord`], whatever the
//! outcome. Recording is driven by [`AuditGuard`], which writes on drop: early
//! returns, errors and cancelled futures are all covered without an explicit
//! call on each path. Sink failures are logged and never change the exchange
//! result.

pub mod record;
pub mod sink;

pub use record::AuditRecord;
pub use sink::{AuditSink, FileSink, StdoutSink};

use std::sync::Arc;
use tracing::warn;

/// Builds audit records and hands them to a sink.
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record one attempt. Never fails.
    pub fn record(
        &self,
        trace_id: &str,
        issuer_id: &str,
        input_token: &str,
        output_token: &str,
        allowed: bool,
    ) {
        let record = AuditRecord::new(trace_id, issuer_id, input_token, output_token, allowed);

        if let Err(e) = self.sink.write(&record) {
            warn!(
                trace_id = %trace_id,
                issuer_id = %issuer_id,
                error = %e,
                "Failed to write audit record"
            );
        }
    }

    /// Start auditing an attempt. The record is written when the guard drops.
    pub fn begin<'a>(
        &'a self,
        trace_id: &'a str,
        issuer_id: &'a str,
        input_token: &'a str,
    ) -> AuditGuard<'a> {
        AuditGuard {
            recorder: self,
            trace_id,
            issuer_id,
            input_token,
            output_token: None,
        }
    }
}

/// Pending audit record for one attempt; written on drop.
pub struct AuditGuard<'a> {
    recorder: &'a AuditRecorder,
    trace_id: &'a str,
    issuer_id: &'a str,
    input_token: &'a str,
    output_token: Option<String>,
}

impl AuditGuard<'_> {
    /// Mark the attempt as allowed, with the token that was issued.
    pub fn succeeded(&mut self, output_token: &str) {
        self.output_token = Some(output_token.to_string());
    }
}

impl Drop for AuditGuard<'_> {
    fn drop(&mut self) {
        let output = self.output_token.as_deref();
        self.recorder.record(
            self.trace_id,
            self.issuer_id,
            self.input_token,
            output.unwrap_or_default(),
            output.is_some(),
        );
    }
}
