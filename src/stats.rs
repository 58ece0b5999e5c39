//! Lock-free counters for the inference pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::info;

#[derive(Debug, Default)]
pub struct PipelineStats {
    requests: AtomicU64,
    succeeded: AtomicU64,
    client_errors: AtomicU64,
    internal_errors: AtomicU64,
    /// Numeric fields whose value could not be parsed and was replaced by 0.
    coerced_to_zero: AtomicU64,
    /// Risk codes that could not be mapped back to a label.
    degraded_decodes: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub succeeded: u64,
    pub client_errors: u64,
    pub internal_errors: u64,
    pub coerced_to_zero: u64,
    pub degraded_decodes: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_client_error(&self) {
        self.client_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_internal_error(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coercion(&self) {
        self.coerced_to_zero.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded_decode(&self) {
        self.degraded_decodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            coerced_to_zero: self.coerced_to_zero.load(Ordering::Relaxed),
            degraded_decodes: self.degraded_decodes.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            requests = s.requests,
            succeeded = s.succeeded,
            client_errors = s.client_errors,
            internal_errors = s.internal_errors,
            coerced_to_zero = s.coerced_to_zero,
            degraded_decodes = s.degraded_decodes,
            "Pipeline summary"
        );
    }
}
