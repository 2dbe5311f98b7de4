use crate::constants::DIAGNOSTIC_SAMPLE_LIMIT;
use serde::Serialize;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

/// Aggregated outcome counters for one stage, shareable across tasks.
///
/// Recoverable failures are not raised individually; they are counted here and the
/// first few messages are kept as samples for the end-of-stage summary.
#[derive(Debug, Default)]
pub struct StageDiagnostics {
    succeeded: AtomicU64,
    filtered: AtomicU64,
    failed: AtomicU64,
    samples: Mutex<Vec<String>>,
}

/// Point-in-time copy of a stage's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSummary {
    pub stage: String,
    pub succeeded: u64,
    pub filtered: u64,
    pub failed: u64,
    pub samples: Vec<String>,
}

impl StageDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_successes(&self, n: u64) {
        self.succeeded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_filtered(&self, n: u64) {
        self.filtered.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: impl Display) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.push_sample(error.to_string());
    }

    fn push_sample(&self, sample: String) {
        if let Ok(mut samples) = self.samples.lock() {
            if samples.len() < DIAGNOSTIC_SAMPLE_LIMIT {
                samples.push(sample);
            }
        }
    }

    /// Fold another stage's counts (e.g. one file's parse) into this one.
    pub fn absorb(&self, other: &DiagnosticsSummary) {
        self.succeeded.fetch_add(other.succeeded, Ordering::Relaxed);
        self.filtered.fetch_add(other.filtered, Ordering::Relaxed);
        self.failed.fetch_add(other.failed, Ordering::Relaxed);
        for sample in &other.samples {
            self.push_sample(sample.clone());
        }
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn summary(&self, stage: &str) -> DiagnosticsSummary {
        let samples = self.samples.lock().map(|s| s.clone()).unwrap_or_default();
        DiagnosticsSummary {
            stage: stage.to_string(),
            succeeded: self.succeeded(),
            filtered: self.filtered(),
            failed: self.failed(),
            samples,
        }
    }
}

impl DiagnosticsSummary {
    /// One line per stage; a warning only when something was skipped for cause.
    pub fn log(&self) {
        if self.failed > 0 {
            warn!(
                stage = %self.stage,
                succeeded = self.succeeded,
                filtered = self.filtered,
                failed = self.failed,
                samples = ?self.samples,
                "Stage finished with skipped items"
            );
        } else {
            info!(
                stage = %self.stage,
                succeeded = self.succeeded,
                filtered = self.filtered,
                "Stage finished"
            );
        }
    }
}
