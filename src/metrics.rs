//! Per-phase counters for the disclosure pipeline.
//!
//! Counters go through the `metrics` facade and are no-ops unless a recorder is
//! installed. `init_metrics` installs the Prometheus exporter when
//! `DISCLOSURE_METRICS_ADDR` is set; short batch runs normally leave it off.

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Build a metric name following `disclosure_{phase}_{name}[_total]`.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("disclosure_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("disclosure_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

/// Idempotent.
pub fn init_metrics() {
    INIT.call_once(|| {
        let Ok(addr_str) = std::env::var("DISCLOSURE_METRICS_ADDR") else {
            return;
        };
        let addr: SocketAddr = match addr_str.parse() {
            Ok(addr) => addr,
            Err(_) => {
                warn!("Invalid metrics addr '{}', exporter not started", addr_str);
                return;
            }
        };
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
            Err(e) => warn!("Prometheus exporter install failed: {}", e),
        }
    });
}

pub mod discovery {
    pub fn listing_fetched() {
        ::metrics::counter!(phase_metric!(counter, "discovery", "listings_fetched")).increment(1);
    }

    pub fn periods_found(count: usize) {
        ::metrics::counter!(phase_metric!(counter, "discovery", "periods_found")).increment(count as u64);
    }
}

pub mod retrieval {
    pub fn archive_downloaded(bytes: u64) {
        ::metrics::counter!(phase_metric!(counter, "retrieval", "archives_downloaded")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "retrieval", "archive_bytes")).record(bytes as f64);
    }

    pub fn file_extracted() {
        ::metrics::counter!(phase_metric!(counter, "retrieval", "files_extracted")).increment(1);
    }

    /// `kind` is `PipelineError::kind` of the failure that caused the skip.
    pub fn period_skipped(kind: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "retrieval", "periods_skipped"), "kind" => kind).increment(1);
    }

    pub fn request_retried(kind: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "retrieval", "requests_retried"), "kind" => kind).increment(1);
    }
}

pub mod parser {
    pub fn file_parsed(records: usize, filtered: u64, malformed: u64) {
        ::metrics::counter!(phase_metric!(counter, "parser", "files_parsed")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "parser", "records_kept")).increment(records as u64);
        ::metrics::counter!(phase_metric!(counter, "parser", "rows_filtered")).increment(filtered);
        ::metrics::counter!(phase_metric!(counter, "parser", "rows_malformed")).increment(malformed);
    }
}

pub mod catalog {
    pub fn loaded(operators: usize) {
        ::metrics::counter!(phase_metric!(counter, "catalog", "operators_loaded")).increment(operators as u64);
    }
}

pub mod enrich {
    pub fn joined(matched: u64, unmatched: u64) {
        ::metrics::counter!(phase_metric!(counter, "enrich", "records_matched")).increment(matched);
        ::metrics::counter!(phase_metric!(counter, "enrich", "records_unmatched")).increment(unmatched);
    }
}
