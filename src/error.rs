use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Fatal: the category folder could not be located or a listing fetch failed.
    #[error("Discovery failed at {url}: {message}")]
    Discovery { url: String, message: String },

    /// One period could not be fetched; the run continues without it.
    #[error("Retrieval failed for {url}: {message}")]
    PeriodRetrieval { url: String, message: String },

    /// One archive could not be unpacked; the run continues without it.
    #[error("Extraction failed for {}: {message}", path.display())]
    ArchiveExtraction { path: PathBuf, message: String },

    #[error("Row {line} could not be parsed: {message}")]
    RowParse { line: u64, message: String },

    /// Fatal: enrichment cannot proceed without the operator catalog.
    #[error("Catalog load failed for {url}: {message}")]
    CatalogLoad { url: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Run deadline exceeded")]
    Cancelled,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Whether a failed network call is worth repeating.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            PipelineError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            PipelineError::Timeout { .. } => true,
            PipelineError::Io(_) => true,
            _ => false,
        }
    }

    /// Short label used for metrics and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Discovery { .. } => "discovery",
            PipelineError::PeriodRetrieval { .. } => "period_retrieval",
            PipelineError::ArchiveExtraction { .. } => "archive_extraction",
            PipelineError::RowParse { .. } => "row_parse",
            PipelineError::CatalogLoad { .. } => "catalog_load",
            PipelineError::Http(_) => "http",
            PipelineError::Status { .. } => "status",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Csv(_) => "csv",
            PipelineError::Zip(_) => "zip",
            PipelineError::Toml(_) => "toml",
            PipelineError::Io(_) => "io",
            PipelineError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let busy = PipelineError::Status { url: "u".into(), status: 503 };
        let missing = PipelineError::Status { url: "u".into(), status: 404 };
        let throttled = PipelineError::Status { url: "u".into(), status: 429 };
        assert!(busy.is_transient());
        assert!(throttled.is_transient());
        assert!(!missing.is_transient());
        assert!(!PipelineError::Cancelled.is_transient());
    }

    #[test]
    fn fatal_errors_carry_the_failing_url() {
        let err = PipelineError::Discovery {
            url: "https://example.org/PDA/".into(),
            message: "category folder not found".into(),
        };
        assert!(err.to_string().contains("https://example.org/PDA/"));
        assert_eq!(err.kind(), "discovery");
    }
}
