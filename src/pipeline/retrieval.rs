use crate::app::ports::HttpClientPort;
use crate::config::Config;
use crate::constants::ARCHIVE_SUFFIX;
use crate::error::{PipelineError, Result};
use crate::pipeline::diagnostics::{DiagnosticsSummary, StageDiagnostics};
use crate::pipeline::extract::extract_tabular_entries;
use crate::scrapers::listing::parse_anchors;
use crate::types::{ExtractedFile, ReportingPeriod};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

/// Downloads each selected period's archive and unpacks its tabular files.
pub struct ArchiveRetriever {
    http: Arc<dyn HttpClientPort>,
    staging_dir: PathBuf,
    extract_dir: PathBuf,
}

/// Whatever could be extracted, plus how many periods were skipped and why.
#[derive(Debug)]
pub struct RetrievalOutcome {
    pub files: Vec<ExtractedFile>,
    pub diagnostics: DiagnosticsSummary,
}

impl ArchiveRetriever {
    pub fn new(http: Arc<dyn HttpClientPort>, config: &Config) -> Self {
        Self {
            http,
            staging_dir: config.staging_dir.clone(),
            extract_dir: config.extract_dir.clone(),
        }
    }

    /// Retrieve every period concurrently. A failing period is logged, counted and left
    /// out; it never cancels the others. Only failing to create the working directories
    /// is an error. Dropping the returned future aborts every period still in flight.
    #[instrument(skip(self, periods), fields(periods = periods.len()))]
    pub async fn retrieve_and_extract(&self, periods: &[ReportingPeriod]) -> Result<RetrievalOutcome> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        tokio::fs::create_dir_all(&self.extract_dir).await?;

        let mut tasks = JoinSet::new();
        for (index, period) in periods.iter().cloned().enumerate() {
            let http = self.http.clone();
            let staging = self.staging_dir.clone();
            let extract = self.extract_dir.clone();
            tasks.spawn(async move {
                let result = retrieve_period(http.as_ref(), &period, &staging, &extract).await;
                (index, result)
            });
        }

        // Tasks finish in any order; slots keep the output in period order
        let mut slots: Vec<Option<Result<Vec<PathBuf>>>> = periods.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(join_error) => warn!("Retrieval task aborted: {}", join_error),
            }
        }

        let diagnostics = StageDiagnostics::new();
        let mut files = Vec::new();
        for (period, slot) in periods.iter().zip(slots) {
            let result = slot.unwrap_or_else(|| {
                Err(PipelineError::PeriodRetrieval {
                    url: period.source_url.clone(),
                    message: "retrieval task did not complete".to_string(),
                })
            });
            match result {
                Ok(paths) => {
                    info!("{}: {} file(s) extracted", period.label(), paths.len());
                    diagnostics.record_success();
                    files.extend(paths.into_iter().map(|path| ExtractedFile {
                        path,
                        period: period.clone(),
                    }));
                }
                Err(e) => {
                    warn!("Skipping period {}: {}", period.label(), e);
                    crate::metrics::retrieval::period_skipped(e.kind());
                    diagnostics.record_failure(&e);
                }
            }
        }

        let summary = diagnostics.summary("retrieval");
        summary.log();
        Ok(RetrievalOutcome {
            files,
            diagnostics: summary,
        })
    }
}

async fn retrieve_period(
    http: &dyn HttpClientPort,
    period: &ReportingPeriod,
    staging_dir: &Path,
    extract_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let retrieval_failed = |message: String| PipelineError::PeriodRetrieval {
        url: period.source_url.clone(),
        message,
    };

    let archive_url = locate_archive(http, &period.source_url)
        .await
        .map_err(|e| retrieval_failed(e.to_string()))?
        .ok_or_else(|| retrieval_failed(format!("no {ARCHIVE_SUFFIX} archive in listing")))?;

    // Each period gets its own folders so archives sharing entry names never collide
    let period_dir = period_dir_name(period);
    let staging_dir = staging_dir.join(&period_dir);
    tokio::fs::create_dir_all(&staging_dir).await?;
    let archive_path = staging_dir.join(archive_file_name(&archive_url, period));
    info!("Downloading {} -> {}", archive_url, archive_path.display());
    let bytes = http
        .download_to(&archive_url, &archive_path)
        .await
        .map_err(|e| retrieval_failed(e.to_string()))?;
    crate::metrics::retrieval::archive_downloaded(bytes);

    let extract_dir = extract_dir.join(&period_dir);
    let archive_for_task = archive_path.clone();
    tokio::task::spawn_blocking(move || extract_tabular_entries(&archive_for_task, &extract_dir))
        .await
        .map_err(|e| PipelineError::ArchiveExtraction {
            path: archive_path,
            message: e.to_string(),
        })?
}

/// The period URL itself when it already names an archive, otherwise the first archive
/// linked from its directory listing.
pub async fn locate_archive(http: &dyn HttpClientPort, url: &str) -> Result<Option<String>> {
    if is_archive_url(url) {
        return Ok(Some(url.to_string()));
    }
    let html = http.get_text(url).await?;
    Ok(parse_anchors(url, &html)
        .into_iter()
        .find(|a| is_archive_url(&a.href))
        .map(|a| a.url))
}

pub fn is_archive_url(url: &str) -> bool {
    url.trim_end().to_lowercase().ends_with(ARCHIVE_SUFFIX)
}

/// "2024_1T": the per-period folder under staging and extraction.
pub fn period_dir_name(period: &ReportingPeriod) -> String {
    format!("{}_{}T", period.year, period.quarter)
}

fn archive_file_name(url: &str, period: &ReportingPeriod) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_{}T{}", period.year, period.quarter, ARCHIVE_SUFFIX))
}
