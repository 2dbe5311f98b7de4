use crate::app::ports::HttpClientPort;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::pipeline::catalog::ReferenceCatalogLoader;
use crate::pipeline::diagnostics::{DiagnosticsSummary, StageDiagnostics};
use crate::pipeline::discovery::PeriodDiscoverer;
use crate::pipeline::enrich::{enrich, EnrichmentReport};
use crate::pipeline::parser::RecordParser;
use crate::pipeline::retrieval::ArchiveRetriever;
use crate::sink::RecordSink;
use crate::types::{ExpenseRecord, ExtractedFile, ReferenceCatalog, ReportingPeriod};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Summary of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub periods: Vec<ReportingPeriod>,
    pub files_extracted: usize,
    pub retrieval: DiagnosticsSummary,
    pub parsing: DiagnosticsSummary,
    pub operators_loaded: usize,
    pub enrichment: EnrichmentReport,
    pub records_written: usize,
}

/// Enriched records and the catalog they were joined against, before any sink.
#[derive(Debug)]
pub struct PipelineOutput {
    pub records: Vec<ExpenseRecord>,
    pub catalog: ReferenceCatalog,
    pub summary: RunSummary,
}

/// Sequences discovery → retrieval → parsing → enrichment. The catalog download runs
/// alongside retrieval and parsing; enrichment starts only once both are done.
pub struct Pipeline {
    config: Config,
    http: Arc<dyn HttpClientPort>,
}

impl Pipeline {
    pub fn new(config: Config, http: Arc<dyn HttpClientPort>) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn discover(&self) -> Result<Vec<ReportingPeriod>> {
        PeriodDiscoverer::new(self.http.clone(), &self.config)
            .discover_top_periods(self.config.period_count)
            .await
    }

    #[instrument(skip(self))]
    pub async fn collect(&self) -> Result<PipelineOutput> {
        let started_at = Utc::now();

        info!("Stage 1: discovering reporting periods");
        let periods = self.discover().await?;
        if periods.is_empty() {
            warn!("No reporting periods found");
        }

        info!("Stage 2: retrieving archives and loading the operator catalog");
        let loader = ReferenceCatalogLoader::new(self.http.clone(), &self.config);
        let retriever = ArchiveRetriever::new(self.http.clone(), &self.config);
        let parser = Arc::new(RecordParser::from_config(&self.config));

        let (catalog, (outcome, (mut records, parsing))) = tokio::try_join!(loader.load_catalog(), async {
            let outcome = retriever.retrieve_and_extract(&periods).await?;
            info!("Stage 3: parsing {} extracted files", outcome.files.len());
            let parsed = parse_all(parser.clone(), &outcome.files).await;
            Ok::<_, PipelineError>((outcome, parsed))
        })?;

        info!("Stage 4: enriching {} records", records.len());
        let enrichment = enrich(&mut records, &catalog);

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            periods,
            files_extracted: outcome.files.len(),
            retrieval: outcome.diagnostics,
            parsing,
            operators_loaded: catalog.len(),
            enrichment,
            records_written: 0,
        };
        Ok(PipelineOutput {
            records,
            catalog,
            summary,
        })
    }

    /// Run every stage and hand the result to `sink`.
    pub async fn run(&self, sink: &mut dyn RecordSink) -> Result<RunSummary> {
        let PipelineOutput {
            records,
            catalog,
            mut summary,
        } = self.collect().await?;

        info!("Stage 5: writing results");
        let operators: Vec<_> = catalog.operators().cloned().collect();
        sink.write_operators(&operators)?;
        summary.records_written = sink.write_expenses(&records)?;
        summary.finished_at = Utc::now();
        Ok(summary)
    }
}

/// One blocking parse task per file. A file that cannot be opened is counted, not fatal.
pub async fn parse_all(
    parser: Arc<RecordParser>,
    files: &[ExtractedFile],
) -> (Vec<ExpenseRecord>, DiagnosticsSummary) {
    let handles: Vec<_> = files
        .iter()
        .map(|file| {
            let parser = parser.clone();
            let path = file.path.clone();
            tokio::task::spawn_blocking(move || parser.parse_file(&path))
        })
        .collect();

    let diagnostics = StageDiagnostics::new();
    let mut records = Vec::new();
    for (handle, file) in handles.into_iter().zip(files) {
        match handle.await {
            Ok(Ok(outcome)) => {
                diagnostics.absorb(&outcome.diagnostics);
                records.extend(outcome.records);
            }
            Ok(Err(e)) => {
                warn!("Could not parse {}: {}", file.path.display(), e);
                diagnostics.record_failure(format!("{}: {}", file.path.display(), e));
            }
            Err(join_error) => {
                warn!("Parse task for {} aborted: {}", file.path.display(), join_error);
                diagnostics.record_failure(format!("{}: {}", file.path.display(), join_error));
            }
        }
    }

    let summary = diagnostics.summary("parse");
    summary.log();
    (records, summary)
}
