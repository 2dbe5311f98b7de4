use crate::app::ports::HttpClientPort;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::pipeline::columns::{decode_record, field, CatalogColumns};
use crate::pipeline::diagnostics::{DiagnosticsSummary, StageDiagnostics};
use crate::types::{CatalogBuilder, OperatorRecord, ReferenceCatalog};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Downloads the operator registry and freezes it into a `ReferenceCatalog`.
pub struct ReferenceCatalogLoader {
    http: Arc<dyn HttpClientPort>,
    catalog_url: String,
    staging_dir: PathBuf,
}

impl ReferenceCatalogLoader {
    pub fn new(http: Arc<dyn HttpClientPort>, config: &Config) -> Self {
        Self {
            http,
            catalog_url: config.catalog_url.clone(),
            staging_dir: config.staging_dir.clone(),
        }
    }

    /// Fetch and build the catalog. Any network or setup failure is fatal; individual
    /// malformed rows are skipped.
    #[instrument(skip(self), fields(url = %self.catalog_url))]
    pub async fn load_catalog(&self) -> Result<ReferenceCatalog> {
        let failed = |message: String| PipelineError::CatalogLoad {
            url: self.catalog_url.clone(),
            message,
        };

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| failed(format!("staging dir: {e}")))?;
        let dest = self.staging_dir.join(catalog_file_name(&self.catalog_url));

        info!("Downloading operator catalog");
        self.http
            .download_to(&self.catalog_url, &dest)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let (catalog, diagnostics) = tokio::task::spawn_blocking(move || {
            let file = File::open(&dest)?;
            parse_catalog(file)
        })
        .await
        .map_err(|e| failed(e.to_string()))?
        .map_err(|e| match e {
            PipelineError::CatalogLoad { message, .. } => failed(message),
            other => failed(other.to_string()),
        })?;

        diagnostics.log();
        if catalog.duplicate_keys() > 0 {
            warn!(
                "{} duplicate registry ids in catalog; the last row for each was kept",
                catalog.duplicate_keys()
            );
        }
        crate::metrics::catalog::loaded(catalog.len());
        info!("Operator catalog loaded: {} operators", catalog.len());
        Ok(catalog)
    }
}

/// Parse a `;`-delimited ISO-8859-1 operator registry.
pub fn parse_catalog<R: Read>(reader: R) -> Result<(ReferenceCatalog, DiagnosticsSummary)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = decode_record(csv_reader.byte_headers()?);
    let columns = CatalogColumns::resolve(&headers);
    debug!(?headers, ?columns, "Catalog columns");
    if columns.registry_id.is_none() {
        return Err(PipelineError::CatalogLoad {
            url: String::new(),
            message: format!("no registry id column among headers {headers:?}"),
        });
    }

    let diagnostics = StageDiagnostics::new();
    let mut builder = CatalogBuilder::new();
    let mut raw = csv::ByteRecord::new();
    loop {
        match csv_reader.read_byte_record(&mut raw) {
            Ok(false) => break,
            Ok(true) => {
                let row = decode_record(&raw);
                let Some(registry_id) = field(&row, columns.registry_id) else {
                    diagnostics.record_filtered(1);
                    continue;
                };
                let operator = OperatorRecord {
                    registry_id: registry_id.to_string(),
                    tax_id: field(&row, columns.tax_id).unwrap_or_default().to_string(),
                    legal_name: field(&row, columns.legal_name).unwrap_or_default().to_string(),
                    category: field(&row, columns.category).unwrap_or_default().to_string(),
                    region: field(&row, columns.region).unwrap_or_default().to_string(),
                };
                if builder.insert(operator) {
                    diagnostics.record_success();
                } else {
                    diagnostics.record_filtered(1);
                }
            }
            Err(e) => {
                diagnostics.record_failure(PipelineError::RowParse {
                    line: e.position().map(|p| p.line()).unwrap_or(0),
                    message: e.to_string(),
                });
                if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                    return Err(e.into());
                }
            }
        }
    }

    Ok((builder.freeze(), diagnostics.summary("catalog")))
}

fn catalog_file_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("operator_catalog.csv")
        .to_string()
}
