use crate::config::Config;
use crate::constants::FILE_QUARTER_TOKENS;
use crate::error::{PipelineError, Result};
use crate::pipeline::columns::{decode_latin1, decode_record, field, ExpenseColumns};
use crate::pipeline::diagnostics::{DiagnosticsSummary, StageDiagnostics};
use crate::types::ExpenseRecord;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// Parses one extracted disclosure file into expense rows.
///
/// Tolerant by construction: unknown layouts yield no rows, bad rows are counted and
/// skipped, and only failing to open the file is an error.
#[derive(Debug, Clone)]
pub struct RecordParser {
    expense_prefix: String,
    year_tokens: Vec<i32>,
}

#[derive(Debug)]
pub struct ParseOutcome {
    pub records: Vec<ExpenseRecord>,
    pub diagnostics: DiagnosticsSummary,
}

impl RecordParser {
    pub fn new(expense_prefix: impl Into<String>, year_tokens: Vec<i32>) -> Self {
        Self {
            expense_prefix: expense_prefix.into(),
            year_tokens,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.expense_category_prefix.clone(), config.year_tokens.clone())
    }

    /// Blocking; the pipeline runs one of these per file on the blocking pool.
    #[instrument(skip(self), fields(file = %path.display()))]
    pub fn parse_file(&self, path: &Path) -> Result<ParseOutcome> {
        let delimiter = sniff_delimiter(BufReader::new(File::open(path)?))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        debug!("Delimiter '{}' for {}", delimiter as char, file_name);

        let outcome = self.parse_reader(File::open(path)?, delimiter, &file_name);
        info!(
            "{}: {} expense rows kept, {} filtered, {} malformed",
            file_name,
            outcome.records.len(),
            outcome.diagnostics.filtered,
            outcome.diagnostics.failed
        );
        crate::metrics::parser::file_parsed(
            outcome.records.len(),
            outcome.diagnostics.filtered,
            outcome.diagnostics.failed,
        );
        Ok(outcome)
    }

    /// Parse already-opened content. Year and quarter come from `file_name`, not the rows.
    pub fn parse_reader<R: Read>(&self, reader: R, delimiter: u8, file_name: &str) -> ParseOutcome {
        let diagnostics = StageDiagnostics::new();
        let (year, quarter) = period_from_file_name(file_name, &self.year_tokens);

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = match csv_reader.byte_headers() {
            Ok(h) => decode_record(h),
            Err(e) => {
                diagnostics.record_failure(PipelineError::RowParse {
                    line: 1,
                    message: format!("{file_name}: unreadable header: {e}"),
                });
                return ParseOutcome {
                    records: Vec::new(),
                    diagnostics: diagnostics.summary("parse"),
                };
            }
        };
        let columns = ExpenseColumns::resolve(&headers);
        debug!(?headers, ?columns, "Resolved columns");

        let mut records = Vec::new();
        let mut raw = csv::ByteRecord::new();
        loop {
            match csv_reader.read_byte_record(&mut raw) {
                Ok(false) => break,
                Ok(true) => {
                    let row = decode_record(&raw);
                    match self.build_record(&row, &columns) {
                        Some(mut record) => {
                            record.year = year;
                            record.quarter = quarter;
                            records.push(record);
                        }
                        None => diagnostics.record_filtered(1),
                    }
                }
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    diagnostics.record_failure(PipelineError::RowParse {
                        line,
                        message: format!("{file_name}: {e}"),
                    });
                    // An I/O error will not go away by reading on
                    if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                        break;
                    }
                }
            }
        }

        diagnostics.record_successes(records.len() as u64);
        ParseOutcome {
            records,
            diagnostics: diagnostics.summary("parse"),
        }
    }

    /// A row becomes a record only when its account code is an expense code.
    fn build_record(&self, row: &[String], columns: &ExpenseColumns) -> Option<ExpenseRecord> {
        let account_code = field(row, columns.account_code)?;
        if !account_code.starts_with(&self.expense_prefix) {
            return None;
        }
        Some(ExpenseRecord::new(
            field(row, columns.registry_id).unwrap_or_default(),
            field(row, columns.counterparty).unwrap_or_default(),
            parse_amount(field(row, columns.amount)),
            account_code,
        ))
    }
}

/// `;` if the first non-empty line has one, else `,` if it has one, else `;`.
pub fn sniff_delimiter<R: BufRead>(mut reader: R) -> Result<u8> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(b';');
        }
        let text = decode_latin1(&line);
        if text.trim().is_empty() {
            continue;
        }
        if text.contains(';') {
            return Ok(b';');
        }
        if text.contains(',') {
            return Ok(b',');
        }
        return Ok(b';');
    }
}

/// Localized amount ("1.234,56") to a decimal. Missing or unparsable values are zero.
pub fn parse_amount(raw: Option<&str>) -> Decimal {
    let Some(raw) = raw else {
        return Decimal::ZERO;
    };
    let cleaned = raw.trim().replace('.', "").replace(',', ".");
    Decimal::from_str(&cleaned).unwrap_or(Decimal::ZERO)
}

/// Year and quarter from tokens in the file name ("1T2024.csv" → (2024, 1)); 0 when absent.
pub fn period_from_file_name(file_name: &str, year_tokens: &[i32]) -> (i32, u8) {
    let upper = file_name.to_uppercase();
    let year = year_tokens
        .iter()
        .copied()
        .find(|y| upper.contains(&y.to_string()))
        .unwrap_or(0);
    let quarter = FILE_QUARTER_TOKENS
        .iter()
        .find(|(_, token)| upper.contains(token))
        .map(|(q, _)| *q)
        .unwrap_or(0);
    (year, quarter)
}
