use crate::constants::{OUTPUT_DELIMITER, OUTPUT_HEADER};
use crate::error::Result;
use crate::types::{ExpenseRecord, OperatorRecord};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Destination for the enriched dataset.
///
/// The flat-file writer below is the only implementation shipped here; a relational
/// store plugs in through the same trait.
pub trait RecordSink: Send {
    fn write_expenses(&mut self, records: &[ExpenseRecord]) -> Result<usize>;

    fn write_operators(&mut self, _operators: &[OperatorRecord]) -> Result<usize> {
        Ok(0)
    }
}

/// Semicolon-delimited consolidated file: Identifier;CounterpartyName;Quarter;Year;Amount
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for CsvFileSink {
    fn write_expenses(&mut self, records: &[ExpenseRecord]) -> Result<usize> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::WriterBuilder::new()
            .delimiter(OUTPUT_DELIMITER)
            .from_path(&self.path)?;
        writer.write_record(OUTPUT_HEADER)?;
        for record in records {
            let quarter = record.quarter.to_string();
            let year = record.year.to_string();
            let amount = record.amount.to_string();
            writer.write_record([
                record.registry_id.as_str(),
                record.counterparty_name.as_str(),
                quarter.as_str(),
                year.as_str(),
                amount.as_str(),
            ])?;
        }
        writer.flush()?;
        info!("Wrote {} records to {}", records.len(), self.path.display());
        Ok(records.len())
    }
}

/// Keeps everything in memory; used by tests and by callers that post-process.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub expenses: Vec<ExpenseRecord>,
    pub operators: Vec<OperatorRecord>,
}

impl RecordSink for MemorySink {
    fn write_expenses(&mut self, records: &[ExpenseRecord]) -> Result<usize> {
        self.expenses.extend_from_slice(records);
        Ok(records.len())
    }

    fn write_operators(&mut self, operators: &[OperatorRecord]) -> Result<usize> {
        self.operators.extend_from_slice(operators);
        Ok(operators.len())
    }
}
