use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;

/// One quarter/year for which the regulator publishes a disclosure bundle.
///
/// Ordering is most-recent-first: sorting a `Vec<ReportingPeriod>` ascending puts the
/// latest year first and, within a year, the latest quarter first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub year: i32,
    pub quarter: u8,
    pub source_url: String,
}

impl ReportingPeriod {
    pub fn new(year: i32, quarter: u8, source_url: impl Into<String>) -> Self {
        Self {
            year,
            quarter,
            source_url: source_url.into(),
        }
    }

    pub fn label(&self) -> String {
        format!("{}/{}T", self.year, self.quarter)
    }
}

impl Ord for ReportingPeriod {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .year
            .cmp(&self.year)
            .then_with(|| other.quarter.cmp(&self.quarter))
            .then_with(|| self.source_url.cmp(&other.source_url))
    }
}

impl PartialOrd for ReportingPeriod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One parsed row: a single expense-category charge for one operator in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    /// Join key against the catalog. After enrichment of a matched row this holds the
    /// operator's tax id, which is what the flat-file output expects in its first column.
    pub registry_id: String,
    pub counterparty_name: String,
    pub amount: Decimal,
    pub year: i32,
    pub quarter: u8,
    pub account_code: String,
    pub tax_id: Option<String>,
    pub category: Option<String>,
    pub region: Option<String>,
    /// Identifier resolved by enrichment; `None` until a catalog hit.
    pub resolved_id: Option<String>,
}

impl ExpenseRecord {
    pub fn new(
        registry_id: impl Into<String>,
        counterparty_name: impl Into<String>,
        amount: Decimal,
        account_code: impl Into<String>,
    ) -> Self {
        Self {
            registry_id: registry_id.into(),
            counterparty_name: counterparty_name.into(),
            amount,
            year: 0,
            quarter: 0,
            account_code: account_code.into(),
            tax_id: None,
            category: None,
            region: None,
            resolved_id: None,
        }
    }
}

/// A registered operator from the reference catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorRecord {
    pub registry_id: String,
    pub tax_id: String,
    pub legal_name: String,
    pub category: String,
    pub region: String,
}

/// Strip everything but ASCII digits. Catalog keys and lookups both go through this.
pub fn normalize_registry_id(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Accumulates operators while the catalog file is being read.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    operators: HashMap<String, OperatorRecord>,
    duplicate_keys: u64,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an operator under its normalized registry id. Returns `false` (and stores
    /// nothing) when the id has no digits. A repeated id replaces the earlier entry.
    pub fn insert(&mut self, mut operator: OperatorRecord) -> bool {
        let key = normalize_registry_id(&operator.registry_id);
        if key.is_empty() {
            return false;
        }
        operator.registry_id = key.clone();
        if self.operators.insert(key, operator).is_some() {
            self.duplicate_keys += 1;
        }
        true
    }

    pub fn freeze(self) -> ReferenceCatalog {
        ReferenceCatalog {
            operators: self.operators,
            duplicate_keys: self.duplicate_keys,
        }
    }
}

/// Immutable registry id → operator mapping. Only obtainable from `CatalogBuilder::freeze`,
/// so anything holding one is looking at a fully built catalog.
#[derive(Debug, Default, Clone)]
pub struct ReferenceCatalog {
    operators: HashMap<String, OperatorRecord>,
    duplicate_keys: u64,
}

impl ReferenceCatalog {
    pub fn get(&self, registry_id: &str) -> Option<&OperatorRecord> {
        self.operators.get(&normalize_registry_id(registry_id))
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn duplicate_keys(&self) -> u64 {
        self.duplicate_keys
    }

    pub fn operators(&self) -> impl Iterator<Item = &OperatorRecord> {
        self.operators.values()
    }
}

/// A tabular file pulled out of a period's archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedFile {
    pub path: PathBuf,
    pub period: ReportingPeriod,
}
