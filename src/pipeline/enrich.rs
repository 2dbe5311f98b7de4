use crate::constants::{DIAGNOSTIC_SAMPLE_LIMIT, OPERATOR_NOT_FOUND};
use crate::types::{ExpenseRecord, ReferenceCatalog};
use serde::Serialize;
use tracing::{info, warn};

/// Result of joining expense rows against the operator catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub matched: u64,
    pub unmatched: u64,
    /// A few registry ids that had no catalog entry
    pub unmatched_samples: Vec<String>,
}

/// Annotate `records` in place from `catalog`.
///
/// On a hit the counterparty name becomes the operator's legal name and the registry id
/// slot is overwritten with the tax id, which is what the flat-file output publishes as
/// its identifier. The tax id is also stored in `resolved_id` so consumers need not rely
/// on the overloaded slot. On a miss the name becomes the not-found sentinel and the
/// registry id is left alone. Misses are reported once, in aggregate.
pub fn enrich(records: &mut [ExpenseRecord], catalog: &ReferenceCatalog) -> EnrichmentReport {
    let mut report = EnrichmentReport::default();

    for record in records.iter_mut() {
        match catalog.get(&record.registry_id) {
            Some(operator) => {
                record.counterparty_name = operator.legal_name.clone();
                record.registry_id = operator.tax_id.clone();
                record.resolved_id = Some(operator.tax_id.clone());
                record.tax_id = Some(operator.tax_id.clone());
                record.category = Some(operator.category.clone()).filter(|c| !c.is_empty());
                record.region = Some(operator.region.clone()).filter(|r| !r.is_empty());
                report.matched += 1;
            }
            None => {
                if report.unmatched_samples.len() < DIAGNOSTIC_SAMPLE_LIMIT {
                    report.unmatched_samples.push(record.registry_id.clone());
                }
                record.counterparty_name = OPERATOR_NOT_FOUND.to_string();
                report.unmatched += 1;
            }
        }
    }

    if report.unmatched > 0 {
        warn!(
            unmatched = report.unmatched,
            samples = ?report.unmatched_samples,
            "{} expense records had no match in the operator catalog",
            report.unmatched
        );
    }
    info!("Enrichment joined {} of {} records", report.matched, records.len());
    crate::metrics::enrich::joined(report.matched, report.unmatched);
    report
}
