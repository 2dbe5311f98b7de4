//! Header alias resolution: each logical field declares an ordered list of acceptable
//! header names, resolved once per file into a fixed column index.

use crate::constants::{
    ACCOUNT_CODE_ALIASES, AMOUNT_ALIASES, CATALOG_CATEGORY_ALIASES, CATALOG_LEGAL_NAME_ALIASES,
    CATALOG_REGION_ALIASES, CATALOG_REGISTRY_ID_ALIASES, CATALOG_TAX_ID_ALIASES, COUNTERPARTY_ALIASES,
    REGISTRY_ID_ALIASES,
};

/// Index of the first alias present in `headers`, compared trimmed and case-insensitively.
pub fn resolve_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    aliases.iter().find_map(|alias| {
        let alias = alias.to_lowercase();
        normalized.iter().position(|h| *h == alias)
    })
}

fn normalize_header(header: &str) -> String {
    // A UTF-8 byte order mark read as Latin-1 shows up as "ï»¿"
    header
        .trim_start_matches('\u{feff}')
        .trim_start_matches("ï»¿")
        .trim()
        .trim_matches('"')
        .to_lowercase()
}

/// Trimmed, non-empty value at `index`, if the column exists in this row.
pub fn field(row: &[String], index: Option<usize>) -> Option<&str> {
    let value = row.get(index?)?.trim();
    (!value.is_empty()).then_some(value)
}

/// Column layout of an expense file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpenseColumns {
    pub registry_id: Option<usize>,
    pub counterparty: Option<usize>,
    pub amount: Option<usize>,
    pub account_code: Option<usize>,
}

impl ExpenseColumns {
    pub fn resolve(headers: &[String]) -> Self {
        Self {
            registry_id: resolve_column(headers, REGISTRY_ID_ALIASES),
            counterparty: resolve_column(headers, COUNTERPARTY_ALIASES),
            amount: resolve_column(headers, AMOUNT_ALIASES),
            account_code: resolve_column(headers, ACCOUNT_CODE_ALIASES),
        }
    }
}

/// Column layout of the operator catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CatalogColumns {
    pub registry_id: Option<usize>,
    pub tax_id: Option<usize>,
    pub legal_name: Option<usize>,
    pub category: Option<usize>,
    pub region: Option<usize>,
}

impl CatalogColumns {
    pub fn resolve(headers: &[String]) -> Self {
        Self {
            registry_id: resolve_column(headers, CATALOG_REGISTRY_ID_ALIASES),
            tax_id: resolve_column(headers, CATALOG_TAX_ID_ALIASES),
            legal_name: resolve_column(headers, CATALOG_LEGAL_NAME_ALIASES),
            category: resolve_column(headers, CATALOG_CATEGORY_ALIASES),
            region: resolve_column(headers, CATALOG_REGION_ALIASES),
        }
    }
}

/// Decode ISO-8859-1 bytes; every byte maps to the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Decode a raw csv record field by field.
pub fn decode_record(record: &csv::ByteRecord) -> Vec<String> {
    record.iter().map(|f| decode_latin1(f).trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_alias_wins() {
        let h = headers(&["CD_OPERADORA", "REG_ANS", "VALOR"]);
        assert_eq!(resolve_column(&h, REGISTRY_ID_ALIASES), Some(1));
    }

    #[test]
    fn either_registry_header_resolves() {
        let a = ExpenseColumns::resolve(&headers(&["DATA", "REG_ANS", "CD_CONTA_CONTABIL"]));
        let b = ExpenseColumns::resolve(&headers(&["DATA", "CD_OPERADORA", "CD_CONTA_CONTABIL"]));
        assert_eq!(a.registry_id, Some(1));
        assert_eq!(b.registry_id, Some(1));
        assert_eq!(a.account_code, Some(2));
        assert_eq!(a.amount, None);
    }

    #[test]
    fn matching_ignores_case_quotes_and_bom() {
        let h = headers(&["\u{feff}reg_ans", " \"Vl_Saldo_Final\" "]);
        let columns = ExpenseColumns::resolve(&h);
        assert_eq!(columns.registry_id, Some(0));
        assert_eq!(columns.amount, Some(1));
    }

    #[test]
    fn empty_values_read_as_absent() {
        let row = headers(&["  ", "x"]);
        assert_eq!(field(&row, Some(0)), None);
        assert_eq!(field(&row, Some(1)), Some("x"));
        assert_eq!(field(&row, Some(5)), None);
        assert_eq!(field(&row, None), None);
    }

    #[test]
    fn latin1_round_trips_accents() {
        assert_eq!(decode_latin1(&[0x53, 0xC3, 0x4F]), "SÃO");
    }
}
