use crate::app::ports::HttpClientPort;
use crate::config::Config;
use crate::constants::QUARTER_MARKERS;
use crate::error::{PipelineError, Result};
use crate::scrapers::listing::{parse_anchors, Anchor};
use crate::types::ReportingPeriod;
use futures::stream::{self, StreamExt, TryStreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

static YEAR_FOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").expect("static year regex"));

/// Walks root → category folder → year folders → quarter entries and ranks what it finds.
pub struct PeriodDiscoverer {
    http: Arc<dyn HttpClientPort>,
    base_url: String,
    keywords: Vec<String>,
    max_concurrency: usize,
}

impl PeriodDiscoverer {
    pub fn new(http: Arc<dyn HttpClientPort>, config: &Config) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            keywords: config
                .category_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            max_concurrency: config.http.max_concurrency.max(1),
        }
    }

    /// The `n` most recent periods, most recent first. Any listing failure is fatal.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn discover_top_periods(&self, n: usize) -> Result<Vec<ReportingPeriod>> {
        let root = self.fetch_listing(&self.base_url).await?;
        let category = find_category_folder(&root, &self.keywords).ok_or_else(|| PipelineError::Discovery {
            url: self.base_url.clone(),
            message: format!("no folder matching keywords {:?}", self.keywords),
        })?;
        info!("Financial statements folder: {}", category.url);

        let category_listing = self.fetch_listing(&category.url).await?;
        let years = year_folders(&category_listing);
        debug!("Found {} year folders", years.len());

        // Listing order is preserved so ties in (year, quarter) sort deterministically
        let per_year: Vec<Vec<ReportingPeriod>> = stream::iter(years)
            .map(|(year, url)| async move { self.list_quarters(year, url).await })
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        let all: Vec<ReportingPeriod> = per_year.into_iter().flatten().collect();
        crate::metrics::discovery::periods_found(all.len());
        info!("Discovered {} candidate periods", all.len());

        let selected = select_top_periods(all, n);
        for (i, period) in selected.iter().enumerate() {
            info!("Selected #{}: {} -> {}", i + 1, period.label(), period.source_url);
        }
        Ok(selected)
    }

    async fn list_quarters(&self, year: i32, url: String) -> Result<Vec<ReportingPeriod>> {
        let anchors = self.fetch_listing(&url).await?;
        Ok(quarter_entries(year, &anchors))
    }

    async fn fetch_listing(&self, url: &str) -> Result<Vec<Anchor>> {
        let html = self.http.get_text(url).await.map_err(|e| PipelineError::Discovery {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        crate::metrics::discovery::listing_fetched();
        Ok(parse_anchors(url, &html))
    }
}

/// First anchor whose text+href contains every keyword, case-insensitively.
pub fn find_category_folder<'a>(anchors: &'a [Anchor], keywords: &[String]) -> Option<&'a Anchor> {
    anchors.iter().filter(|a| !a.is_navigation()).find(|a| {
        let haystack = a.haystack();
        keywords.iter().all(|k| haystack.contains(&k.to_lowercase()))
    })
}

/// Entries whose last path segment is a four digit year, deduplicated by URL.
pub fn year_folders(anchors: &[Anchor]) -> Vec<(i32, String)> {
    let mut seen = HashSet::new();
    anchors
        .iter()
        .filter(|a| !a.is_navigation())
        .filter_map(|a| {
            let segment = a.last_segment();
            if !YEAR_FOLDER.is_match(segment) {
                return None;
            }
            let year = segment.parse().ok()?;
            seen.insert(a.url.clone()).then(|| (year, a.url.clone()))
        })
        .collect()
}

/// Entries of one year folder that carry a recognisable quarter marker.
pub fn quarter_entries(year: i32, anchors: &[Anchor]) -> Vec<ReportingPeriod> {
    let mut seen = HashSet::new();
    anchors
        .iter()
        .filter(|a| !a.is_navigation())
        .filter_map(|a| {
            let quarter = infer_quarter(&a.haystack(), year)?;
            seen.insert(a.url.clone())
                .then(|| ReportingPeriod::new(year, quarter, a.url.clone()))
        })
        .collect()
}

/// Match a lower-cased listing entry against the quarter marker table. The folder's own
/// year is removed first so that e.g. "2010" cannot read as marker "01".
pub fn infer_quarter(haystack: &str, year: i32) -> Option<u8> {
    let cleaned = haystack.replace(&year.to_string(), " ");
    QUARTER_MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| cleaned.contains(m)))
        .map(|(quarter, _)| *quarter)
}

/// Stable sort most-recent-first, then keep at most `n`.
pub fn select_top_periods(mut periods: Vec<ReportingPeriod>, n: usize) -> Vec<ReportingPeriod> {
    periods.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| b.quarter.cmp(&a.quarter)));
    periods.truncate(n);
    periods
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(text: &str, href: &str) -> Anchor {
        Anchor {
            text: text.to_string(),
            href: href.to_string(),
            url: format!("https://host/{href}"),
        }
    }

    #[test]
    fn category_folder_needs_both_keywords() {
        let keywords = vec!["demonstraco".to_string(), "contabeis".to_string()];
        let anchors = vec![
            anchor("demonstracoes_financeiras/", "demonstracoes_financeiras/"),
            anchor("Demonstracoes_Contabeis/", "Demonstracoes_Contabeis/"),
        ];
        let found = find_category_folder(&anchors, &keywords).unwrap();
        assert_eq!(found.href, "Demonstracoes_Contabeis/");
        assert!(find_category_folder(&anchors[..1], &keywords).is_none());
    }

    #[test]
    fn only_four_digit_segments_are_years() {
        let anchors = vec![
            anchor("2023/", "2023/"),
            anchor("", "2023/"),
            anchor("20240/", "20240/"),
            anchor("Leiaute/", "Leiaute/"),
            anchor("2024", "2024/"),
        ];
        let years: Vec<i32> = year_folders(&anchors).into_iter().map(|(y, _)| y).collect();
        assert_eq!(years, vec![2023, 2024]);
    }

    #[test]
    fn quarter_markers_in_text_or_href() {
        assert_eq!(infer_quarter("1t2024.zip 1t2024.zip", 2024), Some(1));
        assert_eq!(infer_quarter("2º trimestre folder/", 2024), Some(2));
        assert_eq!(infer_quarter("x 202403/", 2024), Some(3));
        assert_eq!(infer_quarter("4t2023.zip", 2023), Some(4));
        assert_eq!(infer_quarter("leiaute.pdf", 2024), None);
    }

    #[test]
    fn year_digits_do_not_masquerade_as_markers() {
        assert_eq!(infer_quarter("2010/ readme.txt", 2010), None);
        assert_eq!(infer_quarter("3t2010.zip", 2010), Some(3));
    }

    #[test]
    fn unmatched_entries_are_ignored() {
        let anchors = vec![
            anchor("1T2024.zip", "1T2024.zip"),
            anchor("notas.txt", "notas.txt"),
            anchor("Parent Directory", "../"),
            anchor("3T2024.zip", "3T2024.zip"),
        ];
        let periods = quarter_entries(2024, &anchors);
        let quarters: Vec<u8> = periods.iter().map(|p| p.quarter).collect();
        assert_eq!(quarters, vec![1, 3]);
    }

    #[test]
    fn selection_is_strictly_descending_and_bounded() {
        let periods = vec![
            ReportingPeriod::new(2023, 4, "a"),
            ReportingPeriod::new(2024, 1, "b"),
            ReportingPeriod::new(2024, 2, "c"),
            ReportingPeriod::new(2022, 3, "d"),
        ];
        let top = select_top_periods(periods.clone(), 3);
        let order: Vec<(i32, u8)> = top.iter().map(|p| (p.year, p.quarter)).collect();
        assert_eq!(order, vec![(2024, 2), (2024, 1), (2023, 4)]);
        assert_eq!(select_top_periods(periods, 10).len(), 4);
    }
}
