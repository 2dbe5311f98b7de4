use crate::constants;
use crate::error::{PipelineError, Result};
use chrono::Datelike;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub catalog_url: String,
    pub period_count: usize,
    pub expense_category_prefix: String,
    pub staging_dir: PathBuf,
    pub extract_dir: PathBuf,
    pub output_path: PathBuf,
    pub log_dir: PathBuf,
    pub category_keywords: Vec<String>,
    /// Years recognised in extracted file names, tried in order
    pub year_tokens: Vec<i32>,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    /// Upper bound on waiting for any single chunk of a streamed body
    pub read_timeout_secs: u64,
    pub retries: u32,
    pub backoff_base_ms: u64,
    pub max_concurrency: usize,
    /// Whole-run budget for network work; 0 disables it
    pub run_deadline_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_BASE_URL.to_string(),
            catalog_url: constants::DEFAULT_CATALOG_URL.to_string(),
            period_count: constants::DEFAULT_PERIOD_COUNT,
            expense_category_prefix: constants::DEFAULT_EXPENSE_PREFIX.to_string(),
            staging_dir: PathBuf::from(constants::DEFAULT_STAGING_DIR),
            extract_dir: PathBuf::from(constants::DEFAULT_EXTRACT_DIR),
            output_path: PathBuf::from(constants::DEFAULT_OUTPUT_PATH),
            log_dir: PathBuf::from("logs"),
            category_keywords: constants::CATEGORY_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            year_tokens: default_year_tokens(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            read_timeout_secs: 60,
            retries: 3,
            backoff_base_ms: 500,
            max_concurrency: 4,
            run_deadline_secs: 3600,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        (self.run_deadline_secs > 0).then(|| Duration::from_secs(self.run_deadline_secs))
    }
}

/// Current year down to the earliest year the regulator publishes.
fn default_year_tokens() -> Vec<i32> {
    let current = chrono::Utc::now().year();
    (constants::EARLIEST_YEAR_TOKEN..=current).rev().collect()
}

impl Config {
    /// Load `path` if it exists, otherwise start from defaults. Environment overrides
    /// (after `.env`) are applied last. Not validated: callers apply their own overrides
    /// and then call `validate`.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
            })?;
            toml::from_str::<Config>(&content)?
        } else {
            Config::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("DISCLOSURE_BASE_URL") {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
        if let Ok(count) = std::env::var("DISCLOSURE_PERIOD_COUNT") {
            self.period_count = count.trim().parse().map_err(|_| {
                PipelineError::Config(format!("DISCLOSURE_PERIOD_COUNT is not a number: {count}"))
            })?;
        }
        if let Ok(path) = std::env::var("DISCLOSURE_OUTPUT_PATH") {
            if !path.trim().is_empty() {
                self.output_path = PathBuf::from(path.trim());
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_count == 0 {
            return Err(PipelineError::Config("period_count must be at least 1".into()));
        }
        if self.expense_category_prefix.is_empty()
            || !self.expense_category_prefix.chars().all(|c| c.is_ascii_digit())
        {
            return Err(PipelineError::Config(format!(
                "expense_category_prefix must be digits, got '{}'",
                self.expense_category_prefix
            )));
        }
        if self.category_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(PipelineError::Config("category_keywords must not be empty".into()));
        }
        if self.http.max_concurrency == 0 {
            return Err(PipelineError::Config("http.max_concurrency must be at least 1".into()));
        }
        Ok(())
    }
}
