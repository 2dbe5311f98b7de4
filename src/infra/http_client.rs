use crate::app::ports::HttpClientPort;
use crate::config::HttpConfig;
use crate::error::{PipelineError, Result};
use crate::infra::retry::{Deadline, RetryPolicy};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// reqwest-backed client: per-request timeout, per-chunk read timeout, bounded retry,
/// and an optional run-wide deadline.
pub struct ReqwestHttp {
    client: reqwest::Client,
    retry: RetryPolicy,
    read_timeout: Duration,
    deadline: Option<Deadline>,
}

impl ReqwestHttp {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .user_agent(concat!("disclosure_scraper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            retry: RetryPolicy::new(config.retries, Duration::from_millis(config.backoff_base_ms)),
            read_timeout: config.read_timeout().max(config.timeout()),
            deadline: config.run_deadline().map(Deadline::after),
        })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        let resp = tokio::time::timeout(self.read_timeout, self.client.get(url).send())
            .await
            .map_err(|_| PipelineError::Timeout { url: url.to_string() })??;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }

    async fn fetch_text_once(&self, url: &str) -> Result<String> {
        let resp = self.send(url).await?;
        let text = tokio::time::timeout(self.read_timeout, resp.text())
            .await
            .map_err(|_| PipelineError::Timeout { url: url.to_string() })??;
        Ok(text)
    }

    /// Stream the body into `<dest>.part` and rename on completion, so a failed attempt
    /// never leaves a truncated file under the final name.
    async fn download_once(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut resp = self.send(url).await?;
        let partial = partial_path(dest);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written: u64 = 0;
        loop {
            let chunk = tokio::time::timeout(self.read_timeout, resp.chunk())
                .await
                .map_err(|_| PipelineError::Timeout { url: url.to_string() })??;
            match chunk {
                Some(bytes) => {
                    file.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                }
                None => break,
            }
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, dest).await?;
        debug!(url, bytes = written, "Download complete");
        Ok(written)
    }

    async fn within_deadline<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match &self.deadline {
            // Nothing new is started once the run budget is spent
            Some(deadline) if deadline.is_expired() => Err(PipelineError::Cancelled),
            Some(deadline) => deadline.guard(fut).await,
            None => fut.await,
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get_text(&self, url: &str) -> Result<String> {
        self.within_deadline(self.retry.run(url, || self.fetch_text_once(url)))
            .await
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64> {
        self.within_deadline(self.retry.run(url, || self.download_once(url, dest)))
            .await
    }
}
