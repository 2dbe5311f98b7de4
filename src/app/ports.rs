use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Network boundary for every stage that talks to the regulator's file server.
///
/// Implementations own timeouts and retries; callers only decide whether a final
/// error is fatal or skippable.
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// GET a page (directory listing) and return its body decoded as text.
    async fn get_text(&self, url: &str) -> Result<String>;

    /// GET a resource and stream it into `dest`, returning the number of bytes written.
    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64>;
}
