use crate::domain::notice::Notice;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream index markup not understood: {0}")]
    Parse(String),
}

/// Produces the current page of notice rows, newest first. Failures are
/// recoverable; the crawl scheduler skips the tick and tries again later.
#[async_trait]
pub trait NoticeSource: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Returns `SourceError` on network failure or unparseable markup.
    async fn fetch_latest(&self) -> Result<Vec<Notice>, SourceError>;
}
