use crate::config::CrawlConfig;
use crate::domain::notice::Notice;
use crate::services::source::{NoticeSource, SourceError};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

/// Fetches and extracts rows from the National Assembly legislative-notice
/// index. Rows the markup does not yield cleanly are skipped rather than
/// failing the whole crawl.
#[derive(Debug, Clone)]
pub struct AssemblyNoticeCrawler {
    http: reqwest::Client,
    index_url: String,
    retries: usize,
}

impl AssemblyNoticeCrawler {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &CrawlConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, index_url: config.url.clone(), retries: config.retries })
    }

    fn parse_index(&self, html: &str) -> Result<Vec<Notice>, SourceError> {
        let row_selector = Selector::parse("table tbody tr").map_err(|e| SourceError::Parse(e.to_string()))?;
        let cell_selector = Selector::parse("td").map_err(|e| SourceError::Parse(e.to_string()))?;
        let anchor_selector = Selector::parse("a").map_err(|e| SourceError::Parse(e.to_string()))?;
        let base = Url::parse(&self.index_url).ok();

        let document = Html::parse_document(html);
        let mut notices = Vec::new();
        for row in document.select(&row_selector) {
            let cells: Vec<_> = row.select(&cell_selector).collect();
            if cells.len() < 4 {
                continue;
            }
            let Ok(num) = cell_text(&cells[0]).parse::<i64>() else {
                continue;
            };

            let subject_cell = &cells[1];
            let subject = cell_text(subject_cell);
            let link = subject_cell
                .select(&anchor_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| resolve_link(base.as_ref(), href))
                .unwrap_or_default();

            notices.push(Notice {
                num,
                subject,
                proposer_category: cell_text(&cells[2]),
                committee: cell_text(&cells[3]),
                link,
            });
        }
        Ok(notices)
    }
}

fn cell_text(cell: &scraper::ElementRef<'_>) -> String {
    cell.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve_link(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok()).map_or_else(|| href.to_string(), |u| u.to_string())
}

#[async_trait]
impl NoticeSource for AssemblyNoticeCrawler {
    async fn fetch_latest(&self) -> Result<Vec<Notice>, SourceError> {
        let retry_strategy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(8))
            .with_max_times(self.retries);

        let body = (|| async {
            let response = self.http.get(&self.index_url).send().await?.error_for_status()?;
            response.text().await
        })
        .retry(&retry_strategy)
        .when(|e| {
            tracing::warn!(error = %e, "Crawl request failed, retrying...");
            true
        })
        .await?;

        self.parse_index(&body)
    }
}
