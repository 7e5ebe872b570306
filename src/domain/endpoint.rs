use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use url::Url;

/// Longest URL accepted at registration time.
pub const MAX_WEBHOOK_URL_LEN: usize = 500;

static DISCORD_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:ptb\.|canary\.)?discord(?:app)?\.com$").expect("valid host pattern"));
static SNOWFLAKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{17,20}$").expect("valid id pattern"));
static WEBHOOK_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{64,68}$").expect("valid token pattern"));

/// A subscriber endpoint row. `is_active = false` means soft-deleted and
/// eligible for physical deletion by the cleanup worker.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct Endpoint {
    pub id: i64,
    pub url: String,
    pub is_active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate endpoint counts produced by a single repository query.
#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    /// Inactive for more than 30 days.
    pub old_inactive: i64,
    /// Deactivated within the last 7 days.
    pub recent_inactive: i64,
}

impl EndpointStats {
    /// Active ratio as a percentage; an empty table counts as fully efficient.
    #[must_use]
    pub fn efficiency(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.active as f64 / self.total as f64;
        ratio * 100.0
    }

    #[must_use]
    pub fn grade(&self) -> &'static str {
        match self.efficiency() {
            e if e >= 90.0 => "excellent",
            e if e >= 80.0 => "good",
            e if e >= 60.0 => "fair",
            e if e >= 40.0 => "poor",
            _ => "critical",
        }
    }
}

/// Normalizes a webhook URL to the form stored for uniqueness: scheme + host
/// + path, query and fragment dropped, a single trailing slash stripped when
/// the path is more than "/". Unparseable input is returned unchanged and the
/// repository falls back to textual uniqueness.
#[must_use]
pub fn canonicalize_url(input: &str) -> String {
    let Ok(mut url) = Url::parse(input) else {
        return input.to_string();
    };
    url.set_query(None);
    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(&path[..path.len() - 1]);
    }

    url.to_string()
}

/// Why a candidate URL was rejected before any network traffic happened.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WebhookUrlError {
    #[error("webhook URL is too long (max {MAX_WEBHOOK_URL_LEN} characters)")]
    TooLong,
    #[error("webhook URL could not be parsed")]
    Malformed,
    #[error("webhook URL must use https")]
    NotHttps,
    #[error("webhook URL must point at a Discord-compatible host")]
    UnknownHost,
    #[error("webhook URL path does not look like /api/webhooks/<id>/<token>")]
    BadPath,
    #[error("webhook id must be a 17-20 digit snowflake")]
    BadSnowflake,
    #[error("webhook token must be 64-68 URL-safe characters")]
    BadToken,
}

/// Structural validation of a Discord-compatible webhook URL. Network-level
/// validity is established separately by the live test delivery.
pub fn validate_webhook_url(input: &str) -> Result<(), WebhookUrlError> {
    if input.len() > MAX_WEBHOOK_URL_LEN {
        return Err(WebhookUrlError::TooLong);
    }
    let url = Url::parse(input).map_err(|_| WebhookUrlError::Malformed)?;
    if url.scheme() != "https" {
        return Err(WebhookUrlError::NotHttps);
    }
    let host = url.host_str().ok_or(WebhookUrlError::UnknownHost)?;
    if !DISCORD_HOST.is_match(host) {
        return Err(WebhookUrlError::UnknownHost);
    }

    // "/api/webhooks/<id>/<token>" splits into 5 parts counting the leading
    // empty segment.
    let segments: Vec<&str> = url.path().split('/').collect();
    if segments.len() < 5 || segments[1] != "api" || segments[2] != "webhooks" {
        return Err(WebhookUrlError::BadPath);
    }
    if !SNOWFLAKE.is_match(segments[3]) {
        return Err(WebhookUrlError::BadSnowflake);
    }
    if !WEBHOOK_TOKEN.is_match(segments[4]) {
        return Err(WebhookUrlError::BadToken);
    }
    Ok(())
}
