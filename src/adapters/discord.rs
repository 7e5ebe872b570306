use crate::domain::delivery::ErrorCategory;
use crate::domain::notice::NoticeEmbed;
use crate::services::delivery::{DeliveryError, WebhookSender};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Display name attached to every outgoing message.
const SENDER_USERNAME: &str = "국회 입법예고 알림";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    username: &'static str,
    embeds: [&'a NoticeEmbed; 1],
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    code: Option<i64>,
}

/// Outbound client for Discord-compatible webhook endpoints.
#[derive(Debug, Clone)]
pub struct DiscordWebhookClient {
    http: reqwest::Client,
}

impl DiscordWebhookClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http })
    }
}

fn classify_transport(error: &reqwest::Error) -> ErrorCategory {
    if error.is_timeout() || error.is_connect() {
        ErrorCategory::NetworkError
    } else {
        ErrorCategory::UnknownError
    }
}

#[async_trait]
impl WebhookSender for DiscordWebhookClient {
    async fn send(&self, url: &str, embed: &NoticeEmbed) -> Result<(), DeliveryError> {
        if Url::parse(url).is_err() {
            return Err(DeliveryError::new(ErrorCategory::InvalidWebhook, "malformed webhook URL"));
        }

        let payload = WebhookPayload { username: SENDER_USERNAME, embeds: [embed] };
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::new(classify_transport(&e), e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // Discord reports structural problems (e.g. unknown webhook, 10015)
        // through a JSON error code alongside the status.
        let provider_code = response.json::<ProviderError>().await.ok().and_then(|e| e.code);
        let category = ErrorCategory::from_status(status.as_u16(), provider_code);
        Err(DeliveryError::new(category, format!("endpoint returned {status}")))
    }
}
