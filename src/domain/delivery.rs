use serde::Serialize;

/// Discord error code for a webhook that no longer exists.
const PROVIDER_CODE_UNKNOWN_WEBHOOK: i64 = 10015;

/// Closed classification of delivery failures. Permanent categories mark the
/// endpoint structurally invalid and drive immediate deactivation; everything
/// else is transient and retryable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    NotFound,
    Unauthorized,
    Forbidden,
    RateLimited,
    NetworkError,
    InvalidWebhook,
    UnknownError,
}

impl ErrorCategory {
    /// Classifies an HTTP response, honoring the provider error code when the
    /// body carried one. Priority: unknown-webhook, then the specific status
    /// rows, then the 4xx catch-all.
    #[must_use]
    pub fn from_status(status: u16, provider_code: Option<i64>) -> Self {
        if status == 404 || provider_code == Some(PROVIDER_CODE_UNKNOWN_WEBHOOK) {
            return Self::NotFound;
        }
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            429 => Self::RateLimited,
            400..=499 => Self::InvalidWebhook,
            _ => Self::UnknownError,
        }
    }

    /// Permanent failures deactivate the endpoint and are never retried.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(self, Self::NotFound | Self::Unauthorized | Self::Forbidden | Self::InvalidWebhook)
    }

    /// Human-readable reason reported back to the registering user.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::NotFound => "the webhook does not exist (it may have been deleted)",
            Self::Unauthorized | Self::Forbidden => "the webhook token was rejected",
            Self::RateLimited => "the endpoint is rate limited right now",
            Self::NetworkError => "the endpoint could not be reached",
            Self::InvalidWebhook => "the URL is not a valid webhook",
            Self::UnknownError => "delivery failed for an unknown reason",
        }
    }
}

/// Outcome of one delivery attempt to one endpoint within a notice batch.
#[derive(Clone, Debug)]
pub struct DeliveryResult {
    pub endpoint_id: i64,
    pub success: bool,
    pub error: Option<String>,
    pub category: Option<ErrorCategory>,
    pub should_delete: bool,
}

impl DeliveryResult {
    #[must_use]
    pub const fn ok(endpoint_id: i64) -> Self {
        Self { endpoint_id, success: true, error: None, category: None, should_delete: false }
    }

    #[must_use]
    pub fn failed(endpoint_id: i64, category: ErrorCategory, message: String) -> Self {
        Self {
            endpoint_id,
            success: false,
            error: Some(message),
            category: Some(category),
            should_delete: category.is_permanent(),
        }
    }
}
