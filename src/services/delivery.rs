use crate::domain::delivery::ErrorCategory;
use crate::domain::notice::NoticeEmbed;
use async_trait::async_trait;

/// A failed delivery attempt, already classified.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct DeliveryError {
    pub category: ErrorCategory,
    pub message: String,
}

impl DeliveryError {
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { category, message: message.into() }
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        self.category.is_permanent()
    }
}

/// Pushes one embed to one endpoint URL. Implementations classify failures
/// into `ErrorCategory`; retry policy lives with the callers.
#[async_trait]
pub trait WebhookSender: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Returns a classified `DeliveryError` when the endpoint rejects the
    /// payload or cannot be reached.
    async fn send(&self, url: &str, embed: &NoticeEmbed) -> Result<(), DeliveryError>;

    /// Live delivery test used during registration.
    ///
    /// # Errors
    /// Same classification as `send`.
    async fn test_delivery(&self, url: &str) -> Result<(), DeliveryError> {
        self.send(url, &NoticeEmbed::welcome()).await
    }
}
