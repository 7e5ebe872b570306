use crate::adapters::database::DbPool;
use crate::adapters::database::endpoint_repo::EndpointRepository;
use crate::domain::delivery::ErrorCategory;
use crate::domain::endpoint::{Endpoint, EndpointStats, canonicalize_url, validate_webhook_url};
use crate::error::{AppError, Result};
use crate::services::delivery::WebhookSender;
use crate::services::verifier::TokenVerifier;
use serde::Serialize;
use std::sync::Arc;

/// Threshold below which the overall system health flips to
/// `needs_optimization`.
const HEALTHY_EFFICIENCY: f64 = 70.0;

/// Outcome of the live delivery test performed at registration.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDeliveryReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
}

#[derive(Clone, Debug)]
pub struct RegistrationOutcome {
    pub endpoint: Endpoint,
    pub reactivated: bool,
    pub test_result: TestDeliveryReport,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub efficiency: f64,
    pub grade: &'static str,
    pub status: &'static str,
    pub stats: EndpointStats,
}

/// Subscriber lifecycle around the endpoint table: registration with shape
/// validation, the human-verification oracle, the live delivery test, and the
/// aggregate stats surfaced by the API.
#[derive(Clone)]
pub struct WebhookService {
    pool: DbPool,
    repo: EndpointRepository,
    verifier: Arc<dyn TokenVerifier>,
    sender: Arc<dyn WebhookSender>,
    max_active: i64,
}

impl std::fmt::Debug for WebhookService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookService").field("max_active", &self.max_active).finish_non_exhaustive()
    }
}

impl WebhookService {
    #[must_use]
    pub fn new(
        pool: DbPool,
        repo: EndpointRepository,
        verifier: Arc<dyn TokenVerifier>,
        sender: Arc<dyn WebhookSender>,
        max_active: i64,
    ) -> Self {
        Self { pool, repo, verifier, sender, max_active }
    }

    /// Registers (or revives) a webhook URL after shape validation, the
    /// verification oracle, the duplicate/quota checks, and a live test
    /// delivery. A transient test failure still registers the endpoint; a
    /// permanent one rejects it with the specific category.
    ///
    /// # Errors
    /// Returns the taxonomy errors described above, or a database error.
    #[tracing::instrument(skip_all, err)]
    pub async fn register(&self, raw_url: &str, token: &str) -> Result<RegistrationOutcome> {
        validate_webhook_url(raw_url).map_err(|e| AppError::Validation(e.to_string()))?;
        if token.trim().is_empty() {
            return Err(AppError::Validation("verification token is required".to_string()));
        }

        let verified = self
            .verifier
            .verify(token)
            .await
            .map_err(|e| AppError::Verification(format!("verification service unavailable: {e}")))?;
        if !verified {
            return Err(AppError::Verification("human verification failed".to_string()));
        }

        let canonical = canonicalize_url(raw_url);
        let existing = {
            let mut conn = self.pool.acquire().await?;
            let existing = self.repo.find_by_url(&mut conn, &canonical).await?;
            if let Some(ref endpoint) = existing
                && endpoint.is_active
            {
                return Err(AppError::Conflict("this webhook is already registered".to_string()));
            }
            let stats = self.repo.stats(&mut conn).await?;
            if stats.active >= self.max_active {
                return Err(AppError::Quota);
            }
            existing
        };

        let test_result = match self.sender.test_delivery(&canonical).await {
            Ok(()) => TestDeliveryReport { success: true, error_category: None },
            Err(e) if e.is_permanent() => return Err(AppError::DeliveryTest { category: e.category }),
            Err(e) => {
                tracing::warn!(category = ?e.category, "Test delivery failed transiently, registering anyway");
                TestDeliveryReport { success: false, error_category: Some(e.category) }
            }
        };

        let mut conn = self.pool.acquire().await?;
        let endpoint = self.repo.create_or_reactivate(&mut conn, &canonical).await?;
        tracing::info!(endpoint = endpoint.id, reactivated = existing.is_some(), "Webhook registered");
        Ok(RegistrationOutcome { endpoint, reactivated: existing.is_some(), test_result })
    }

    /// # Errors
    /// Returns a database error if the aggregate query fails.
    pub async fn stats(&self) -> Result<EndpointStats> {
        let mut conn = self.pool.acquire().await?;
        self.repo.stats(&mut conn).await
    }

    /// # Errors
    /// Returns a database error if the aggregate query fails.
    pub async fn system_health(&self) -> Result<SystemHealth> {
        let stats = self.stats().await?;
        let efficiency = stats.efficiency();
        Ok(SystemHealth {
            efficiency,
            grade: stats.grade(),
            status: if efficiency >= HEALTHY_EFFICIENCY { "healthy" } else { "needs_optimization" },
            stats,
        })
    }
}
