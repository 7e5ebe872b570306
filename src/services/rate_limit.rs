use crate::adapters::cache::CacheStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Successful sends allowed across all endpoints per second.
pub const GLOBAL_PER_SECOND: u32 = 30;
/// Successful sends allowed per endpoint per minute.
pub const PER_WEBHOOK_PER_MINUTE: u32 = 60;

const KEY_GLOBAL: &str = "rate_limit:global";

fn webhook_key(endpoint_id: i64) -> String {
    format!("rate_limit:webhook:{endpoint_id}")
}

/// Paces outbound deliveries. Last-send timestamps live in the shared cache
/// so pacing carries across requests and restarts; when the cache is down the
/// limiter degrades to best-effort instead of failing the dispatch.
#[derive(Clone, Debug)]
pub struct DispatchRateLimiter {
    store: Arc<dyn CacheStore>,
}

impl DispatchRateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    fn global_interval_ms() -> f64 {
        1000.0 / f64::from(GLOBAL_PER_SECOND)
    }

    fn endpoint_interval_ms() -> f64 {
        60_000.0 / f64::from(PER_WEBHOOK_PER_MINUTE)
    }

    /// How long a send to `endpoint` must still wait, given the recorded
    /// last-send instants. Zero when both intervals have already elapsed.
    #[must_use]
    pub fn required_wait(now_ms: i64, global_last_ms: i64, endpoint_last_ms: i64) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let elapsed_global = (now_ms - global_last_ms) as f64;
        #[allow(clippy::cast_precision_loss)]
        let elapsed_endpoint = (now_ms - endpoint_last_ms) as f64;
        let wait = (Self::global_interval_ms() - elapsed_global).max(Self::endpoint_interval_ms() - elapsed_endpoint);
        if wait <= 0.0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wait_ms = wait.ceil() as u64;
        Duration::from_millis(wait_ms)
    }

    /// Sleeps until a send to `endpoint_id` is allowed.
    pub async fn acquire(&self, endpoint_id: i64) {
        let now_ms = Utc::now().timestamp_millis();
        let global_last = self.load(KEY_GLOBAL).await;
        let endpoint_last = self.load(&webhook_key(endpoint_id)).await;
        let wait = Self::required_wait(now_ms, global_last, endpoint_last);
        if !wait.is_zero() {
            tracing::trace!(endpoint = endpoint_id, wait_ms = wait.as_millis() as u64, "Pacing delivery");
            tokio::time::sleep(wait).await;
        }
    }

    /// Stamps both the global and the per-endpoint last-send instants. Called
    /// only after a successful send; failures leave the window untouched.
    pub async fn record(&self, endpoint_id: i64) {
        let now = Utc::now().timestamp_millis().to_string();
        if let Err(e) = self.store.set(KEY_GLOBAL, now.as_bytes()).await {
            tracing::warn!(error = %e, "Failed to record global send instant");
        }
        if let Err(e) = self.store.set(&webhook_key(endpoint_id), now.as_bytes()).await {
            tracing::warn!(error = %e, endpoint = endpoint_id, "Failed to record endpoint send instant");
        }
    }

    async fn load(&self, key: &str) -> i64 {
        match self.store.get(key).await {
            Ok(Some(raw)) => std::str::from_utf8(&raw).ok().and_then(|s| s.parse().ok()).unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(error = %e, key, "Rate-limit state unreadable, treating last send as never");
                0
            }
        }
    }
}
