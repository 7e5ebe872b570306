use crate::adapters::database::DbPool;
use crate::adapters::database::endpoint_repo::EndpointRepository;
use crate::domain::delivery::{DeliveryResult, ErrorCategory};
use crate::domain::endpoint::Endpoint;
use crate::domain::notice::{Notice, NoticeEmbed};
use crate::error::Result;
use crate::services::batch::{BatchExecutor, BatchReport, JobOutcome};
use crate::services::delivery::WebhookSender;
use crate::services::rate_limit::DispatchRateLimiter;
use crate::telemetry::METER_NAME;
use dashmap::DashMap;
use opentelemetry::{global, metrics::Counter};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type NoticeJobFuture = Pin<Box<dyn Future<Output = Result<NoticeDispatchSummary>> + Send>>;
type NoticeJob = Box<dyn Fn() -> NoticeJobFuture + Send + Sync>;

/// Per-notice aggregate handed back to the crawl scheduler.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeDispatchSummary {
    pub notice_num: i64,
    pub total_endpoints: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub deactivated: usize,
    pub temporary_failures: usize,
}

#[derive(Clone, Debug)]
struct Metrics {
    deliveries_total: Counter<u64>,
    delivery_failures_total: Counter<u64>,
    endpoints_deactivated_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter(METER_NAME);
        Self {
            deliveries_total: meter
                .u64_counter("lawcast_deliveries_total")
                .with_description("Successful webhook deliveries")
                .build(),
            delivery_failures_total: meter
                .u64_counter("lawcast_delivery_failures_total")
                .with_description("Webhook deliveries that failed after retries")
                .build(),
            endpoints_deactivated_total: meter
                .u64_counter("lawcast_endpoints_deactivated_total")
                .with_description("Endpoints deactivated after a permanent delivery failure")
                .build(),
        }
    }
}

/// Fans one batch of new notices out to the active endpoints: one executor
/// job per notice, sequential sends within a notice (the per-endpoint window
/// is 1 s; parallelism comes from running notices concurrently), permanent
/// failures deactivated immediately.
#[derive(Clone)]
pub struct DispatchCoordinator {
    pool: DbPool,
    repo: EndpointRepository,
    sender: Arc<dyn WebhookSender>,
    rate_limiter: DispatchRateLimiter,
    executor: BatchExecutor,
    /// Advisory per-process hint so a notice later in the batch does not
    /// re-try an endpoint another notice already found dead. Cleared when the
    /// row is deactivated; the repository stays the source of truth.
    permanent_failures: Arc<DashMap<i64, ErrorCategory>>,
    metrics: Metrics,
}

impl std::fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCoordinator")
            .field("permanent_failures", &self.permanent_failures.len())
            .finish_non_exhaustive()
    }
}

impl DispatchCoordinator {
    #[must_use]
    pub fn new(
        pool: DbPool,
        repo: EndpointRepository,
        sender: Arc<dyn WebhookSender>,
        rate_limiter: DispatchRateLimiter,
        executor: BatchExecutor,
    ) -> Self {
        Self {
            pool,
            repo,
            sender,
            rate_limiter,
            executor,
            permanent_failures: Arc::new(DashMap::new()),
            metrics: Metrics::new(),
        }
    }

    /// Dispatches `notices` through the executor and returns per-notice
    /// outcomes in submission order.
    ///
    /// # Errors
    /// Returns `AppError::ShuttingDown` when the executor refuses new work.
    pub async fn dispatch_notices(&self, notices: &[Notice]) -> Result<Vec<JobOutcome<NoticeDispatchSummary>>> {
        let jobs = self.notice_jobs(notices);
        let options = self.executor.options().clone();
        self.executor.execute_batch(&jobs, &options).await
    }

    /// Ungated variant used by already-submitted batches; aggregates into the
    /// report stored in the executor's job table.
    pub(crate) async fn run_batch(&self, job_id: &str, notices: Vec<Notice>) -> BatchReport {
        let jobs = self.notice_jobs(&notices);
        let options = self.executor.options().clone();
        let outcomes = self.executor.execute_chunks(&jobs, &options).await;

        let mut report = BatchReport { job_id: job_id.to_string(), total_notices: notices.len(), ..Default::default() };
        for outcome in &outcomes {
            match &outcome.result {
                Ok(summary) => {
                    report.notices_dispatched += 1;
                    report.success_count += summary.success_count;
                    report.failed_count += summary.failed_count;
                    report.deactivated += summary.deactivated;
                    report.temporary_failures += summary.temporary_failures;
                }
                Err(e) => {
                    report.notices_failed += 1;
                    tracing::error!(job_id, error = %e, "Notice dispatch job failed");
                }
            }
        }
        report
    }

    fn notice_jobs(&self, notices: &[Notice]) -> Vec<NoticeJob> {
        notices
            .iter()
            .map(|notice| {
                let this = self.clone();
                let notice = notice.clone();
                Box::new(move || {
                    let this = this.clone();
                    let notice = notice.clone();
                    Box::pin(async move { this.dispatch_one(&notice).await }) as NoticeJobFuture
                }) as NoticeJob
            })
            .collect()
    }

    /// Delivers one notice to every currently-active endpoint. Endpoints are
    /// fetched fresh per notice so rows deactivated earlier in the batch are
    /// not re-tried.
    #[tracing::instrument(level = "debug", skip(self, notice), fields(num = notice.num), err)]
    async fn dispatch_one(&self, notice: &Notice) -> Result<NoticeDispatchSummary> {
        let endpoints = {
            let mut conn = self.pool.acquire().await?;
            self.repo.find_active(&mut conn).await?
        };

        let embed = NoticeEmbed::for_notice(notice);
        let mut results = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            if let Some(category) = self.permanent_failures.get(&endpoint.id).map(|entry| *entry.value()) {
                tracing::debug!(endpoint = endpoint.id, category = ?category, "Skipping endpoint flagged this batch");
                continue;
            }
            let result = self.send_with_retry(endpoint, &embed).await;
            if result.should_delete
                && let Some(category) = result.category
            {
                self.permanent_failures.insert(endpoint.id, category);
            }
            results.push(result);
        }

        let deactivated = self.apply_lifecycle_actions(&results).await;

        let success_count = results.iter().filter(|r| r.success).count();
        let failed_count = results.len() - success_count;
        let temporary_failures = results.iter().filter(|r| !r.success && !r.should_delete).count();
        Ok(NoticeDispatchSummary {
            notice_num: notice.num,
            total_endpoints: endpoints.len(),
            success_count,
            failed_count,
            deactivated,
            temporary_failures,
        })
    }

    /// Sends under the rate limiter, retrying transient failures a bounded
    /// number of times. Permanent failures return immediately.
    async fn send_with_retry(&self, endpoint: &Endpoint, embed: &NoticeEmbed) -> DeliveryResult {
        let options = self.executor.options();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.rate_limiter.acquire(endpoint.id).await;
            match self.sender.send(&endpoint.url, embed).await {
                Ok(()) => {
                    self.rate_limiter.record(endpoint.id).await;
                    self.metrics.deliveries_total.add(1, &[]);
                    return DeliveryResult::ok(endpoint.id);
                }
                Err(e) if e.is_permanent() => {
                    tracing::warn!(endpoint = endpoint.id, category = ?e.category, "Permanent delivery failure");
                    self.metrics.delivery_failures_total.add(1, &[]);
                    return DeliveryResult::failed(endpoint.id, e.category, e.message);
                }
                Err(e) => {
                    if attempt > options.retry_count {
                        tracing::warn!(
                            endpoint = endpoint.id,
                            category = ?e.category,
                            attempts = attempt,
                            "Delivery failed after retries"
                        );
                        self.metrics.delivery_failures_total.add(1, &[]);
                        return DeliveryResult::failed(endpoint.id, e.category, e.message);
                    }
                    tracing::debug!(endpoint = endpoint.id, category = ?e.category, "Transient delivery failure, retrying");
                    tokio::time::sleep(options.retry_delay).await;
                }
            }
        }
    }

    /// Deactivates every endpoint the batch marked for deletion. Repository
    /// errors are logged and swallowed; the dispatch already happened.
    async fn apply_lifecycle_actions(&self, results: &[DeliveryResult]) -> usize {
        let mut deactivated = 0;
        let to_delete: Vec<i64> = results.iter().filter(|r| r.should_delete).map(|r| r.endpoint_id).collect();
        if to_delete.is_empty() {
            return 0;
        }

        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "Could not open connection for endpoint deactivation");
                return 0;
            }
        };
        for endpoint_id in to_delete {
            match self.repo.deactivate(&mut conn, endpoint_id).await {
                Ok(()) => {
                    deactivated += 1;
                    self.permanent_failures.remove(&endpoint_id);
                    self.metrics.endpoints_deactivated_total.add(1, &[]);
                    tracing::info!(endpoint = endpoint_id, "Endpoint deactivated after permanent delivery failure");
                }
                Err(e) => {
                    tracing::warn!(endpoint = endpoint_id, error = %e, "Failed to deactivate endpoint");
                }
            }
        }
        deactivated
    }
}
