use crate::config::DispatchConfig;
use crate::error::{AppError, Result};
use crate::services::dispatch::DispatchCoordinator;
use crate::telemetry::METER_NAME;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use opentelemetry::{global, metrics::Counter};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Jobs scheduled in parallel within one chunk.
    pub concurrency: usize,
    /// Ceiling per job attempt.
    pub timeout: Duration,
    /// Additional attempts after the first failure.
    pub retry_count: u32,
    pub retry_delay: Duration,
    /// When set, the job list is processed in contiguous slices of this size.
    pub batch_size: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout: Duration::from_secs(30),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            batch_size: None,
        }
    }
}

impl BatchOptions {
    #[must_use]
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            timeout: Duration::from_millis(config.job_timeout_ms),
            retry_count: config.retry_count,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            batch_size: None,
        }
    }
}

/// Result of one job after retries, in submission order.
#[derive(Debug)]
pub struct JobOutcome<T> {
    pub result: std::result::Result<T, String>,
    pub duration: Duration,
    pub attempts: u32,
}

impl<T> JobOutcome<T> {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregate outcome of one submitted notification batch.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub job_id: String,
    pub total_notices: usize,
    pub notices_dispatched: usize,
    pub notices_failed: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub deactivated: usize,
    pub temporary_failures: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatus {
    pub active_jobs: Vec<String>,
    pub job_count: usize,
    pub shutting_down: bool,
}

#[derive(Clone, Debug)]
struct Metrics {
    jobs_total: Counter<u64>,
    job_failures_total: Counter<u64>,
    batches_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter(METER_NAME);
        Self {
            jobs_total: meter
                .u64_counter("lawcast_batch_jobs_total")
                .with_description("Total jobs run by the batch executor")
                .build(),
            job_failures_total: meter
                .u64_counter("lawcast_batch_job_failures_total")
                .with_description("Jobs that exhausted their retries")
                .build(),
            batches_total: meter
                .u64_counter("lawcast_notification_batches_total")
                .with_description("Notification batches submitted")
                .build(),
        }
    }
}

/// Bounded-concurrency job runner with per-job timeout and bounded retries.
/// In-flight notification batches are tracked in a job table so shutdown can
/// drain them; once the shutdown gate is set, new work is refused while
/// running futures continue.
#[derive(Clone, Debug)]
pub struct BatchExecutor {
    jobs: Arc<DashMap<String, JoinHandle<BatchReport>>>,
    shutting_down: Arc<AtomicBool>,
    options: BatchOptions,
    metrics: Metrics,
}

impl BatchExecutor {
    #[must_use]
    pub fn new(options: BatchOptions) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
            options,
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub const fn options(&self) -> &BatchOptions {
        &self.options
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Runs `jobs` under the batch/concurrency/timeout/retry rules and returns
    /// per-job outcomes in submission order. A failing job never aborts the
    /// batch.
    ///
    /// # Errors
    /// Returns `AppError::ShuttingDown` when the shutdown gate is set.
    pub async fn execute_batch<T, F, Fut>(&self, jobs: &[F], options: &BatchOptions) -> Result<Vec<JobOutcome<T>>>
    where
        F: Fn() -> Fut + Sync,
        Fut: Future<Output = Result<T>>,
        T: Send,
    {
        if self.is_shutting_down() {
            return Err(AppError::ShuttingDown);
        }
        Ok(self.execute_chunks(jobs, options).await)
    }

    /// The chunking engine behind `execute_batch`, without the shutdown gate;
    /// batches already in flight keep using it while the gate is set.
    pub(crate) async fn execute_chunks<T, F, Fut>(&self, jobs: &[F], options: &BatchOptions) -> Vec<JobOutcome<T>>
    where
        F: Fn() -> Fut + Sync,
        Fut: Future<Output = Result<T>>,
        T: Send,
    {
        let slice_size = options.batch_size.unwrap_or(jobs.len()).max(1);
        let mut outcomes = Vec::with_capacity(jobs.len());
        for slice in jobs.chunks(slice_size) {
            for chunk in slice.chunks(options.concurrency.max(1)) {
                let chunk_outcomes = join_all(chunk.iter().map(|job| self.run_job(job, options))).await;
                outcomes.extend(chunk_outcomes);
            }
        }
        outcomes
    }

    async fn run_job<T, F, Fut>(&self, job: &F, options: &BatchOptions) -> JobOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.metrics.jobs_total.add(1, &[]);
        let started = Instant::now();
        let mut attempts = 0;
        let mut last_error = String::new();
        while attempts <= options.retry_count {
            attempts += 1;
            match tokio::time::timeout(options.timeout, job()).await {
                Ok(Ok(value)) => {
                    return JobOutcome { result: Ok(value), duration: started.elapsed(), attempts };
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("job timed out after {} ms", options.timeout.as_millis()),
            }
            if attempts <= options.retry_count {
                tokio::time::sleep(options.retry_delay).await;
            }
        }
        self.metrics.job_failures_total.add(1, &[]);
        JobOutcome { result: Err(last_error), duration: started.elapsed(), attempts }
    }

    /// Spawns a notification batch for `notices` and returns its job id. The
    /// batch runs detached; callers may `await_job` it or leave it to the
    /// shutdown drain.
    ///
    /// # Errors
    /// Returns `AppError::ShuttingDown` when the shutdown gate is set.
    pub fn submit_notification_batch(
        &self,
        coordinator: &DispatchCoordinator,
        notices: Vec<crate::domain::notice::Notice>,
    ) -> Result<String> {
        if self.is_shutting_down() {
            return Err(AppError::ShuttingDown);
        }
        self.metrics.batches_total.add(1, &[]);

        let mut job_id = format!("notification_batch_{}", Utc::now().timestamp_millis());
        if self.jobs.contains_key(&job_id) {
            job_id = format!("{job_id}_{}", Uuid::new_v4().simple());
        }

        // The task only starts once its handle is registered, so its
        // self-removal cannot race the insert below.
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let jobs = Arc::clone(&self.jobs);
        let coordinator = coordinator.clone();
        let task_id = job_id.clone();
        let handle = tokio::spawn(async move {
            let _ = ready_rx.await;
            let report = coordinator.run_batch(&task_id, notices).await;
            tracing::info!(
                job_id = %task_id,
                notices = report.total_notices,
                delivered = report.success_count,
                failed = report.failed_count,
                deactivated = report.deactivated,
                "Notification batch finished"
            );
            jobs.remove(&task_id);
            report
        });
        self.jobs.insert(job_id.clone(), handle);
        let _ = ready_tx.send(());
        Ok(job_id)
    }

    /// Awaits a submitted batch. Returns `None` when the job already finished
    /// (and removed itself) or was force-cleared.
    pub async fn await_job(&self, job_id: &str) -> Option<BatchReport> {
        let (_, handle) = self.jobs.remove(job_id)?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(job_id, error = %e, "Notification batch task failed");
                None
            }
        }
    }

    /// Awaits every tracked batch; returns how many were drained.
    pub async fn await_all(&self) -> usize {
        let ids: Vec<String> = self.jobs.iter().map(|entry| entry.key().clone()).collect();
        let mut drained = 0;
        for id in ids {
            self.await_job(&id).await;
            drained += 1;
        }
        drained
    }

    #[must_use]
    pub fn status(&self) -> BatchStatus {
        let active_jobs: Vec<String> = self.jobs.iter().map(|entry| entry.key().clone()).collect();
        BatchStatus { job_count: active_jobs.len(), active_jobs, shutting_down: self.is_shutting_down() }
    }

    /// Sets the shutdown gate: new batches are refused, running ones continue.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Gate, drain with a ceiling, then force-clear whatever is left.
    pub async fn shutdown(&self, ceiling: Duration) {
        self.begin_shutdown();
        match tokio::time::timeout(ceiling, self.await_all()).await {
            Ok(drained) => tracing::info!(drained, "Batch executor drained"),
            Err(_) => {
                tracing::warn!(remaining = self.jobs.len(), "Drain ceiling reached, force-clearing job table");
                self.force_clear();
            }
        }
    }

    /// Drops the job table without awaiting. Running sends are not
    /// interrupted; their results are simply no longer tracked.
    pub fn force_clear(&self) {
        self.jobs.clear();
    }
}
