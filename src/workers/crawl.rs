use crate::error::Result;
use crate::services::batch::BatchExecutor;
use crate::services::dispatch::DispatchCoordinator;
use crate::services::recency_cache::RecencyCache;
use crate::services::source::NoticeSource;
use crate::telemetry::METER_NAME;
use opentelemetry::{global, metrics::Counter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    ticks_total: Counter<u64>,
    ticks_skipped_total: Counter<u64>,
    notices_discovered_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter(METER_NAME);
        Self {
            ticks_total: meter
                .u64_counter("lawcast_crawl_ticks_total")
                .with_description("Crawl ticks that ran a full cycle")
                .build(),
            ticks_skipped_total: meter
                .u64_counter("lawcast_crawl_ticks_skipped_total")
                .with_description("Crawl ticks skipped (reentrancy latch or uninitialized cache)")
                .build(),
            notices_discovered_total: meter
                .u64_counter("lawcast_notices_discovered_total")
                .with_description("New notices discovered by the crawl diff")
                .build(),
        }
    }
}

/// Periodic crawl → diff → dispatch pipeline. Strictly non-reentrant: a tick
/// that finds the previous one still running skips. The cache is updated only
/// after the dispatch for a tick has resolved.
#[derive(Debug)]
pub struct CrawlWorker {
    source: Arc<dyn NoticeSource>,
    cache: RecencyCache,
    coordinator: DispatchCoordinator,
    executor: BatchExecutor,
    interval_secs: u64,
    is_processing: AtomicBool,
    metrics: Metrics,
}

impl CrawlWorker {
    #[must_use]
    pub fn new(
        source: Arc<dyn NoticeSource>,
        cache: RecencyCache,
        coordinator: DispatchCoordinator,
        executor: BatchExecutor,
        interval_secs: u64,
    ) -> Self {
        Self {
            source,
            cache,
            coordinator,
            executor,
            interval_secs,
            is_processing: AtomicBool::new(false),
            metrics: Metrics::new(),
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        if let Err(e) = self.initialize_cache().instrument(tracing::info_span!("initialize_cache")).await {
            tracing::error!(error = %e, "Initial crawl failed; cache stays cold until a tick succeeds");
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().instrument(tracing::info_span!("crawl_tick")).await {
                        tracing::error!(error = %e, "Crawl tick failed");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Crawl worker shutting down...");
    }

    /// One crawl seeding the recency cache. Nothing is dispatched from the
    /// seed crawl; it only establishes the diff baseline.
    ///
    /// # Errors
    /// Returns an error if the crawl or the cache write fails.
    pub async fn initialize_cache(&self) -> Result<()> {
        let notices =
            self.source.fetch_latest().await.map_err(|e| crate::error::AppError::Internal(e.into()))?;
        if notices.is_empty() {
            tracing::warn!("Initial crawl returned no rows; cache stays cold");
            return Ok(());
        }
        tracing::info!(count = notices.len(), "Seeding recency cache from initial crawl");
        self.cache.initialize(notices).await
    }

    /// One scheduler tick.
    ///
    /// # Errors
    /// Returns an error when dispatch was attempted and failed; crawl
    /// failures are recoverable and only skip the tick.
    pub async fn tick(&self) -> Result<()> {
        if !self.cache.is_initialized().await {
            // Open choice documented in DESIGN.md: a failed startup crawl is
            // re-attempted every tick instead of skipping forever.
            tracing::warn!("Recency cache not initialized, attempting to seed before next tick");
            self.metrics.ticks_skipped_total.add(1, &[]);
            return self.initialize_cache().await;
        }
        if self.is_processing.swap(true, Ordering::SeqCst) {
            tracing::warn!("Previous crawl tick still running, skipping");
            self.metrics.ticks_skipped_total.add(1, &[]);
            return Ok(());
        }

        let result = self.run_cycle().await;
        self.is_processing.store(false, Ordering::SeqCst);
        result
    }

    async fn run_cycle(&self) -> Result<()> {
        self.metrics.ticks_total.add(1, &[]);
        let crawled = match self.source.fetch_latest().await {
            Ok(crawled) if crawled.is_empty() => {
                tracing::warn!("Crawl returned no rows, skipping tick");
                return Ok(());
            }
            Ok(crawled) => crawled,
            Err(e) => {
                tracing::warn!(error = %e, "Crawl failed, skipping tick");
                return Ok(());
            }
        };

        let new_notices = self.cache.find_new(&crawled).await;
        if new_notices.is_empty() {
            tracing::debug!(crawled = crawled.len(), "No new notices");
            self.cache.update(&crawled).await?;
            return Ok(());
        }

        tracing::info!(count = new_notices.len(), "Dispatching newly observed notices");
        self.metrics.notices_discovered_total.add(new_notices.len() as u64, &[]);

        // The only blocking dispatch path: the cache must not advance past
        // notices whose delivery has not been attempted yet.
        let dispatch_result: Result<()> = async {
            let job_id = self.executor.submit_notification_batch(&self.coordinator, new_notices)?;
            self.executor.await_job(&job_id).await;
            Ok(())
        }
        .await;

        // Even a failed dispatch advances the cache so the next tick does not
        // re-fire on the same notices; the original error still surfaces.
        if let Err(e) = self.cache.update(&crawled).await {
            tracing::error!(error = %e, "Cache update failed after dispatch");
            if dispatch_result.is_ok() {
                return Err(e);
            }
        }
        dispatch_result
    }
}
