#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::cache::CacheStore;
use crate::adapters::database::DbPool;
use crate::adapters::database::endpoint_repo::EndpointRepository;
use crate::config::Config;
use crate::services::batch::{BatchExecutor, BatchOptions};
use crate::services::delivery::WebhookSender;
use crate::services::dispatch::DispatchCoordinator;
use crate::services::rate_limit::DispatchRateLimiter;
use crate::services::recency_cache::RecencyCache;
use crate::services::source::NoticeSource;
use crate::services::verifier::TokenVerifier;
use crate::services::webhook_service::WebhookService;
use crate::workers::{CrawlWorker, EndpointCleanupWorker};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct Resources {
    pub pool: DbPool,
    pub cache_store: Arc<dyn CacheStore>,
}

#[derive(Clone, Debug)]
pub struct Services {
    pub webhook_service: WebhookService,
    pub dispatch: DispatchCoordinator,
    pub executor: BatchExecutor,
    pub cache: RecencyCache,
}

#[derive(Debug)]
pub struct App {
    pub resources: Resources,
    pub services: Services,
    pub workers: Workers,
}

#[derive(Debug)]
pub struct Workers {
    pub crawl_worker: CrawlWorker,
    pub cleanup_worker: EndpointCleanupWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut tasks = Vec::new();

        let crawl_worker = self.crawl_worker;
        let crawl_rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            crawl_worker.run(crawl_rx).await;
        }));

        let cleanup_worker = self.cleanup_worker;
        let cleanup_rx = shutdown_rx;
        tasks.push(tokio::spawn(async move {
            cleanup_worker.run(cleanup_rx).await;
        }));

        tasks
    }
}

/// Builder for constructing and wiring the application object graph. The
/// crawl source, delivery client, and verification oracle are injected so
/// tests can supply mocks.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    cache_store: Option<Arc<dyn CacheStore>>,
    source: Option<Arc<dyn NoticeSource>>,
    sender: Option<Arc<dyn WebhookSender>>,
    verifier: Option<Arc<dyn TokenVerifier>>,
}

impl AppBuilder {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config, pool: None, cache_store: None, source: None, sender: None, verifier: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn NoticeSource>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_sender(mut self, sender: Arc<dyn WebhookSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Wires all services, the executor, and the workers.
    ///
    /// # Errors
    /// Returns an error if a mandatory dependency is missing or the cleanup
    /// timezone is unknown.
    pub fn build(self) -> anyhow::Result<App> {
        let pool = self.pool.ok_or_else(|| anyhow::anyhow!("Database pool is required"))?;
        let cache_store = self.cache_store.ok_or_else(|| anyhow::anyhow!("Cache store is required"))?;
        let source = self.source.ok_or_else(|| anyhow::anyhow!("Notice source is required"))?;
        let sender = self.sender.ok_or_else(|| anyhow::anyhow!("Webhook sender is required"))?;
        let verifier = self.verifier.ok_or_else(|| anyhow::anyhow!("Token verifier is required"))?;

        let config = &self.config;
        let repo = EndpointRepository::new();

        let cache = RecencyCache::new(Arc::clone(&cache_store));
        let rate_limiter = DispatchRateLimiter::new(Arc::clone(&cache_store));
        let executor = BatchExecutor::new(BatchOptions::from_config(&config.dispatch));
        let dispatch = DispatchCoordinator::new(
            pool.clone(),
            repo.clone(),
            Arc::clone(&sender),
            rate_limiter,
            executor.clone(),
        );
        let webhook_service =
            WebhookService::new(pool.clone(), repo.clone(), verifier, sender, config.dispatch.max_active_webhooks);

        let workers = Workers {
            crawl_worker: CrawlWorker::new(
                source,
                cache.clone(),
                dispatch.clone(),
                executor.clone(),
                config.crawl.interval_secs,
            ),
            cleanup_worker: EndpointCleanupWorker::new(pool.clone(), repo, &config.cron_timezone)?,
        };

        Ok(App {
            resources: Resources { pool, cache_store },
            services: Services { webhook_service, dispatch, executor, cache },
            workers,
        })
    }
}

/// Runs database migrations.
///
/// # Errors
/// Returns an error if migrations fail.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await.map_err(Into::into)
}

/// Sets up a panic hook that logs the panic message and location.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let msg = payload
            .downcast_ref::<&str>()
            .map_or_else(|| payload.downcast_ref::<String>().map_or_else(|| "Box<Any>", String::as_str), |s| *s);

        let location = panic_info.location().map_or_else(
            || "unknown".to_string(),
            |location| format!("{}:{}:{}", location.file(), location.line(), location.column()),
        );

        tracing::error!(
            panic.message = %msg,
            panic.location = %location,
            "Application panicked"
        );
    }));
}

/// Returns a future that completes when a termination signal is received.
///
/// # Panics
/// Panics if the signal handlers cannot be installed.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}

/// Spawns a task that listens for OS signals and broadcasts a shutdown signal.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });
}
