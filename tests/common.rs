#![allow(dead_code)]
use async_trait::async_trait;
use dashmap::DashMap;
use lawcast_server::adapters::cache::{CacheStore, MemoryCacheStore};
use lawcast_server::adapters::database::DbPool;
use lawcast_server::adapters::database::endpoint_repo::EndpointRepository;
use lawcast_server::domain::delivery::ErrorCategory;
use lawcast_server::domain::notice::Notice;
use lawcast_server::services::batch::{BatchExecutor, BatchOptions};
use lawcast_server::services::delivery::{DeliveryError, WebhookSender};
use lawcast_server::services::dispatch::DispatchCoordinator;
use lawcast_server::services::rate_limit::DispatchRateLimiter;
use lawcast_server::services::recency_cache::RecencyCache;
use lawcast_server::services::source::{NoticeSource, SourceError};
use lawcast_server::services::verifier::TokenVerifier;
use lawcast_server::services::webhook_service::WebhookService;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

static INIT: OnceLock<()> = OnceLock::new();

pub fn setup_tracing() {
    INIT.get_or_init(|| {
        lawcast_server::telemetry::init_test_telemetry();
        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

/// One-connection in-memory SQLite pool with migrations applied. A single
/// connection is required: every `:memory:` connection is its own database.
pub async fn memory_pool() -> DbPool {
    setup_tracing();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    sqlx::migrate!("./migrations").run(&pool).await.expect("run migrations");
    pool
}

pub const TEST_TOKEN: &str = "aBcDeFgHiJkLmNoPqRsTuVwXyZ0123456789_-aBcDeFgHiJkLmNoPqRsTuVwXyZ";

/// A structurally valid Discord webhook URL with a distinct snowflake.
pub fn webhook_url(n: u64) -> String {
    format!("https://discord.com/api/webhooks/{}/{TEST_TOKEN}", 100_000_000_000_000_000 + n)
}

pub fn notice(num: i64) -> Notice {
    Notice {
        num,
        subject: format!("입법예고 {num}"),
        proposer_category: "의원".to_string(),
        committee: "법제사법위원회".to_string(),
        link: format!("https://pal.assembly.go.kr/napal/view.do?id={num}"),
    }
}

pub fn notices(nums: &[i64]) -> Vec<Notice> {
    nums.iter().copied().map(notice).collect()
}

/// Scripted delivery client. URLs listed in `failures` always fail with the
/// given category; `transient_failures` fail that many times and then
/// succeed; `delay_ms` slows every call down.
#[derive(Debug, Default)]
pub struct MockSender {
    pub calls: DashMap<String, u32>,
    pub failures: DashMap<String, ErrorCategory>,
    pub transient_failures: DashMap<String, u32>,
    pub delay_ms: AtomicU64,
}

impl MockSender {
    pub fn call_count(&self, url: &str) -> u32 {
        self.calls.get(url).map_or(0, |entry| *entry.value())
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }
}

#[async_trait]
impl WebhookSender for MockSender {
    async fn send(
        &self,
        url: &str,
        _embed: &lawcast_server::domain::notice::NoticeEmbed,
    ) -> Result<(), DeliveryError> {
        *self.calls.entry(url.to_string()).or_insert(0) += 1;
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some(category) = self.failures.get(url).map(|entry| *entry.value()) {
            return Err(DeliveryError::new(category, "scripted failure"));
        }
        if let Some(mut remaining) = self.transient_failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DeliveryError::new(ErrorCategory::NetworkError, "scripted transient failure"));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockVerifier {
    pub accept: bool,
    pub unreachable: bool,
}

impl MockVerifier {
    pub const fn accepting() -> Self {
        Self { accept: true, unreachable: false }
    }

    pub const fn rejecting() -> Self {
        Self { accept: false, unreachable: false }
    }
}

#[async_trait]
impl TokenVerifier for MockVerifier {
    async fn verify(&self, _token: &str) -> anyhow::Result<bool> {
        if self.unreachable {
            anyhow::bail!("verifier offline");
        }
        Ok(self.accept)
    }
}

/// Crawl source returning queued pages; once the queue runs dry the last
/// page repeats, mimicking a stable upstream index.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    pages: Mutex<VecDeque<Result<Vec<Notice>, String>>>,
    last: Mutex<Vec<Notice>>,
}

impl ScriptedSource {
    pub fn push_page(&self, page: Vec<Notice>) {
        self.pages.lock().expect("pages lock").push_back(Ok(page));
    }

    pub fn push_error(&self, message: &str) {
        self.pages.lock().expect("pages lock").push_back(Err(message.to_string()));
    }
}

#[async_trait]
impl NoticeSource for ScriptedSource {
    async fn fetch_latest(&self) -> Result<Vec<Notice>, SourceError> {
        let next = self.pages.lock().expect("pages lock").pop_front();
        match next {
            Some(Ok(page)) => {
                *self.last.lock().expect("last lock") = page.clone();
                Ok(page)
            }
            Some(Err(message)) => Err(SourceError::Parse(message)),
            None => Ok(self.last.lock().expect("last lock").clone()),
        }
    }
}

/// Executor options tuned so retries and timeouts resolve in test time.
pub fn fast_options() -> BatchOptions {
    BatchOptions {
        concurrency: 10,
        timeout: Duration::from_secs(2),
        retry_count: 3,
        retry_delay: Duration::from_millis(25),
        batch_size: None,
    }
}

pub struct TestHarness {
    pub pool: DbPool,
    pub repo: EndpointRepository,
    pub store: Arc<dyn CacheStore>,
    pub cache: RecencyCache,
    pub executor: BatchExecutor,
    pub dispatch: DispatchCoordinator,
    pub sender: Arc<MockSender>,
}

impl TestHarness {
    pub async fn with_options(options: BatchOptions) -> Self {
        let pool = memory_pool().await;
        let repo = EndpointRepository::new();
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let cache = RecencyCache::new(Arc::clone(&store));
        let sender = Arc::new(MockSender::default());
        let executor = BatchExecutor::new(options);
        let dispatch = DispatchCoordinator::new(
            pool.clone(),
            repo.clone(),
            Arc::clone(&sender) as Arc<dyn WebhookSender>,
            DispatchRateLimiter::new(Arc::clone(&store)),
            executor.clone(),
        );
        Self { pool, repo, store, cache, executor, dispatch, sender }
    }

    pub async fn new() -> Self {
        Self::with_options(fast_options()).await
    }

    /// Inserts `count` active endpoints and returns their URLs.
    pub async fn register_endpoints(&self, count: u64) -> Vec<String> {
        let mut conn = self.pool.acquire().await.expect("acquire");
        let mut urls = Vec::new();
        for n in 0..count {
            let url = webhook_url(n);
            self.repo.create_or_reactivate(&mut conn, &url).await.expect("insert endpoint");
            urls.push(url);
        }
        urls
    }

    pub fn webhook_service(&self, verifier: MockVerifier, max_active: i64) -> WebhookService {
        WebhookService::new(
            self.pool.clone(),
            self.repo.clone(),
            Arc::new(verifier),
            Arc::clone(&self.sender) as Arc<dyn WebhookSender>,
            max_active,
        )
    }
}
