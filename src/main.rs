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

use lawcast_server::adapters::cache::CacheStore;
use lawcast_server::adapters::crawler::AssemblyNoticeCrawler;
use lawcast_server::adapters::discord::DiscordWebhookClient;
use lawcast_server::adapters::recaptcha::RecaptchaVerifier;
use lawcast_server::adapters::redis::{RedisCacheStore, RedisClient};
use lawcast_server::api::AppState;
use lawcast_server::config::Config;
use lawcast_server::services::delivery::WebhookSender;
use lawcast_server::services::source::NoticeSource;
use lawcast_server::services::verifier::TokenVerifier;
use lawcast_server::{AppBuilder, adapters, api, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    lawcast_server::setup_panic_hook();

    let boot_span = tracing::info_span!("boot_server");
    let (listener, router, shutdown_tx, shutdown_rx, executor, workers) = async {
        // Phase 1: Infrastructure (database, signals, shared cache)
        let pool = adapters::database::init_pool(&config.database_path).await?;
        lawcast_server::run_migrations(&pool).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        lawcast_server::spawn_signal_handler(shutdown_tx.clone());

        let redis = RedisClient::new(&config.redis.url).await?;
        let cache_store: Arc<dyn CacheStore> =
            Arc::new(RedisCacheStore::new(redis, config.redis.key_prefix.clone()));

        // Phase 2: Component wiring
        let sender: Arc<dyn WebhookSender> = Arc::new(DiscordWebhookClient::new()?);
        let verifier: Arc<dyn TokenVerifier> = Arc::new(RecaptchaVerifier::new(config.recaptcha_secret_key.clone())?);
        let source: Arc<dyn NoticeSource> = Arc::new(AssemblyNoticeCrawler::new(&config.crawl)?);

        let app = AppBuilder::new(config.clone())
            .with_database(pool)
            .with_cache_store(Arc::clone(&cache_store))
            .with_source(source)
            .with_sender(sender)
            .with_verifier(verifier)
            .build()?;

        // Phase 3: Runtime (listener and router)
        let executor = app.services.executor.clone();
        let state = AppState {
            webhook_service: app.services.webhook_service,
            cache: app.services.cache,
            executor: executor.clone(),
            cache_store,
        };
        let router = api::app_router(state, &config.server);

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        tracing::info!(address = %addr, "listening");
        let listener = tokio::net::TcpListener::bind(addr).await?;

        Ok::<_, anyhow::Error>((listener, router, shutdown_tx, shutdown_rx, executor, app.workers))
    }
    .instrument(boot_span)
    .await?;

    // Phase 4: Start runtime (workers and server)
    let worker_tasks = workers.spawn_all(shutdown_rx.clone());

    // Gate the executor the moment the signal lands so no new batches are
    // accepted while in-flight ones drain.
    {
        let executor = executor.clone();
        let mut gate_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let _ = gate_rx.wait_for(|&s| s).await;
            executor.begin_shutdown();
        });
    }

    let mut api_rx = shutdown_rx;
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = api_rx.wait_for(|&s| s).await;
    });
    if let Err(e) = server.await {
        tracing::error!(error = %e, "Server error");
    }

    // Phase 5: Graceful shutdown orchestration
    let _ = shutdown_tx.send(true);
    executor.shutdown(Duration::from_secs(config.server.shutdown_timeout_secs)).await;

    tokio::select! {
        () = async {
            futures::future::join_all(worker_tasks).await;
        } => {
            tracing::info!("Background tasks finished.");
        }
        () = tokio::time::sleep(WORKER_JOIN_TIMEOUT) => {
            tracing::warn!("Timeout waiting for background tasks to finish.");
        }
    }

    telemetry_guard.shutdown();
    Ok(())
}
