use crate::adapters::cache::CacheStore;
use crate::config::ServerConfig;
use crate::services::batch::BatchExecutor;
use crate::services::recency_cache::RecencyCache;
use crate::services::webhook_service::WebhookService;
use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{self, AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod notices;
pub mod response;
pub mod system;
pub mod webhooks;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct AppState {
    pub webhook_service: WebhookService,
    pub cache: RecencyCache,
    pub executor: BatchExecutor,
    pub cache_store: Arc<dyn CacheStore>,
}

#[must_use]
pub fn app_router(state: AppState, server: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/webhooks", post(webhooks::register))
        .route("/webhooks/stats/detailed", get(webhooks::detailed_stats))
        .route("/webhooks/system-health", get(webhooks::system_health))
        .route("/notices/recent", get(notices::recent))
        .route("/stats", get(system::stats))
        .route("/batch/status", get(system::batch_status))
        .route("/health", get(system::health));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors_layer(server))
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> =
        server.allowed_origins().iter().filter_map(|origin| origin.parse().ok()).collect();
    if origins.is_empty() {
        CorsLayer::new().allow_origin(cors::Any).allow_methods(cors::Any).allow_headers(cors::Any)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    }
}
