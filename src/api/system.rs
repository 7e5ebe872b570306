use crate::api::AppState;
use crate::api::response::ApiResponse;
use crate::error::Result;
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::json;

/// Combined service overview: endpoint stats, cache meta, batch job table.
///
/// # Errors
/// Returns a database error if the aggregate query fails.
pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let webhooks = state.webhook_service.stats().await?;
    let cache = state.cache.meta().await?;
    let batch = state.executor.status();
    Ok(ApiResponse::success().with_data(json!({
        "webhooks": webhooks,
        "cache": cache,
        "batchProcessing": batch,
    })))
}

pub async fn batch_status(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse::success().with_data(state.executor.status())
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let cache_state = match state.cache_store.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Cache ping failed");
            "disconnected"
        }
    };
    ApiResponse::success().with_data(json!({
        "timestamp": Utc::now(),
        "cache": cache_state,
    }))
}
