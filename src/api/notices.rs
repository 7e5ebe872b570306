use crate::api::AppState;
use crate::api::response::ApiResponse;
use crate::error::Result;
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

const RECENT_LIMIT: usize = 20;

/// # Errors
/// Returns an error if the cache backend is unreachable.
pub async fn recent(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let notices = state.cache.recent(RECENT_LIMIT).await?;
    Ok(ApiResponse::success().with_data(json!({ "count": notices.len(), "notices": notices })))
}
