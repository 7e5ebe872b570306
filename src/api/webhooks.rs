use crate::api::AppState;
use crate::api::response::ApiResponse;
use crate::error::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWebhookRequest {
    pub url: String,
    pub recaptcha_token: String,
}

/// Registers a webhook URL after verification and a live test delivery.
///
/// # Errors
/// Returns the registration taxonomy errors (validation, verification,
/// conflict, quota, test delivery) or a database error.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterWebhookRequest>,
) -> Result<impl IntoResponse> {
    let outcome = state.webhook_service.register(&payload.url, &payload.recaptcha_token).await?;
    let message = if outcome.reactivated { "Webhook reactivated" } else { "Webhook registered" };
    Ok((
        StatusCode::CREATED,
        ApiResponse::success()
            .with_message(message)
            .with_data(json!({ "id": outcome.endpoint.id, "url": outcome.endpoint.url }))
            .with_test_result(outcome.test_result),
    ))
}

/// # Errors
/// Returns a database error if the aggregate query fails.
pub async fn detailed_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = state.webhook_service.stats().await?;
    Ok(ApiResponse::success().with_data(json!({
        "stats": stats,
        "efficiency": stats.efficiency(),
        "grade": stats.grade(),
    })))
}

/// # Errors
/// Returns a database error if the aggregate query fails.
pub async fn system_health(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let health = state.webhook_service.system_health().await?;
    Ok(ApiResponse::success().with_data(health))
}
