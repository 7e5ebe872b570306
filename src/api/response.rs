use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

/// Uniform envelope for every API response.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "testResult", skip_serializing_if = "Option::is_none")]
    pub test_result: Option<Value>,
}

impl ApiResponse {
    #[must_use]
    pub const fn success() -> Self {
        Self { success: true, message: None, data: None, test_result: None }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = Some(serde_json::to_value(data).unwrap_or(Value::Null));
        self
    }

    #[must_use]
    pub fn with_test_result(mut self, test_result: impl Serialize) -> Self {
        self.test_result = Some(serde_json::to_value(test_result).unwrap_or(Value::Null));
        self
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
