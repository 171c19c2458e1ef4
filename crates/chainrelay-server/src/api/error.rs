//! `RelayError` → HTTP response.
//!
//! Client mistakes become 400, unknown subscriptions and missing ledger
//! objects 404, and everything else 500. Body and query string rejections
//! are client mistakes too. A 500 keeps the generic message
//! and puts the cause in `data`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use chainrelay_core::RelayError;

use crate::api::types::ApiResponse;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ApiResponse<serde_json::Value>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            status,
            body: ApiResponse { code: status.as_u16(), message: message.into(), data },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        if err.is_not_found() {
            return api_not_found(&err.to_string());
        }
        if err.is_client_error() {
            return api_bad_request(&err.to_string());
        }
        api_internal(&err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        api_bad_request(&rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        api_bad_request(&rejection.body_text())
    }
}

pub fn api_bad_request(message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, message, serde_json::Value::Null)
}

pub fn api_not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, message, serde_json::Value::Null)
}

pub fn api_internal(err: &RelayError) -> ApiError {
    tracing::error!(error = %err, "request failed");
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error",
        serde_json::Value::String(err.to_string()),
    )
}
