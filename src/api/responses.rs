//! API response types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::scheduler::DispatcherState;

/// Success envelope: `{ "data": ..., "success": true }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data,
            success: true,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// An envelope returned with `201 Created`.
pub struct Created<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, ApiResponse::ok(self.0)).into_response()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatcher: Option<&'static str>,
}

impl HealthResponse {
    pub fn new(dispatcher: Option<DispatcherState>) -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            dispatcher: dispatcher.map(|state| state.as_str()),
        }
    }
}

/// Result of a cancel request.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub deleted: u64,
}
