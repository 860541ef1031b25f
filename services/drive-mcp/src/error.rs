//! Service-specific error types and HTTP error bodies

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures while running an MCP tool.
///
/// `NotAuthorized` from the facade is not a failure from the caller's point
/// of view; the MCP handler turns it into a normal result telling the owner
/// to authenticate.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Drive(#[from] drive_api::Error),
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::InvalidArguments(e.to_string())
    }
}

/// Result alias for tool execution
pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// New request id in the `req_<uuid>` form used in logs and error bodies.
pub fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// JSON error body: {"error":{"type":"...","message":"...","request_id":"req_..."}}
pub fn error_response(
    status: StatusCode,
    error_type: &str,
    message: &str,
    request_id: &str,
) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Map an authorization error onto its HTTP status and error type.
pub fn auth_error_response(err: &drive_auth::Error, request_id: &str) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, err.kind(), &err.to_string(), request_id)
}
