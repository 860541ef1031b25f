//! MCP endpoint: JSON-RPC 2.0 over HTTP POST
//!
//! Handles `initialize`, `ping`, `tools/list` and `tools/call`. Requests
//! without an `id` are notifications and get `202 Accepted` with no body.

use std::borrow::Cow;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::app::AppState;
use crate::error::{ToolError, request_id};
use crate::metrics;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Shown to the caller when no credential is stored yet.
pub const NOT_AUTHORIZED_MESSAGE: &str =
    "No Google account connected. Please authenticate first at /auth";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    const VERSION: &'static str = "2.0";

    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

impl IntoResponse for JsonRpcResponse {
    fn into_response(self) -> Response {
        let body = serde_json::to_string(&self).unwrap_or_else(|_| {
            r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#
                .to_string()
        });
        (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}

/// MCP tool info for tools/list response.
#[derive(Debug, Serialize)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// POST /mcp
pub async fn handle_mcp(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = request_id();
    let span = info_span!("mcp", request_id = %request_id);
    async move {
        let req: JsonRpcRequest = match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "unparseable JSON-RPC request");
                return JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {e}"))
                    .into_response();
            }
        };
        if req.jsonrpc != "2.0" {
            return JsonRpcResponse::error(req.id, INVALID_REQUEST, "jsonrpc must be \"2.0\"")
                .into_response();
        }

        debug!(method = %req.method, "handling MCP request");
        let is_notification = req.id.is_none();

        let response = match req.method.as_str() {
            "initialize" => JsonRpcResponse::success(req.id, handle_initialize(&req.params)),
            "ping" => JsonRpcResponse::success(req.id, json!({})),
            "tools/list" => handle_tools_list(req.id, &state),
            "tools/call" => handle_tools_call(req.id, &req.params, &state).await,
            method if method.starts_with("notifications/") || is_notification => {
                return StatusCode::ACCEPTED.into_response();
            }
            method => JsonRpcResponse::error(
                req.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            ),
        };

        if is_notification {
            return StatusCode::ACCEPTED.into_response();
        }
        response.into_response()
    }
    .instrument(span)
    .await
}

fn handle_initialize(params: &Value) -> Value {
    let protocol_version = params
        .get("protocolVersion")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);

    info!(protocol_version, "MCP initialize");

    json!({
        "protocolVersion": protocol_version,
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": "Google Drive MCP",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn handle_tools_list(id: Option<Value>, state: &AppState) -> JsonRpcResponse {
    let tools: Vec<McpToolInfo> = state
        .tools
        .iter()
        .map(|t| McpToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect();

    JsonRpcResponse::success(id, json!({ "tools": tools }))
}

fn text_result(value: &Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    json!({
        "content": [{
            "type": "text",
            "text": text
        }],
        "isError": is_error
    })
}

async fn handle_tools_call(id: Option<Value>, params: &Value, state: &AppState) -> JsonRpcResponse {
    let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing 'name' parameter");
    };

    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    let Some(tool) = state.tools.iter().find(|t| t.name() == tool_name) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Tool not found: {tool_name}"));
    };

    info!(tool = tool_name, "executing tool");
    let started = Instant::now();
    let result = tool.execute(&state.ctx, arguments).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(value) => {
            metrics::record_tool_call(tool_name, "ok", elapsed);
            JsonRpcResponse::success(id, text_result(&value, false))
        }
        Err(ToolError::Drive(drive_api::Error::NotAuthorized)) => {
            metrics::record_tool_call(tool_name, "not_authorized", elapsed);
            JsonRpcResponse::success(id, text_result(&json!({ "error": NOT_AUTHORIZED_MESSAGE }), false))
        }
        Err(ToolError::InvalidArguments(msg)) => {
            metrics::record_tool_call(tool_name, "invalid_params", elapsed);
            JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid arguments: {msg}"))
        }
        Err(e) => {
            metrics::record_tool_call(tool_name, "error", elapsed);
            tracing::error!(tool = tool_name, error = %e, "tool execution failed");
            JsonRpcResponse::success(id, text_result(&json!({ "error": e.to_string() }), true))
        }
    }
}
