//! MCP tools over the owner's Drive
//!
//! Each tool parses its JSON arguments, calls the facade and shapes the
//! answer as a JSON object. Errors go back to the MCP handler, which decides
//! how each one is presented to the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use drive_api::{DriveClient, FileContent};
use drive_auth::{AuthorizationFlow, FlowState};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ToolResult;

/// Boxed future returned by `McpTool::execute`.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolResult<Value>> + Send + 'a>>;

/// Shared handles every tool may use.
#[derive(Clone)]
pub struct ToolContext {
    pub flow: Arc<AuthorizationFlow>,
    pub drive: Arc<DriveClient>,
}

/// A tool exposed over `tools/list` and `tools/call`.
pub trait McpTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    fn execute<'a>(&'a self, ctx: &'a ToolContext, input: Value) -> ToolFuture<'a>;
}

pub fn register_all_tools() -> Vec<Box<dyn McpTool>> {
    vec![
        Box::new(ListDriveFiles),
        Box::new(SearchDriveFiles),
        Box::new(ReadFileContent),
        Box::new(GetAuthStatus),
    ]
}

/// Tolerates `null` and missing arguments for tools whose fields are all optional.
fn parse_args<T: for<'de> Deserialize<'de> + Default>(input: Value) -> ToolResult<T> {
    if input.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(input)?)
}

pub struct ListDriveFiles;

#[derive(Debug, Default, Deserialize)]
struct ListArgs {
    max_results: Option<u32>,
}

impl McpTool for ListDriveFiles {
    fn name(&self) -> &'static str {
        "list_drive_files"
    }

    fn description(&self) -> &'static str {
        "List files from Google Drive"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of files to return (default: 20, max: 100)",
                    "default": 20,
                    "minimum": 1,
                    "maximum": 100
                }
            }
        })
    }

    fn execute<'a>(&'a self, ctx: &'a ToolContext, input: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let args: ListArgs = parse_args(input)?;
            let files = ctx.drive.list_files(args.max_results).await?;
            Ok(json!({
                "success": true,
                "count": files.len(),
                "files": files,
            }))
        })
    }
}

pub struct SearchDriveFiles;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    max_results: Option<u32>,
}

impl McpTool for SearchDriveFiles {
    fn name(&self) -> &'static str {
        "search_drive_files"
    }

    fn description(&self) -> &'static str {
        "Search for files in Google Drive by name"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text the file name must contain"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of files to return (default: 10, max: 100)",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 100
                }
            },
            "required": ["query"]
        })
    }

    fn execute<'a>(&'a self, ctx: &'a ToolContext, input: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let args: SearchArgs = serde_json::from_value(input)?;
            let files = ctx.drive.search_files(&args.query, args.max_results).await?;
            Ok(json!({
                "success": true,
                "query": args.query,
                "count": files.len(),
                "files": files,
            }))
        })
    }
}

pub struct ReadFileContent;

#[derive(Debug, Deserialize)]
struct ReadArgs {
    file_id: String,
}

const BINARY_MESSAGE: &str = "Binary file - content not displayed. Use webViewLink to access.";

impl McpTool for ReadFileContent {
    fn name(&self) -> &'static str {
        "read_file_content"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a specific file from Google Drive. Google Docs, Sheets and \
         Slides are exported as text; other text files are returned as-is; binary files \
         return metadata only."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_id": {
                    "type": "string",
                    "description": "The Google Drive file ID"
                }
            },
            "required": ["file_id"]
        })
    }

    fn execute<'a>(&'a self, ctx: &'a ToolContext, input: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let args: ReadArgs = serde_json::from_value(input)?;
            let content = ctx.drive.read_file(&args.file_id).await?;
            Ok(render_content(&args.file_id, content))
        })
    }
}

fn render_content(file_id: &str, content: FileContent) -> Value {
    match content {
        FileContent::Exported {
            file,
            exported_as,
            content,
        } => json!({
            "success": true,
            "file_id": file_id,
            "name": file.name,
            "mimeType": file.mime_type,
            "exported_as": exported_as,
            "size": content.chars().count(),
            "content": content,
        }),
        FileContent::Text { file, content } => json!({
            "success": true,
            "file_id": file_id,
            "name": file.name,
            "mimeType": file.mime_type,
            "size": content.len(),
            "content": content,
        }),
        FileContent::Binary { file } => json!({
            "success": true,
            "file_id": file_id,
            "name": file.name,
            "mimeType": file.mime_type,
            "size": file.size,
            "content": null,
            "message": BINARY_MESSAGE,
            "webViewLink": file.web_view_link,
        }),
        FileContent::Unsupported { file } => json!({
            "success": false,
            "error": format!(
                "Google Workspace file type '{}' cannot be exported as text",
                file.mime_type
            ),
            "file_id": file_id,
            "name": file.name,
            "webViewLink": file.web_view_link,
        }),
    }
}

pub struct GetAuthStatus;

impl McpTool for GetAuthStatus {
    fn name(&self) -> &'static str {
        "get_auth_status"
    }

    fn description(&self) -> &'static str {
        "Check if the server is authenticated with Google Drive"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn execute<'a>(&'a self, ctx: &'a ToolContext, _input: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let state = ctx.flow.state().await;
            let authenticated = state == FlowState::Authorized;
            let message = match state {
                FlowState::Authorized => "Connected to Google Drive",
                FlowState::AwaitingCallback => {
                    "Authorization started. Complete the Google consent page to connect."
                }
                FlowState::NoCredential => "Not authenticated. Please visit /auth to connect.",
            };
            Ok(json!({
                "authenticated": authenticated,
                "owner": authenticated.then(|| ctx.flow.owner()),
                "state": state.as_str(),
                "message": message,
            }))
        })
    }
}
