//! JSON-RPC 2.0 over stdio, MCP flavoured.
//!
//! One request per line on stdin, one response per line on stdout.
//! Notifications get no response.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// Protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Incoming JSON-RPC message.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// `None` for notifications.
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Outgoing JSON-RPC message; exactly one of `result` / `error` is set.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A tool advertised by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters of `tools/call`.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Result of `tools/call`. Tool failures are reported here, not as
/// JSON-RPC errors.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolResultContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

impl ToolResultContent {
    fn text(text: String) -> Self {
        Self {
            content_type: "text".to_string(),
            text,
        }
    }
}

/// Tutor server running over stdio
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve until stdin closes
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Grammar tutor server starting...");

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                info!("EOF received, shutting down");
                break;
            }

            if let Some(response_json) = self.handle_line(&line).await {
                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Process one raw input line. Returns the serialized response, if any.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        debug!(request = %trimmed, "Received request");

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => self.handle_request(request).await?,
            Err(e) => {
                error!(error = %e, "Failed to parse request");
                JsonRpcResponse::error(None, -32700, format!("Parse error: {}", e))
            }
        };

        match serde_json::to_string(&response) {
            Ok(json) => {
                debug!(response = %json, "Sending response");
                Some(json)
            }
            Err(e) => {
                error!(error = %e, "Failed to serialize response");
                None
            }
        }
    }

    /// Dispatch a parsed request. `None` for notifications.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                debug!(method = %request.method, "Notification received");
                None
            }
            "tools/list" => Some(JsonRpcResponse::success(
                request.id,
                json!({ "tools": tool_definitions() }),
            )),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(request.id, json!({}))),
            method if is_notification => {
                debug!(method = %method, "Unknown notification, ignoring");
                None
            }
            method => {
                error!(method = %method, "Unknown method");
                Some(JsonRpcResponse::error(
                    request.id,
                    -32601,
                    format!("Method not found: {}", method),
                ))
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": {
                    "name": "grammar-tutor",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, -32602, "Missing params");
        };
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e)),
        };

        info!(tool = %params.name, "Handling tool call");

        let result = match handle_tool_call(&self.state, &params.name, params.arguments).await {
            Ok(value) => ToolCallResult {
                content: vec![ToolResultContent::text(
                    serde_json::to_string_pretty(&value).unwrap_or_else(|e| {
                        error!(error = %e, "Failed to serialize tool result");
                        format!("{{\"error\": \"Serialization failed: {}\"}}", e)
                    }),
                )],
                is_error: None,
            },
            Err(e) => ToolCallResult {
                content: vec![ToolResultContent::text(format!("Error: {}", e))],
                is_error: Some(true),
            },
        };

        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e)),
        }
    }
}

fn session_property() -> Value {
    json!({
        "type": "string",
        "description": "Session to continue. Omit to start a new session; the id is returned in every result."
    })
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Tool {
    let mut properties = properties;
    if let Some(map) = properties.as_object_mut() {
        map.insert("session_id".to_string(), session_property());
    }

    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

/// Every tool the server exposes
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        tool(
            "tutor_quiz_next",
            "Present the next spelling question (a retry question while in retry mode).",
            json!({
                "style": {
                    "type": "string",
                    "enum": ["quiz", "chat"],
                    "description": "'chat' adds an \"I don't know\" choice"
                }
            }),
            &[],
        ),
        tool(
            "tutor_quiz_answer",
            "Submit an answer to the current question and get feedback with the matching rules.",
            json!({
                "question_id": { "type": "integer", "minimum": 1 },
                "answer": { "type": "string" }
            }),
            &["question_id", "answer"],
        ),
        tool(
            "tutor_quiz_retry",
            "Start or stop retrying previously missed questions.",
            json!({
                "stop": { "type": "boolean", "default": false }
            }),
            &[],
        ),
        tool(
            "tutor_quiz_reset",
            "Forget all quiz progress for the session.",
            json!({}),
            &[],
        ),
        tool(
            "tutor_stats",
            "Show answer statistics and growth stage.",
            json!({}),
            &[],
        ),
        tool(
            "tutor_mistakes",
            "Show the mistake notebook with per-category counts, or clear it.",
            json!({
                "clear": { "type": "boolean", "default": false }
            }),
            &[],
        ),
        tool(
            "tutor_rules",
            "Search grammar rules by keyword, or list the rules of one category.",
            json!({
                "term": { "type": "string" },
                "category": {
                    "type": "string",
                    "enum": ["de_dae", "ieyo_yeyo", "eotteokhae_eotteoke", "doe_dwae", "an_anh"]
                }
            }),
            &[],
        ),
        tool(
            "tutor_chat",
            "Ask the AI tutor a free-form spelling question.",
            json!({
                "message": { "type": "string" }
            }),
            &["message"],
        ),
        tool(
            "tutor_explain",
            "Ask the AI tutor to explain the most recent wrong answer.",
            json!({}),
            &[],
        ),
        tool(
            "tutor_models",
            "List the ranked model candidates used for chat.",
            json!({
                "refresh": { "type": "boolean", "default": false }
            }),
            &[],
        ),
    ]
}
