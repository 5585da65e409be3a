//! Integration tests for MCP protocol handling
//!
//! Drives `McpServer::handle_line` with raw JSON-RPC lines, the way stdin
//! delivers them, against an in-memory store. No network is touched.

use serde_json::{json, Value};
use std::sync::Arc;

use grammar_tutor::config::{Config, RequestConfig};
use grammar_tutor::gemini::GeminiClient;
use grammar_tutor::quiz::QuestionBank;
use grammar_tutor::server::{AppState, McpServer};
use grammar_tutor::storage::SqliteStorage;

async fn create_server() -> McpServer {
    let config = Config::default();
    let storage = SqliteStorage::new_in_memory().await.unwrap();
    let gemini = GeminiClient::new(&config.gemini, RequestConfig::default()).unwrap();
    McpServer::new(Arc::new(AppState::new(
        config,
        storage,
        gemini,
        QuestionBank::builtin(),
    )))
}

/// Send one request line and parse the response line
async fn send(server: &McpServer, request: Value) -> Value {
    let line = server
        .handle_line(&request.to_string())
        .await
        .expect("request should produce a response");
    serde_json::from_str(&line).expect("Failed to parse JSON-RPC response")
}

/// Verify JSON-RPC 2.0 response structure
fn assert_valid_jsonrpc_response(response: &Value) {
    assert_eq!(response["jsonrpc"], "2.0", "Invalid JSON-RPC version");
    assert!(
        response.get("result").is_some() != response.get("error").is_some(),
        "Response must have exactly one of result or error"
    );
}

/// Decode the JSON payload of a successful tool result
fn tool_payload(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

async fn call_tool(server: &McpServer, id: u64, name: &str, arguments: Value) -> Value {
    send(
        server,
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }),
    )
    .await
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_handshake() {
        let server = create_server().await;

        let response = send(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "test-client", "version": "1.0.0" }
                }
            }),
        )
        .await;

        assert_valid_jsonrpc_response(&response);
        assert_eq!(response["id"], 1);
        let result = &response["result"];
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert!(result["capabilities"]["tools"].is_object());
        assert_eq!(result["serverInfo"]["name"], "grammar-tutor");

        let ack = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(ack.is_none(), "notifications get no response");
    }

    #[tokio::test]
    async fn test_ping() {
        let server = create_server().await;
        let response = send(&server, json!({"jsonrpc": "2.0", "id": "p", "method": "ping"})).await;

        assert_valid_jsonrpc_response(&response);
        assert_eq!(response["id"], "p");
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn test_parse_error() {
        let server = create_server().await;
        let line = server.handle_line("this is not json").await.unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();

        assert_valid_jsonrpc_response(&response);
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let server = create_server().await;
        let response = send(
            &server,
            json!({"jsonrpc": "2.0", "id": 9, "method": "prompts/list"}),
        )
        .await;

        assert_eq!(response["error"]["code"], -32601);
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("prompts/list"));
    }
}

#[cfg(test)]
mod tools_tests {
    use super::*;

    #[tokio::test]
    async fn test_tools_list_schemas() {
        let server = create_server().await;
        let response = send(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;

        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 10);
        for tool in tools {
            assert!(tool["name"].as_str().unwrap().starts_with("tutor_"));
            assert!(!tool["description"].as_str().unwrap().is_empty());
            assert_eq!(tool["inputSchema"]["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_session_carries_across_calls() {
        let server = create_server().await;

        let first = tool_payload(&call_tool(&server, 3, "tutor_quiz_next", json!({})).await);
        let session_id = first["session_id"].as_str().unwrap().to_string();
        let question = &first["commands"][0];
        let qid = question["question_id"].clone();
        let choice = question["choices"][0].clone();

        let answered = tool_payload(
            &call_tool(
                &server,
                4,
                "tutor_quiz_answer",
                json!({"session_id": session_id, "question_id": qid, "answer": choice}),
            )
            .await,
        );
        assert_eq!(answered["session_id"], session_id.as_str());
        assert_eq!(answered["commands"][0]["type"], "feedback");

        let stats = tool_payload(
            &call_tool(&server, 5, "tutor_stats", json!({"session_id": session_id})).await,
        );
        let text = stats["commands"][0]["text"].as_str().unwrap();
        assert!(text.contains("1개"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_tool_errors() {
        let server = create_server().await;

        let response = call_tool(&server, 6, "tutor_quiz_answer", json!({"question_id": 1})).await;
        assert_valid_jsonrpc_response(&response);
        assert_eq!(response["result"]["isError"], true);
        assert!(response["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("answer"));
    }

    #[tokio::test]
    async fn test_chat_without_key_is_tool_error() {
        let server = create_server().await;

        let response = call_tool(&server, 7, "tutor_chat", json!({"message": "안녕하세요"})).await;
        assert_eq!(response["result"]["isError"], true);
        assert!(response["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("GOOGLE_API_KEY"));
    }

    #[tokio::test]
    async fn test_retry_without_mistakes_is_a_warning() {
        let server = create_server().await;

        let payload = tool_payload(&call_tool(&server, 8, "tutor_quiz_retry", json!({})).await);
        assert_eq!(payload["commands"][0]["type"], "notice");
        assert_eq!(payload["commands"][0]["level"], "warning");
    }
}
