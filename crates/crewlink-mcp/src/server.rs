//! MCP Server implementation (tools only)

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{methods, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::transport::Transport;
use crate::{McpError, McpTool, ServerCapabilities, ToolsCapability, PROTOCOL_VERSION};

/// Handler for MCP requests
#[async_trait]
pub trait McpHandler: Send + Sync {
    /// List available tools
    async fn list_tools(&self) -> Vec<McpTool>;

    /// Call a tool. `Err` is reported to the caller as an `isError` result.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, String>;
}

/// MCP Server
pub struct McpServer<H: McpHandler> {
    handler: Arc<H>,
    capabilities: ServerCapabilities,
    server_name: String,
    server_version: String,
}

impl<H: McpHandler> McpServer<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
                logging: None,
            },
            server_name: "crewlink-mcp".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Serve requests until the peer closes the transport
    pub async fn serve<T: Transport>(&self, mut transport: T) -> Result<(), McpError> {
        while let Some(value) = transport
            .receive()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?
        {
            let message = match JsonRpcMessage::from_value(value) {
                Ok(m) => m,
                Err(e) => {
                    warn!(server = %self.server_name, error = %e, "Malformed JSON-RPC message");
                    continue;
                }
            };

            match message {
                JsonRpcMessage::Request(request) => {
                    let response = self.handle_request(request).await;
                    let value = serde_json::to_value(response)
                        .map_err(|e| McpError::Protocol(e.to_string()))?;
                    if transport.send(value).await.is_err() {
                        break;
                    }
                }
                JsonRpcMessage::Notification(n) => {
                    debug!(server = %self.server_name, method = %n.method, "Notification received");
                }
                JsonRpcMessage::Response(_) => {}
            }
        }

        debug!(server = %self.server_name, "MCP server transport closed");
        Ok(())
    }

    /// Handle a JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request.id),
            methods::PING => JsonRpcResponse::success(request.id, serde_json::json!({})),
            methods::TOOLS_LIST => self.handle_tools_list(request.id).await,
            methods::TOOLS_CALL => self.handle_tools_call(request.id, request.params).await,
            _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found()),
        }
    }

    fn handle_initialize(&self, id: RequestId) -> JsonRpcResponse {
        let result = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": self.capabilities,
            "serverInfo": {
                "name": self.server_name,
                "version": self.server_version
            }
        });

        JsonRpcResponse::success(id, result)
    }

    async fn handle_tools_list(&self, id: RequestId) -> JsonRpcResponse {
        let tools = self.handler.list_tools().await;
        JsonRpcResponse::success(id, serde_json::json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, JsonRpcError::invalid_params());
        };

        let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
            return JsonRpcResponse::error(id, JsonRpcError::invalid_params());
        };

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        let (text, is_error) = match self.handler.call_tool(name, arguments).await {
            Ok(Value::String(s)) => (s, false),
            Ok(other) => (other.to_string(), false),
            Err(e) => (e, true),
        };

        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "content": [{ "type": "text", "text": text }],
                "isError": is_error
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl McpHandler for Echo {
        async fn list_tools(&self) -> Vec<McpTool> {
            vec![McpTool {
                name: "echo".to_string(),
                description: "Echo the input".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            }]
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, String> {
            match name {
                "echo" => Ok(arguments),
                other => Err(format!("unknown tool {}", other)),
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = McpServer::new(Arc::new(Echo));
        let response = server
            .handle_request(JsonRpcRequest::new(RequestId::Number(1), "resources/list"))
            .await;
        assert_eq!(response.error, Some(JsonRpcError::method_not_found()));
    }

    #[tokio::test]
    async fn test_tool_error_is_reported_in_result() {
        let server = McpServer::new(Arc::new(Echo));
        let request = JsonRpcRequest::new(RequestId::Number(2), methods::TOOLS_CALL)
            .with_params(serde_json::json!({ "name": "missing" }));
        let response = server.handle_request(request).await;

        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "unknown tool missing");
    }

    #[tokio::test]
    async fn test_tools_call_requires_name() {
        let server = McpServer::new(Arc::new(Echo));
        let request = JsonRpcRequest::new(RequestId::Number(3), methods::TOOLS_CALL)
            .with_params(serde_json::json!({ "arguments": {} }));
        let response = server.handle_request(request).await;
        assert_eq!(response.error, Some(JsonRpcError::invalid_params()));
    }
}
