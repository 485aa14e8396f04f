//! MCP Client implementation

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::{
    methods, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use crate::transport::Transport;
use crate::{McpError, McpTool, ServerCapabilities, PROTOCOL_VERSION};

/// Default time to wait for a single response
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// MCP Client for connecting to MCP servers
///
/// Requests are serialized: one request is in flight at a time and the
/// transport lock is held until its response arrives.
pub struct McpClient {
    transport: Mutex<Box<dyn Transport>>,
    request_id: AtomicI64,
    request_timeout: Duration,
    server_capabilities: Option<ServerCapabilities>,
}

impl McpClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_boxed(Box::new(transport))
    }

    pub fn from_boxed(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Mutex::new(transport),
            request_id: AtomicI64::new(1),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            server_capabilities: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_capabilities.as_ref()
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Initialize the connection
    pub async fn initialize(&mut self, client_info: ClientInfo) -> Result<ServerInfo, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": client_info.name,
                "version": client_info.version
            }
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::INITIALIZE).with_params(params);
        let result = self.request(request).await?;

        let init: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;

        if init.protocol_version != PROTOCOL_VERSION {
            debug!(
                server_version = %init.protocol_version,
                client_version = PROTOCOL_VERSION,
                "MCP protocol version differs from requested"
            );
        }

        self.server_capabilities = Some(init.capabilities);

        let notification = serde_json::to_value(JsonRpcNotification::new(methods::INITIALIZED))
            .map_err(|e| McpError::Protocol(e.to_string()))?;
        self.transport
            .lock()
            .await
            .send(notification)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let info = init.server_info.unwrap_or_default();
        Ok(ServerInfo {
            name: info.name,
            version: info.version.unwrap_or_default(),
        })
    }

    /// List available tools, following pagination cursors
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_LIST);
            if let Some(c) = &cursor {
                request = request.with_params(serde_json::json!({ "cursor": c }));
            }

            let result = self.request(request).await?;
            let page: ToolsListResult =
                serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(tools)
    }

    /// Call a tool
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_CALL).with_params(params);
        let result = self.request(request).await?;

        serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))
    }

    /// Close the underlying transport
    pub async fn close(&self) -> Result<(), McpError> {
        self.transport
            .lock()
            .await
            .close()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }

    async fn request(&self, request: JsonRpcRequest) -> Result<Value, McpError> {
        let method = request.method.clone();
        let response = tokio::time::timeout(self.request_timeout, self.send_request(request))
            .await
            .map_err(|_| McpError::Timeout(method))??;

        if let Some(error) = response.error {
            return Err(McpError::Server {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| McpError::Protocol("Response has neither result nor error".to_string()))
    }

    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let mut transport = self.transport.lock().await;
        let id = request.id.clone();

        let request_value =
            serde_json::to_value(&request).map_err(|e| McpError::Protocol(e.to_string()))?;

        transport
            .send(request_value)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        loop {
            let value = transport
                .receive()
                .await
                .map_err(|e| McpError::Transport(e.to_string()))?
                .ok_or(McpError::Closed)?;

            let message = match JsonRpcMessage::from_value(value) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed JSON-RPC message");
                    continue;
                }
            };

            match message {
                JsonRpcMessage::Response(response) if response.id == id => return Ok(response),
                JsonRpcMessage::Response(response) => {
                    warn!(expected = %id, got = %response.id, "Discarding response for unknown request");
                }
                JsonRpcMessage::Notification(notification) => {
                    debug!(method = %notification.method, "MCP server notification");
                }
                JsonRpcMessage::Request(server_request) => {
                    // This client advertises no capabilities; only ping is answered positively.
                    let reply = if server_request.method == methods::PING {
                        JsonRpcResponse::success(server_request.id, serde_json::json!({}))
                    } else {
                        JsonRpcResponse::error(server_request.id, JsonRpcError::method_not_found())
                    };
                    let reply =
                        serde_json::to_value(reply).map_err(|e| McpError::Protocol(e.to_string()))?;
                    transport
                        .send(reply)
                        .await
                        .map_err(|e| McpError::Transport(e.to_string()))?;
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl ClientInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, serde::Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion", default)]
    protocol_version: String,
    #[serde(default)]
    capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo", default)]
    server_info: Option<ServerInfoInner>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ServerInfoInner {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<McpTool>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// All text items joined with newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| item.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<String>,
}
