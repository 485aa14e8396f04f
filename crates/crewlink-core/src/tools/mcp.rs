//! MCP Tool Wrapper
//!
//! Bridges MCP server tools to the crewlink tool system.
//! Each MCP tool is wrapped as a `Tool` implementation so it can be
//! handed to an agent like any other tool.

use std::sync::Arc;

use crewlink_mcp::{McpClient, McpTool};
use serde_json::Value;

use crate::error::ToolError;
use crate::tools::{BoxFuture, Tool, ToolOutput};

/// Wrapper that exposes an MCP tool as a crewlink Tool
pub struct McpToolWrapper {
    tool: McpTool,
    server: String,
    client: Arc<McpClient>,
    schema: Value,
}

impl McpToolWrapper {
    pub fn new(tool: McpTool, server: impl Into<String>, client: Arc<McpClient>) -> Self {
        let schema = sanitize_schema(&tool.input_schema);
        Self {
            tool,
            server: server.into(),
            client,
            schema,
        }
    }

    /// Get the server name this tool belongs to
    pub fn server_name(&self) -> &str {
        &self.server
    }
}

impl Tool for McpToolWrapper {
    fn name(&self) -> &str {
        &self.tool.name
    }

    fn description(&self) -> &str {
        &self.tool.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn execute(&self, params: Value) -> BoxFuture<'_, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let params = match params {
                Value::Null => Value::Object(Default::default()),
                Value::Object(map) => Value::Object(map),
                other => {
                    return Err(ToolError::InvalidParams(format!(
                        "expected an object of arguments, got {}",
                        other
                    )));
                }
            };

            let result = self.client.call_tool(&self.tool.name, params).await.map_err(|e| {
                ToolError::ExecutionFailed(format!(
                    "MCP tool '{}' on server '{}' failed: {}",
                    self.tool.name, self.server, e
                ))
            })?;

            let text = result.text();
            if result.is_error {
                let message = if text.is_empty() {
                    "MCP tool execution failed".to_string()
                } else {
                    text
                };
                return Ok(ToolOutput::error(message));
            }

            let content = if text.is_empty() && !result.content.is_empty() {
                serde_json::to_value(&result.content).unwrap_or(Value::Null)
            } else {
                Value::String(text)
            };

            Ok(ToolOutput::success(content))
        })
    }
}

/// Normalize an MCP input schema for LLM function declarations.
///
/// Drops the `$schema` marker and guarantees an object schema with a
/// `properties` map.
pub fn sanitize_schema(schema: &Value) -> Value {
    let mut map = match schema {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };

    map.remove("$schema");
    map.entry("type").or_insert_with(|| Value::String("object".to_string()));
    if map.get("type").and_then(|t| t.as_str()) == Some("object") {
        map.entry("properties")
            .or_insert_with(|| Value::Object(Default::default()));
    }

    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_strips_schema_marker() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": { "libraryName": { "type": "string" } },
            "required": ["libraryName"]
        });

        let clean = sanitize_schema(&schema);
        assert!(clean.get("$schema").is_none());
        assert_eq!(clean["required"], json!(["libraryName"]));
        assert_eq!(clean["properties"]["libraryName"]["type"], "string");
    }

    #[test]
    fn test_sanitize_fills_empty_schema() {
        assert_eq!(
            sanitize_schema(&Value::Null),
            json!({ "type": "object", "properties": {} })
        );
        assert_eq!(
            sanitize_schema(&json!({})),
            json!({ "type": "object", "properties": {} })
        );
    }
}
