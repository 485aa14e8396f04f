//! GenAI-based LLM provider implementation
//!
//! Tool calls are returned to the caller rather than executed by genai, so
//! the agent loop decides how each call is dispatched.

use async_trait::async_trait;
use futures::StreamExt;
use genai::chat::{ChatMessage, ChatRequest, ChatStreamEvent, Tool as GenAiTool, ToolCall, ToolResponse};
use genai::resolver::{AuthData, AuthResolver};
use genai::{Client, WebConfig};
use std::time::Duration;
use tracing::debug;

use super::{ChatModel, CompletionResult, LlmMessage, LlmSelector, PendingToolCall, ProviderType};
use crate::error::{Error, Result};
use crate::tools::ToolDefinition;

/// A provider implementation using genai
pub struct GenAIProvider {
    client: Client,
    provider_type: ProviderType,
    model: String,
}

impl GenAIProvider {
    /// Default timeout for LLM API requests (5 minutes)
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    fn default_web_config() -> WebConfig {
        WebConfig::default()
            .with_timeout(Self::DEFAULT_TIMEOUT)
            .with_connect_timeout(Duration::from_secs(30))
    }

    /// Create a provider that lets genai find credentials in the environment
    pub fn new(provider_type: ProviderType, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .build();
        Self {
            client,
            provider_type,
            model: model.into(),
        }
    }

    /// Create a provider with a specific API key
    pub fn with_api_key(provider_type: ProviderType, api_key: &str, model: impl Into<String>) -> Self {
        let api_key = api_key.to_string();
        let auth_resolver = AuthResolver::from_resolver_fn(
            move |_model_iden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                Ok(Some(AuthData::from_single(api_key.clone())))
            },
        );

        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .with_auth_resolver(auth_resolver)
            .build();

        Self {
            client,
            provider_type,
            model: model.into(),
        }
    }

    pub fn from_selector(selector: &LlmSelector) -> Self {
        match selector.api_key() {
            Some(key) => Self::with_api_key(selector.provider, &key, selector.model.clone()),
            None => Self::new(selector.provider, selector.model.clone()),
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    /// Model name with the provider namespace, so genai routes to the
    /// selected backend instead of guessing from the model name
    fn genai_model(&self) -> String {
        format!("{}::{}", self.provider_type.as_str(), self.model)
    }

    fn build_request(messages: &[LlmMessage], tools: &[ToolDefinition]) -> ChatRequest {
        let mut chat_req = ChatRequest::default();

        for msg in messages {
            chat_req = match msg {
                LlmMessage::System(text) => chat_req.append_message(ChatMessage::system(text.as_str())),
                LlmMessage::User(text) => chat_req.append_message(ChatMessage::user(text.as_str())),
                LlmMessage::Assistant(text) => {
                    chat_req.append_message(ChatMessage::assistant(text.as_str()))
                }
                LlmMessage::AssistantToolCalls { content, tool_calls } => {
                    if let Some(text) = content.as_deref().filter(|t| !t.is_empty()) {
                        chat_req = chat_req.append_message(ChatMessage::assistant(text));
                    }
                    // Tool calls must travel as a single assistant message.
                    let calls: Vec<ToolCall> = tool_calls
                        .iter()
                        .map(|tc| ToolCall {
                            call_id: tc.call_id.clone(),
                            fn_name: tc.name.clone(),
                            fn_arguments: tc.arguments.clone(),
                            thought_signatures: None,
                        })
                        .collect();
                    chat_req.append_message(calls)
                }
                LlmMessage::ToolResult { call_id, content } => {
                    chat_req.append_message(ToolResponse::new(call_id.clone(), content.clone()))
                }
            };
        }

        if !tools.is_empty() {
            let genai_tools: Vec<GenAiTool> = tools
                .iter()
                .map(|t| {
                    GenAiTool::new(&t.name)
                        .with_description(&t.description)
                        .with_schema(t.parameters.clone())
                })
                .collect();
            chat_req = chat_req.with_tools(genai_tools);
        }

        chat_req
    }
}

#[async_trait]
impl ChatModel for GenAIProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult> {
        let chat_req = Self::build_request(messages, tools);
        debug!(
            model = %self.model,
            provider = %self.provider_type,
            messages = messages.len(),
            tools = tools.len(),
            "Sending chat request"
        );

        // Streaming avoids idle-connection timeouts on long generations.
        let stream_response = self
            .client
            .exec_chat_stream(&self.genai_model(), chat_req, None)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, model = %self.model, "LLM request failed");
                Error::Llm(format!("GenAI error: {:?}", e))
            })?;

        let mut content = String::new();
        let mut tool_calls: Vec<PendingToolCall> = Vec::new();
        let mut stream = stream_response.stream;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => {
                    content.push_str(&chunk.content);
                }
                Ok(ChatStreamEvent::ToolCallChunk(tc)) => {
                    // Each ToolCallChunk contains a complete ToolCall
                    let tool_call = tc.tool_call;
                    tool_calls.push(PendingToolCall {
                        call_id: tool_call.call_id,
                        name: tool_call.fn_name,
                        arguments: tool_call.fn_arguments,
                    });
                }
                Ok(ChatStreamEvent::End(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = ?e, model = %self.model, "LLM stream error");
                    return Err(Error::Llm(format!("GenAI stream error: {:?}", e)));
                }
            }
        }

        debug!(
            model = %self.model,
            content_len = content.len(),
            tool_calls = tool_calls.len(),
            "Chat response received"
        );

        Ok(CompletionResult {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
        })
    }
}
