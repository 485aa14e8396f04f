//! LLM Provider abstraction
//!
//! Agents talk to models through the [`ChatModel`] trait. The production
//! implementation is [`GenAIProvider`], which reaches OpenAI, Anthropic,
//! Gemini, Groq, DeepSeek, xAI, Cohere and Ollama through the genai
//! framework.
//!
//! Models are selected with `"<provider>/<model>"` strings such as
//! `gemini/gemini-2.0-flash-001`.

mod genai_provider;

pub use genai_provider::GenAIProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::tools::ToolDefinition;

/// Message for LLM API calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LlmMessage {
    System(String),
    User(String),
    Assistant(String),
    /// Assistant turn that requested tool calls
    AssistantToolCalls {
        content: Option<String>,
        tool_calls: Vec<PendingToolCall>,
    },
    /// Result of one tool call, matched by call id
    ToolResult { call_id: String, content: String },
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
        }
    }
}

/// Tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Response from completion that may contain both content and tool calls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResult {
    /// Text content from the assistant (may be present even with tool calls)
    pub content: Option<String>,
    pub tool_calls: Vec<PendingToolCall>,
}

impl CompletionResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A chat-completion backend
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logs
    fn model(&self) -> &str;

    async fn complete(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult>;
}

/// Builds a model from a selector; used when assembling a crew
pub type ModelFactory = Arc<dyn Fn(&LlmSelector) -> Result<Arc<dyn ChatModel>> + Send + Sync>;

/// The factory used outside tests: one genai client per selector
pub fn genai_factory() -> ModelFactory {
    Arc::new(|selector: &LlmSelector| {
        Ok(Arc::new(GenAIProvider::from_selector(selector)) as Arc<dyn ChatModel>)
    })
}

/// Supported LLM provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    Gemini,
    Groq,
    DeepSeek,
    XAI,
    Cohere,
    Ollama,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAI),
            "anthropic" => Ok(ProviderType::Anthropic),
            "gemini" | "google" => Ok(ProviderType::Gemini),
            "groq" => Ok(ProviderType::Groq),
            "deepseek" => Ok(ProviderType::DeepSeek),
            "xai" | "grok" => Ok(ProviderType::XAI),
            "cohere" => Ok(ProviderType::Cohere),
            "ollama" => Ok(ProviderType::Ollama),
            _ => Err(Error::Config(format!("Unknown LLM provider: {}", s))),
        }
    }
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Gemini => "gemini",
            ProviderType::Groq => "groq",
            ProviderType::DeepSeek => "deepseek",
            ProviderType::XAI => "xai",
            ProviderType::Cohere => "cohere",
            ProviderType::Ollama => "ollama",
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some("OPENAI_API_KEY"),
            ProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderType::Gemini => Some("GEMINI_API_KEY"),
            ProviderType::Groq => Some("GROQ_API_KEY"),
            ProviderType::DeepSeek => Some("DEEPSEEK_API_KEY"),
            ProviderType::XAI => Some("XAI_API_KEY"),
            ProviderType::Cohere => Some("COHERE_API_KEY"),
            ProviderType::Ollama => None,
        }
    }

    /// Guess the provider from a bare model name
    pub fn infer(model: &str) -> Self {
        let m = model.to_lowercase();
        if m.starts_with("gpt") || m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4") {
            ProviderType::OpenAI
        } else if m.starts_with("claude") {
            ProviderType::Anthropic
        } else if m.starts_with("gemini") {
            ProviderType::Gemini
        } else if m.starts_with("deepseek") {
            ProviderType::DeepSeek
        } else if m.starts_with("grok") {
            ProviderType::XAI
        } else if m.starts_with("command") {
            ProviderType::Cohere
        } else {
            ProviderType::Ollama
        }
    }
}

/// Parsed `"<provider>/<model>"` selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSelector {
    pub provider: ProviderType,
    pub model: String,
}

impl LlmSelector {
    pub fn parse(selector: &str) -> Result<Self> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(Error::Config("Empty LLM selector".to_string()));
        }

        match selector.split_once('/') {
            Some((provider, model)) if !model.is_empty() => Ok(Self {
                provider: provider.parse()?,
                model: model.to_string(),
            }),
            Some(_) => Err(Error::Config(format!("LLM selector '{}' has no model", selector))),
            None => Ok(Self {
                provider: ProviderType::infer(selector),
                model: selector.to_string(),
            }),
        }
    }

    /// API key from the provider's environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        self.provider
            .api_key_env()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }
}

impl std::fmt::Display for LlmSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_model_selector() {
        let s = LlmSelector::parse("gemini/gemini-2.0-flash-001").unwrap();
        assert_eq!(s.provider, ProviderType::Gemini);
        assert_eq!(s.model, "gemini-2.0-flash-001");
        assert_eq!(s.to_string(), "gemini/gemini-2.0-flash-001");
    }

    #[test]
    fn test_parse_bare_model_infers_provider() {
        assert_eq!(LlmSelector::parse("gpt-4o").unwrap().provider, ProviderType::OpenAI);
        assert_eq!(
            LlmSelector::parse("claude-sonnet-4-5").unwrap().provider,
            ProviderType::Anthropic
        );
        assert_eq!(LlmSelector::parse("llama3.2").unwrap().provider, ProviderType::Ollama);
    }

    #[test]
    fn test_parse_rejects_bad_selectors() {
        assert!(LlmSelector::parse("").is_err());
        assert!(LlmSelector::parse("gemini/").is_err());
        assert!(LlmSelector::parse("nosuch/model").is_err());
    }

    #[test]
    fn test_google_alias() {
        let s = LlmSelector::parse("google/gemini-1.5-pro").unwrap();
        assert_eq!(s.provider, ProviderType::Gemini);
        assert_eq!(s.provider.api_key_env(), Some("GEMINI_API_KEY"));
    }
}
