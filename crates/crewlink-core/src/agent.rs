//! Agents
//!
//! An agent answers one task at a time by talking to its model and running
//! the tool calls the model asks for. The exchange is bounded by `max_iter`
//! rounds; once the budget is spent the model is asked, without tools, for
//! its final answer.

use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_MAX_ITER;
use crate::error::{Error, Result};
use crate::events::{EventSink, RunEvent};
use crate::provider::{ChatModel, LlmMessage, PendingToolCall};
use crate::task::{Task, TaskOutput};
use crate::tools::ToolRegistry;

const FINAL_ANSWER_PROMPT: &str = "You have used all the tool calls available for this task. \
     Do not call any more tools. Give your best complete final answer now, based on what you have.";

pub struct Agent {
    pub id: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    /// Accepted for compatibility; delegation between agents is not performed
    pub allow_delegation: bool,
    llm: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    max_iter: usize,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("model", &self.llm.model())
            .field("tools", &self.tools.names())
            .field("max_iter", &self.max_iter)
            .finish()
    }
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
        llm: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            allow_delegation: false,
            llm,
            tools: ToolRegistry::new(),
            max_iter: DEFAULT_MAX_ITER,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Zero is raised to one round
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    pub fn with_delegation(mut self, allow: bool) -> Self {
        self.allow_delegation = allow;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}. {}\nYour personal goal is: {}",
            self.role, self.backstory, self.goal
        )
    }

    /// Prompt for one task, including upstream outputs
    pub fn task_prompt(&self, task: &Task, context: &[TaskOutput]) -> String {
        let mut prompt = format!("Current Task: {}\n", task.description);

        if !task.params.is_empty() {
            prompt.push_str("\nInputs for this task:\n");
            for (key, value) in &task.params {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let _ = writeln!(prompt, "- {}: {}", key, rendered);
            }
        }

        let _ = write!(
            prompt,
            "\nThis is the expected criteria for your final answer: {}\n\
             You MUST return the actual complete content as the final answer, not a summary.\n",
            task.expected_output
        );

        if !context.is_empty() {
            prompt.push_str("\nThis is the context you're working with:\n");
            let parts: Vec<&str> = context.iter().map(|c| c.raw.as_str()).collect();
            prompt.push_str(&parts.join("\n\n----------\n\n"));
            prompt.push('\n');
        }

        prompt.push_str("\nBegin! This is VERY important to you, use the tools available and give your best Final Answer.");
        prompt
    }

    /// Work a task to its final answer
    pub async fn execute(
        &self,
        task: &Task,
        context: &[TaskOutput],
        events: &EventSink,
    ) -> Result<String> {
        let mut messages = vec![
            LlmMessage::system(self.system_prompt()),
            LlmMessage::user(self.task_prompt(task, context)),
        ];
        let definitions = self.tools.list();

        for round in 1..=self.max_iter {
            debug!(agent = %self.role, task = %task.id, round, "Calling model");
            let response = self.llm.complete(&messages, &definitions).await?;

            if !response.has_tool_calls() {
                return self.final_answer(response.content);
            }

            messages.push(LlmMessage::AssistantToolCalls {
                content: response.content.clone().filter(|c| !c.is_empty()),
                tool_calls: response.tool_calls.clone(),
            });

            for call in &response.tool_calls {
                let result = self.run_tool(call, events).await;
                messages.push(LlmMessage::tool_result(&call.call_id, result));
            }
        }

        warn!(
            agent = %self.role,
            task = %task.id,
            max_iter = self.max_iter,
            "Iteration budget exhausted, asking for a final answer"
        );
        messages.push(LlmMessage::user(FINAL_ANSWER_PROMPT));
        let response = self.llm.complete(&messages, &[]).await?;
        if response.has_tool_calls() {
            debug!(agent = %self.role, "Ignoring tool calls in forced final answer");
        }
        self.final_answer(response.content)
    }

    fn final_answer(&self, content: Option<String>) -> Result<String> {
        match content.map(|c| c.trim().to_string()) {
            Some(answer) if !answer.is_empty() => Ok(answer),
            _ => Err(Error::Agent(format!("'{}' returned an empty answer", self.role))),
        }
    }

    /// Run one requested tool call. Failures become the text the model sees.
    async fn run_tool(&self, call: &PendingToolCall, events: &EventSink) -> String {
        events.emit(RunEvent::ToolInvoked {
            agent_role: self.role.clone(),
            tool: call.name.clone(),
            arguments: call.arguments.clone(),
        });

        let (success, output) = match self.tools.get(&call.name) {
            None => {
                warn!(agent = %self.role, tool = %call.name, "Model requested an unknown tool");
                let available = self.tools.names().join(", ");
                (
                    false,
                    format!("Error: Unknown tool '{}'. Available tools: {}", call.name, available),
                )
            }
            Some(tool) => match tool.execute(call.arguments.clone()).await {
                Ok(output) => (output.success, output.to_llm_string()),
                Err(e) => (false, format!("Error: {}", e)),
            },
        };

        info!(agent = %self.role, tool = %call.name, success, "Tool call finished");
        events.emit(RunEvent::ToolCompleted {
            agent_role: self.role.clone(),
            tool: call.name.clone(),
            success,
            output: output.clone(),
        });

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CompletionResult;
    use crate::tools::{BoxFuture, Tool, ToolDefinition, ToolOutput};
    use crate::error::ToolError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays scripted responses and records what it was sent
    struct Scripted {
        responses: Mutex<Vec<CompletionResult>>,
        seen: Mutex<Vec<(Vec<LlmMessage>, usize)>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<CompletionResult>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            messages: &[LlmMessage],
            tools: &[ToolDefinition],
        ) -> Result<CompletionResult> {
            self.seen.lock().unwrap().push((messages.to_vec(), tools.len()));
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| CompletionResult::text("fallback")))
        }
    }

    struct Echo;

    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text argument"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        fn execute(&self, params: Value) -> BoxFuture<'_, std::result::Result<ToolOutput, ToolError>> {
            Box::pin(async move {
                match params.get("text").and_then(|t| t.as_str()) {
                    Some(text) => Ok(ToolOutput::success(text.to_string())),
                    None => Err(ToolError::InvalidParams("text is required".into())),
                }
            })
        }
    }

    fn call(id: &str, name: &str, arguments: Value) -> CompletionResult {
        CompletionResult {
            content: None,
            tool_calls: vec![PendingToolCall {
                call_id: id.into(),
                name: name.into(),
                arguments,
            }],
        }
    }

    fn agent(llm: Arc<Scripted>) -> Agent {
        Agent::new("a", "Tester", "Test things", "Careful.", llm)
            .with_tools(ToolRegistry::from_tools([Arc::new(Echo) as Arc<dyn Tool>]))
    }

    fn task() -> Task {
        Task::new("t", "a", "Say hi", "A greeting")
    }

    fn last_tool_result(messages: &[LlmMessage]) -> String {
        messages
            .iter()
            .rev()
            .find_map(|m| match m {
                LlmMessage::ToolResult { content, .. } => Some(content.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_answer_without_tools() {
        let llm = Scripted::new(vec![CompletionResult::text("  hi  ")]);
        let answer = agent(llm.clone()).execute(&task(), &[], &EventSink::none()).await.unwrap();
        assert_eq!(answer, "hi");

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, 1);
        assert!(matches!(&seen[0].0[0], LlmMessage::System(s) if s.contains("You are Tester")));
    }

    #[tokio::test]
    async fn test_tool_result_is_fed_back() {
        let llm = Scripted::new(vec![
            call("c1", "echo", json!({"text": "pong"})),
            CompletionResult::text("done"),
        ]);
        let (sink, mut rx) = EventSink::channel();
        let answer = agent(llm.clone()).execute(&task(), &[], &sink).await.unwrap();
        assert_eq!(answer, "done");

        let seen = llm.seen.lock().unwrap();
        assert_eq!(last_tool_result(&seen[1].0), "pong");

        assert!(matches!(rx.try_recv().unwrap(), RunEvent::ToolInvoked { tool, .. } if tool == "echo"));
        assert!(matches!(rx.try_recv().unwrap(), RunEvent::ToolCompleted { success: true, .. }));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_tool_error_are_reported_to_model() {
        let llm = Scripted::new(vec![
            call("c1", "nope", json!({})),
            call("c2", "echo", json!({})),
            CompletionResult::text("recovered"),
        ]);
        let answer = agent(llm.clone()).execute(&task(), &[], &EventSink::none()).await.unwrap();
        assert_eq!(answer, "recovered");

        let seen = llm.seen.lock().unwrap();
        let unknown = last_tool_result(&seen[1].0);
        assert!(unknown.starts_with("Error: Unknown tool 'nope'"));
        assert!(unknown.contains("echo"));
        assert_eq!(last_tool_result(&seen[2].0), "Error: Invalid parameters: text is required");
    }

    #[tokio::test]
    async fn test_budget_exhaustion_forces_final_answer_without_tools() {
        let llm = Scripted::new(vec![
            call("c1", "echo", json!({"text": "1"})),
            call("c2", "echo", json!({"text": "2"})),
            CompletionResult::text("final"),
        ]);
        let answer = agent(llm.clone())
            .with_max_iter(2)
            .execute(&task(), &[], &EventSink::none())
            .await
            .unwrap();
        assert_eq!(answer, "final");

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].1, 0);
        assert!(matches!(seen[2].0.last(), Some(LlmMessage::User(u)) if u.contains("final answer")));
    }

    #[tokio::test]
    async fn test_empty_answer_is_an_error() {
        let llm = Scripted::new(vec![CompletionResult::text("   ")]);
        let err = agent(llm).execute(&task(), &[], &EventSink::none()).await.unwrap_err();
        assert!(matches!(err, Error::Agent(_)));
    }

    #[test]
    fn test_task_prompt_contents() {
        let llm = Scripted::new(vec![]);
        let agent = agent(llm);
        let task = task().with_param("topic", "routing").with_param("tokens", 2000);
        let context = vec![TaskOutput {
            task_id: "plan".into(),
            agent_role: "Planner".into(),
            description: "Plan".into(),
            raw: "step one".into(),
        }];

        let prompt = agent.task_prompt(&task, &context);
        assert!(prompt.starts_with("Current Task: Say hi"));
        assert!(prompt.contains("- topic: routing"));
        assert!(prompt.contains("- tokens: 2000"));
        assert!(prompt.contains("expected criteria for your final answer: A greeting"));
        assert!(prompt.contains("step one"));

        assert!(!agent.task_prompt(&task, &[]).contains("context you're working with"));
    }
}
