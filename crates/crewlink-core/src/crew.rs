//! Sequential crews
//!
//! A crew runs its tasks strictly in declared order. Each task sees the
//! outputs selected by its [`TaskContext`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::config::Settings;
use crate::definition::CrewDefinition;
use crate::error::{Error, Result};
use crate::events::{EventSink, RunEvent};
use crate::mcp_manager::McpServerManager;
use crate::provider::{ChatModel, LlmSelector, ModelFactory};
use crate::task::{Task, TaskContext, TaskOutput};
use crate::tools::ToolRegistry;

/// Outputs of a finished crew
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrewOutput {
    pub tasks: Vec<TaskOutput>,
    /// Output of the last task
    pub raw: String,
}

impl std::fmt::Display for CrewOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

pub struct Crew {
    pub name: String,
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    verbose: bool,
    events: EventSink,
}

impl Crew {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agents: Vec::new(),
            tasks: Vec::new(),
            verbose: false,
            events: EventSink::none(),
        }
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Assemble a crew from a definition, drawing tools from the started
    /// providers.
    ///
    /// Model selection: `llm_override`, then the agent's own selector, then
    /// the crew's, then `settings.default_llm`.
    pub fn from_definition(
        def: &CrewDefinition,
        manager: &McpServerManager,
        models: &ModelFactory,
        settings: &Settings,
        llm_override: Option<&str>,
    ) -> Result<Self> {
        let mut cache: HashMap<String, Arc<dyn ChatModel>> = HashMap::new();
        let mut crew = Crew::new(&def.name).with_verbose(settings.verbose.unwrap_or(def.verbose));

        for spec in &def.agents {
            let selector = llm_override
                .or(spec.llm.as_deref())
                .or(def.llm.as_deref())
                .unwrap_or(settings.default_llm.as_str());
            let selector = LlmSelector::parse(selector)?;
            let key = selector.to_string();
            let llm = match cache.get(&key) {
                Some(llm) => llm.clone(),
                None => {
                    let llm = models(&selector)?;
                    cache.insert(key, llm.clone());
                    llm
                }
            };

            let mut tools = ToolRegistry::new();
            for provider in &spec.tools {
                let provided = manager.provider_tools(provider).ok_or_else(|| {
                    Error::Definition(format!(
                        "agent '{}' needs tools from '{}', which is not running",
                        spec.id, provider
                    ))
                })?;
                for tool in provided {
                    tools.register(tool);
                }
            }

            if spec.allow_delegation {
                warn!(agent = %spec.id, "Delegation is not supported, the agent works alone");
            }

            debug!(agent = %spec.id, model = %selector, tools = tools.len(), "Agent assembled");
            crew = crew.with_agent(
                Agent::new(&spec.id, &spec.role, &spec.goal, &spec.backstory, llm)
                    .with_tools(tools)
                    .with_max_iter(spec.max_iter.unwrap_or(settings.max_iter))
                    .with_delegation(spec.allow_delegation),
            );
        }

        for task in &def.tasks {
            crew = crew.with_task(Task::from(task));
        }

        Ok(crew)
    }

    fn agent(&self, id: &str) -> Result<&Agent> {
        self.agents
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::Definition(format!("unknown agent '{}'", id)))
    }

    fn context_for(&self, task: &Task, done: &[TaskOutput]) -> Result<Vec<TaskOutput>> {
        match &task.context {
            TaskContext::Previous => Ok(done.last().cloned().into_iter().collect()),
            TaskContext::None => Ok(Vec::new()),
            TaskContext::Tasks(ids) => ids
                .iter()
                .map(|id| {
                    done.iter().find(|o| &o.task_id == id).cloned().ok_or_else(|| {
                        Error::Definition(format!(
                            "task '{}' takes context from '{}', which has not run",
                            task.id, id
                        ))
                    })
                })
                .collect(),
        }
    }

    /// Run every task in order. The first failing task ends the run.
    pub async fn kickoff(&self) -> Result<CrewOutput> {
        if self.tasks.is_empty() {
            return Err(Error::Definition(format!("crew '{}' has no tasks", self.name)));
        }

        self.events.emit(RunEvent::CrewStarting {
            name: self.name.clone(),
        });
        info!(crew = %self.name, tasks = self.tasks.len(), "Crew kickoff");

        // Agent steps and per-task outputs are only reported when verbose
        let steps = if self.verbose {
            self.events.clone()
        } else {
            EventSink::none()
        };
        let mut done: Vec<TaskOutput> = Vec::with_capacity(self.tasks.len());

        for task in &self.tasks {
            let agent = self.agent(&task.agent)?;
            let context = self.context_for(task, &done)?;

            self.events.emit(RunEvent::TaskStarted {
                task_id: task.id.clone(),
                agent_role: agent.role.clone(),
                description: task.description.clone(),
            });
            if self.verbose {
                info!(task = %task.id, agent = %agent.role, context = context.len(), "Task started");
            }

            let raw = agent
                .execute(task, &context, &steps)
                .await
                .map_err(|e| Error::Task {
                    task: task.id.clone(),
                    reason: e.to_string(),
                })?;

            if self.verbose {
                info!(task = %task.id, agent = %agent.role, output = %raw, "Task completed");
            }
            steps.emit(RunEvent::TaskCompleted {
                task_id: task.id.clone(),
                agent_role: agent.role.clone(),
                output: raw.clone(),
            });

            done.push(TaskOutput {
                task_id: task.id.clone(),
                agent_role: agent.role.clone(),
                description: task.description.clone(),
                raw,
            });
        }

        let raw = done.last().map(|o| o.raw.clone()).unwrap_or_default();
        self.events.emit(RunEvent::CrewFinished { output: raw.clone() });

        Ok(CrewOutput { tasks: done, raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CompletionResult, LlmMessage};
    use crate::tools::ToolDefinition;
    use async_trait::async_trait;

    /// Answers with the text of the last user message's context section
    struct ContextEcho;

    #[async_trait]
    impl ChatModel for ContextEcho {
        fn model(&self) -> &str {
            "context-echo"
        }

        async fn complete(
            &self,
            messages: &[LlmMessage],
            _tools: &[ToolDefinition],
        ) -> Result<CompletionResult> {
            let prompt = match messages.last() {
                Some(LlmMessage::User(p)) => p.clone(),
                _ => String::new(),
            };
            let task = prompt
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches("Current Task: ")
                .to_string();
            let context = prompt
                .split("This is the context you're working with:\n")
                .nth(1)
                .and_then(|rest| rest.split("\n\nBegin!").next())
                .unwrap_or("none")
                .replace("\n\n----------\n\n", "+");
            Ok(CompletionResult::text(format!("{}<{}>", task, context)))
        }
    }

    fn crew() -> Crew {
        Crew::new("ctx").with_agent(Agent::new("a", "Worker", "Work", "Works.", Arc::new(ContextEcho)))
    }

    #[tokio::test]
    async fn test_context_rules() {
        let output = crew()
            .with_task(Task::new("one", "a", "one", "x"))
            .with_task(Task::new("two", "a", "two", "x"))
            .with_task(Task::new("three", "a", "three", "x").with_context(TaskContext::None))
            .with_task(
                Task::new("four", "a", "four", "x")
                    .with_context(TaskContext::Tasks(vec!["one".into(), "three".into()])),
            )
            .kickoff()
            .await
            .unwrap();

        let raws: Vec<&str> = output.tasks.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raws[0], "one<none>");
        assert_eq!(raws[1], "two<one<none>>");
        assert_eq!(raws[2], "three<none>");
        assert_eq!(raws[3], "four<one<none>+three<none>>");
        assert_eq!(output.raw, raws[3]);
        assert_eq!(output.to_string(), raws[3]);
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let (sink, mut rx) = EventSink::channel();
        crew()
            .with_verbose(true)
            .with_events(sink)
            .with_task(Task::new("one", "a", "one", "x"))
            .kickoff()
            .await
            .unwrap();

        assert!(matches!(rx.try_recv().unwrap(), RunEvent::CrewStarting { .. }));
        assert!(matches!(rx.try_recv().unwrap(), RunEvent::TaskStarted { task_id, .. } if task_id == "one"));
        assert!(matches!(rx.try_recv().unwrap(), RunEvent::TaskCompleted { .. }));
        assert!(matches!(rx.try_recv().unwrap(), RunEvent::CrewFinished { .. }));
    }

    #[tokio::test]
    async fn test_quiet_crew_reports_only_progress_and_result() {
        let (sink, mut rx) = EventSink::channel();
        let output = crew()
            .with_events(sink)
            .with_task(Task::new("one", "a", "one", "x"))
            .with_task(Task::new("two", "a", "two", "x"))
            .kickoff()
            .await
            .unwrap();
        assert_eq!(output.raw, "two<one<none>>");

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(!events.iter().any(|e| matches!(e, RunEvent::TaskCompleted { .. })));
        assert_eq!(
            events.last(),
            Some(&RunEvent::CrewFinished {
                output: "two<one<none>>".into()
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_agent_and_empty_crew() {
        let err = crew()
            .with_task(Task::new("one", "ghost", "one", "x"))
            .kickoff()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));

        assert!(matches!(crew().kickoff().await, Err(Error::Definition(_))));
    }
}
