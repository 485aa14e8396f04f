//! Run lifecycle
//!
//! [`CrewRunner`] checks the environment, starts the declared tool
//! providers, runs direct tool calls and the crew, then stops every
//! provider it started. Cleanup happens on every path and never replaces
//! the outcome of the run.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::crew::{Crew, CrewOutput};
use crate::definition::CrewDefinition;
use crate::error::{Error, Result, ToolError};
use crate::events::{EventSink, RunEvent};
use crate::mcp_manager::{McpServerManager, ProviderLauncher, StdioLauncher};
use crate::provider::{genai_factory, ModelFactory};
use crate::tools::ToolDefinition;

/// Outcome of a guarded run plus the result of stopping each provider
#[derive(Debug)]
pub struct RunReport<T = CrewOutput> {
    pub outcome: Result<T>,
    /// Stop result per started provider, in start order
    pub shutdown: Vec<(String, Result<()>)>,
}

impl<T> RunReport<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Names of providers whose stop failed
    pub fn failed_stops(&self) -> Vec<&str> {
        self.shutdown
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Tools exposed by one started provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderTools {
    pub name: String,
    pub tools: Vec<ToolDefinition>,
}

pub struct CrewRunner {
    launcher: Arc<dyn ProviderLauncher>,
    models: ModelFactory,
    settings: Settings,
    llm_override: Option<String>,
    events: EventSink,
}

impl CrewRunner {
    pub fn new(launcher: Arc<dyn ProviderLauncher>, models: ModelFactory) -> Self {
        Self {
            launcher,
            models,
            settings: Settings::default(),
            llm_override: None,
            events: EventSink::none(),
        }
    }

    /// Subprocess providers and genai models
    pub fn stdio() -> Self {
        Self::new(Arc::new(StdioLauncher), genai_factory())
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Use this selector for every agent
    pub fn with_llm(mut self, selector: impl Into<String>) -> Self {
        self.llm_override = Some(selector.into());
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Run a crew definition end to end
    pub async fn run(&self, def: &CrewDefinition) -> RunReport {
        let mut manager = McpServerManager::new(self.launcher.clone());

        let outcome = match self.start_providers(def, &mut manager).await {
            Ok(()) => self.run_crew(def, &manager).await,
            Err(e) => Err(e),
        };

        self.finish(outcome, manager).await
    }

    /// Start the providers, collect their tools and stop them again
    pub async fn list_tools(&self, def: &CrewDefinition) -> RunReport<Vec<ProviderTools>> {
        let mut manager = McpServerManager::new(self.launcher.clone());

        let outcome = self.start_providers(def, &mut manager).await.map(|()| {
            manager
                .provider_names()
                .into_iter()
                .map(|name| ProviderTools {
                    name: name.to_string(),
                    tools: manager
                        .provider_tools(name)
                        .unwrap_or_default()
                        .iter()
                        .map(|t| t.to_definition())
                        .collect(),
                })
                .collect()
        });

        self.finish(outcome, manager).await
    }

    /// Environment check, then providers in declared order. Stops at the
    /// first provider that fails to start.
    async fn start_providers(&self, def: &CrewDefinition, manager: &mut McpServerManager) -> Result<()> {
        def.check_required_env()?;
        let specs = def.resolve_providers()?;

        for spec in &specs {
            self.events.emit(RunEvent::ProviderStarting {
                name: spec.name.clone(),
            });
            info!(server = %spec.name, command = %spec.command, "Starting tool provider");

            match manager.start(spec).await {
                Ok(provider) => {
                    let tools = provider.tools().iter().map(|t| t.name().to_string()).collect();
                    self.events.emit(RunEvent::ProviderReady {
                        name: spec.name.clone(),
                        tools,
                    });
                }
                Err(e) => {
                    self.events.emit(RunEvent::ProviderFailed {
                        name: spec.name.clone(),
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }

        let total = manager.total_tool_count();
        info!(providers = specs.len(), tools = total, "Tool providers ready");
        self.events.emit(RunEvent::ToolsLoaded { total });
        Ok(())
    }

    async fn run_crew(&self, def: &CrewDefinition, manager: &McpServerManager) -> Result<CrewOutput> {
        for call in &def.tool_calls {
            let tool = manager
                .find_tool(&call.tool)
                .ok_or_else(|| ToolError::NotFound(call.tool.clone()))?;
            let output = tool.execute(Value::Object(call.arguments.clone())).await?;
            if !output.success {
                warn!(tool = %call.tool, "Direct tool call reported an error");
            }
            self.events.emit(RunEvent::DirectToolCall {
                tool: call.tool.clone(),
                success: output.success,
                output: output.to_llm_string(),
            });
        }

        let crew = Crew::from_definition(
            def,
            manager,
            &self.models,
            &self.settings,
            self.llm_override.as_deref(),
        )?
        .with_events(self.events.clone());

        crew.kickoff().await
    }

    async fn finish<T>(&self, outcome: Result<T>, mut manager: McpServerManager) -> RunReport<T> {
        if let Err(e) = &outcome {
            error!(error = %e, "Run failed");
            self.events.emit(RunEvent::RunFailed {
                error: e.to_string(),
                causes: causes(e),
            });
        }

        for name in manager.provider_names() {
            self.events.emit(RunEvent::ProviderStopping {
                name: name.to_string(),
            });
        }

        let shutdown = manager.stop_all().await;
        for (name, result) in &shutdown {
            if let Err(e) = result {
                self.events.emit(RunEvent::ProviderStopFailed {
                    name: name.clone(),
                    error: e.to_string(),
                });
            }
        }

        self.events.emit(RunEvent::Finished);
        RunReport { outcome, shutdown }
    }
}

/// Messages of an error's source chain, outermost first, excluding the
/// error itself
fn causes(err: &Error) -> Vec<String> {
    let mut out = Vec::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        out.push(cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_causes_follow_source_chain() {
        let err = Error::Tool(ToolError::NotFound("resolve-library-id".into()));
        assert_eq!(causes(&err), vec!["Tool not found: resolve-library-id"]);
        assert!(causes(&Error::Agent("x".into())).is_empty());
    }

    #[test]
    fn test_report_failed_stops() {
        let report: RunReport<()> = RunReport {
            outcome: Ok(()),
            shutdown: vec![
                ("a".into(), Ok(())),
                (
                    "b".into(),
                    Err(Error::ProviderStop {
                        name: "b".into(),
                        reason: "gone".into(),
                    }),
                ),
            ],
        };
        assert!(report.is_success());
        assert_eq!(report.failed_stops(), vec!["b"]);
    }
}
