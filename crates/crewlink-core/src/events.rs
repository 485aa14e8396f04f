//! Progress events emitted during a crew run
//!
//! The runner and the crew report what they are doing as [`RunEvent`]s on
//! an unbounded channel; frontends decide how to render them.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    ProviderStarting { name: String },
    ProviderReady { name: String, tools: Vec<String> },
    ProviderFailed { name: String, error: String },
    /// Combined tool count across all started providers
    ToolsLoaded { total: usize },
    DirectToolCall { tool: String, success: bool, output: String },
    CrewStarting { name: String },
    TaskStarted { task_id: String, agent_role: String, description: String },
    ToolInvoked { agent_role: String, tool: String, arguments: Value },
    ToolCompleted { agent_role: String, tool: String, success: bool, output: String },
    TaskCompleted { task_id: String, agent_role: String, output: String },
    CrewFinished { output: String },
    /// The run failed; `causes` lists the error's source chain
    RunFailed { error: String, causes: Vec<String> },
    ProviderStopping { name: String },
    ProviderStopFailed { name: String, error: String },
    Finished,
}

pub type EventReceiver = mpsc::UnboundedReceiver<RunEvent>;

/// Sending half of the event channel; a disconnected sink drops events
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything
    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
