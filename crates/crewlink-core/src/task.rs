//! Tasks and their outputs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::TaskSpec;

/// Where a task takes its context from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskContext {
    /// Output of the task run immediately before, if any
    Previous,
    /// No upstream output
    None,
    /// Outputs of the named earlier tasks, in the listed order
    Tasks(Vec<String>),
}

impl From<Option<Vec<String>>> for TaskContext {
    fn from(value: Option<Vec<String>>) -> Self {
        match value {
            None => Self::Previous,
            Some(ids) if ids.is_empty() => Self::None,
            Some(ids) => Self::Tasks(ids),
        }
    }
}

/// A unit of work assigned to one agent
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub expected_output: String,
    /// Id of the agent that performs the task
    pub agent: String,
    pub context: TaskContext,
    /// Extra named inputs rendered into the prompt
    pub params: BTreeMap<String, Value>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        agent: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent: agent.into(),
            context: TaskContext::Previous,
            params: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl From<&TaskSpec> for Task {
    fn from(spec: &TaskSpec) -> Self {
        Self {
            id: spec.id.clone(),
            description: spec.description.clone(),
            expected_output: spec.expected_output.clone(),
            agent: spec.agent.clone(),
            context: spec.context.clone().into(),
            params: spec.params.clone(),
        }
    }
}

/// Result of a completed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task_id: String,
    pub agent_role: String,
    pub description: String,
    /// Final answer text
    pub raw: String,
}
