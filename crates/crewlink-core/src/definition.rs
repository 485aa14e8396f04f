//! Crew definitions
//!
//! A crew definition is a TOML document declaring the tool providers to
//! launch, the agents and the tasks of one crew run:
//!
//! ```toml
//! name = "github"
//! llm = "gemini/gemini-2.0-flash-001"
//! required_env = ["GITHUB_PERSONAL_ACCESS_TOKEN"]
//!
//! [[providers]]
//! name = "github"
//! command = "docker"
//! args = ["run", "-i", "--rm", "-e", "GITHUB_PERSONAL_ACCESS_TOKEN=${GITHUB_PERSONAL_ACCESS_TOKEN}",
//!         "ghcr.io/github/github-mcp-server"]
//!
//! [[agents]]
//! id = "specialist"
//! role = "GitHub Specialist"
//! goal = "..."
//! backstory = "..."
//! tools = ["github"]
//!
//! [[tasks]]
//! id = "get_user"
//! description = "Use the 'get_me' tool ..."
//! expected_output = "..."
//! agent = "specialist"
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{expand_env, require_env};
use crate::error::{Error, Result};
use crate::presets;
use crate::provider::LlmSelector;

/// Default time a provider gets to answer `initialize` and `tools/list`
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrewDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `"<provider>/<model>"` selector shared by agents without their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<String>,
    #[serde(default = "default_true")]
    pub verbose: bool,
    /// Variables that must be set before any provider is launched
    #[serde(default)]
    pub required_env: Vec<String>,
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
    /// Direct tool invocations run after providers start, before kickoff
    #[serde(default)]
    pub tool_calls: Vec<ToolCallSpec>,
}

/// Launch parameters of a tool-provider subprocess, before `${VAR}` expansion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub id: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    #[serde(default)]
    pub allow_delegation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<String>,
    /// Names of providers whose tools this agent receives
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iter: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    pub id: String,
    pub description: String,
    pub expected_output: String,
    pub agent: String,
    /// Upstream task ids. Omitted means "the previous task", `[]` means none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolCallSpec {
    pub tool: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, Value>,
}

/// Fully resolved launch specification
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

impl LaunchSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl CrewDefinition {
    pub fn from_toml(content: &str) -> Result<Self> {
        let definition: Self = toml::from_str(content)
            .map_err(|e| Error::Definition(format!("Failed to parse crew definition: {}", e)))?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read crew definition {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// A built-in preset name, or else a path to a TOML file
    pub fn from_source(source: &str) -> Result<Self> {
        match presets::get(source) {
            Some(content) => Self::from_toml(content),
            None => {
                let path = Path::new(source);
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "'{}' is neither a preset ({}) nor an existing file",
                        source,
                        presets::names().collect::<Vec<_>>().join(", ")
                    )));
                }
                Self::load(path)
            }
        }
    }

    /// Check referential integrity between providers, agents and tasks
    pub fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            return Err(Error::Definition(format!("crew '{}' declares no tasks", self.name)));
        }

        if let Some(llm) = &self.llm {
            LlmSelector::parse(llm)?;
        }

        let mut providers = HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() || provider.command.is_empty() {
                return Err(Error::Definition(
                    "providers need a non-empty name and command".to_string(),
                ));
            }
            if !providers.insert(provider.name.as_str()) {
                return Err(Error::Definition(format!("duplicate provider '{}'", provider.name)));
            }
        }

        let mut agents = HashSet::new();
        for agent in &self.agents {
            if !agents.insert(agent.id.as_str()) {
                return Err(Error::Definition(format!("duplicate agent '{}'", agent.id)));
            }
            if let Some(unknown) = agent.tools.iter().find(|p| !providers.contains(p.as_str())) {
                return Err(Error::Definition(format!(
                    "agent '{}' uses tools of unknown provider '{}'",
                    agent.id, unknown
                )));
            }
            if agent.max_iter == Some(0) {
                return Err(Error::Definition(format!("agent '{}' has max_iter = 0", agent.id)));
            }
            if let Some(llm) = &agent.llm {
                LlmSelector::parse(llm)?;
            }
        }

        let mut earlier = HashSet::new();
        for task in &self.tasks {
            if !agents.contains(task.agent.as_str()) {
                return Err(Error::Definition(format!(
                    "task '{}' is assigned to unknown agent '{}'",
                    task.id, task.agent
                )));
            }
            for upstream in task.context.iter().flatten() {
                if !earlier.contains(upstream.as_str()) {
                    return Err(Error::Definition(format!(
                        "task '{}' takes context from '{}', which is not an earlier task",
                        task.id, upstream
                    )));
                }
            }
            if !earlier.insert(task.id.as_str()) {
                return Err(Error::Definition(format!("duplicate task '{}'", task.id)));
            }
        }

        Ok(())
    }

    /// Fail with a descriptive error on the first required variable that is
    /// missing or empty
    pub fn check_required_env(&self) -> Result<()> {
        for name in &self.required_env {
            require_env(name)?;
        }
        Ok(())
    }

    /// Expand `${VAR}` references in every provider's arguments and environment
    pub fn resolve_providers(&self) -> Result<Vec<LaunchSpec>> {
        self.providers
            .iter()
            .map(|p| -> Result<LaunchSpec> {
                let args = p
                    .args
                    .iter()
                    .map(|a| expand_env(a))
                    .collect::<Result<Vec<_>>>()?;
                let env = p
                    .env
                    .iter()
                    .map(|(k, v)| -> Result<(String, String)> { Ok((k.clone(), expand_env(v)?)) })
                    .collect::<Result<HashMap<_, _>>>()?;

                Ok(LaunchSpec {
                    name: p.name.clone(),
                    command: p.command.clone(),
                    args,
                    env,
                    timeout: Duration::from_secs(p.timeout_secs.unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS)),
                })
            })
            .collect()
    }

    pub fn agent(&self, id: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name = "demo"

[[providers]]
name = "fs"
command = "npx"
args = ["-y", "server-fs"]

[[agents]]
id = "reader"
role = "Reader"
goal = "Read things"
backstory = "Reads a lot"
tools = ["fs"]

[[tasks]]
id = "read"
description = "Read the file"
expected_output = "The contents"
agent = "reader"
"#;

    #[test]
    fn test_minimal_definition_defaults() {
        let def = CrewDefinition::from_toml(MINIMAL).unwrap();
        assert!(def.verbose);
        assert!(def.llm.is_none());
        assert!(def.required_env.is_empty());
        assert!(!def.agents[0].allow_delegation);
        assert!(def.tasks[0].context.is_none());
        assert!(def.tasks[0].params.is_empty());

        let specs = def.resolve_providers().unwrap();
        assert_eq!(specs[0].args, vec!["-y", "server-fs"]);
        assert_eq!(specs[0].timeout, Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS));
    }

    #[test]
    fn test_unknown_agent_rejected() {
        let toml = MINIMAL.replace("agent = \"reader\"", "agent = \"writer\"");
        let err = CrewDefinition::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("unknown agent 'writer'"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let toml = MINIMAL.replace("tools = [\"fs\"]", "tools = [\"web\"]");
        let err = CrewDefinition::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("unknown provider 'web'"));
    }

    #[test]
    fn test_context_must_reference_earlier_task() {
        let toml = format!(
            "{}\n[[tasks]]\nid = \"summarize\"\ndescription = \"d\"\nexpected_output = \"e\"\nagent = \"reader\"\ncontext = [\"later\"]\n",
            MINIMAL
        );
        let err = CrewDefinition::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("not an earlier task"));

        let ok = toml.replace("[\"later\"]", "[\"read\"]");
        assert!(CrewDefinition::from_toml(&ok).is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = MINIMAL.replace("name = \"demo\"", "name = \"demo\"\nprocess = \"hierarchical\"");
        assert!(matches!(CrewDefinition::from_toml(&toml), Err(Error::Definition(_))));
    }

    #[test]
    fn test_no_tasks_rejected() {
        let def = CrewDefinition::from_toml(MINIMAL).unwrap();
        let mut empty = def.clone();
        empty.tasks.clear();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_params_accept_mixed_values() {
        let toml = format!("{}\n[tasks.params]\ntopic = \"Agents\"\ntokens = 2000\n", MINIMAL);
        let def = CrewDefinition::from_toml(&toml).unwrap();
        assert_eq!(def.tasks[0].params["topic"], "Agents");
        assert_eq!(def.tasks[0].params["tokens"], 2000);
    }

    #[test]
    fn test_launch_spec_builder() {
        let spec = LaunchSpec::new("github", "docker")
            .with_args(["run", "-i"])
            .with_env("TOKEN", "x");
        assert_eq!(spec.args, vec!["run", "-i"]);
        assert_eq!(spec.env.get("TOKEN").map(String::as_str), Some("x"));
    }
}
