//! Configuration for crewlink
//!
//! Handles environment lookups used by crew definitions and the optional
//! user settings file (`<config dir>/crewlink/config.toml`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default LLM selector when neither the crew nor the settings name one
pub const DEFAULT_LLM: &str = "gemini/gemini-2.0-flash-001";

/// Default agent iteration budget
pub const DEFAULT_MAX_ITER: usize = 20;

/// Read a required environment variable. Empty values count as missing.
pub fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::MissingEnv(name.to_string())),
    }
}

/// Expand `${VAR}` references from the process environment
pub fn expand_env(value: &str) -> Result<String> {
    expand_env_with(value, |name| std::env::var(name).ok())
}

/// Expand `${VAR}` references using `lookup`. Unknown variables are a
/// [`Error::MissingEnv`] error.
pub fn expand_env_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            Error::Definition(format!("Unterminated variable reference in '{}'", value))
        })?;

        let name = &after[..end];
        if name.is_empty() {
            return Err(Error::Definition(format!("Empty variable reference in '{}'", value)));
        }
        let resolved = lookup(name).ok_or_else(|| Error::MissingEnv(name.to_string()))?;
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// User settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// LLM selector used when a crew definition has none
    pub default_llm: String,
    /// Agent iteration budget used when an agent sets none
    pub max_iter: usize,
    /// Overrides a crew's `verbose` flag when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_llm: DEFAULT_LLM.to_string(),
            max_iter: DEFAULT_MAX_ITER,
            verbose: None,
        }
    }
}

impl Settings {
    /// Get the default settings path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("crewlink").join("config.toml"))
    }

    /// Load from the default path, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read settings {}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse settings {}: {}", path.display(), e)))
    }
}
