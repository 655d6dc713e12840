//! Monitor configuration.
//!
//! Required at startup: a JSON file declaring the operating mode and the
//! per-incident action budget. Missing file or invalid schema is a startup
//! error. The observer and reasoner sections are optional with defaults.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// What the agent is allowed to do with an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Diagnose and report only
    Observe,
    /// Diagnose, plan and execute remediations
    Remediate,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Observe => "observe",
            Mode::Remediate => "remediate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    /// Replan budget per incident before escalating to a human
    pub max_actions_per_incident: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverSettings {
    /// Debounce window for batching filtered log events
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
        }
    }
}

fn default_window_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonerSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Ask for a thinking pass before the answer
    #[serde(default = "default_think")]
    pub think: bool,
}

impl Default for ReasonerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            think: default_think(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_model() -> String {
    "qwen3:8b".to_string()
}

fn default_think() -> bool {
    true
}

/// Top-level monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub mode: Mode,

    pub constraints: Constraints,

    #[serde(default)]
    pub observer: ObserverSettings,

    #[serde(default)]
    pub reasoner: ReasonerSettings,
}

impl MonitorConfig {
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: MonitorConfig =
            serde_json::from_str(contents).context("monitor config does not match the schema")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read monitor config {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("invalid monitor config {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.constraints.max_actions_per_incident == 0 {
            anyhow::bail!("constraints.maxActionsPerIncident must be a positive integer");
        }
        Ok(())
    }
}
