//! Configuration loading with multi-layer merge

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level stepflow configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StepflowConfig {
    /// Engine and driver defaults
    #[serde(default)]
    pub defaults: Defaults,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine and driver defaults
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Maximum node advances per workflow run (unbounded if unset)
    pub max_transitions: Option<usize>,

    /// Per-step timeout in milliseconds, enforced by the driver
    pub step_timeout: Option<u64>,

    /// Compile string edge conditions in loaded definitions (off if unset)
    #[serde(default)]
    pub compile_conditions: Option<bool>,
}

impl Defaults {
    pub fn compile_conditions(&self) -> bool {
        self.compile_conditions.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Append logs to this file in addition to stderr
    pub file: Option<String>,
}

impl LoggingConfig {
    /// Log file path with `~` expanded
    pub fn file_path(&self) -> Option<PathBuf> {
        self.file
            .as_deref()
            .map(|f| PathBuf::from(shellexpand::tilde(f).into_owned()))
    }
}

impl StepflowConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/stepflow/config.toml
    /// 3. .stepflow/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_dir
            .map(|p| p.join(".stepflow/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".stepflow/config.toml"));

        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        tracing::debug!(?config, "Loaded configuration");
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/stepflow/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stepflow/config.toml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.defaults.max_transitions.is_some() {
            self.defaults.max_transitions = other.defaults.max_transitions;
        }
        if other.defaults.step_timeout.is_some() {
            self.defaults.step_timeout = other.defaults.step_timeout;
        }
        if other.defaults.compile_conditions.is_some() {
            self.defaults.compile_conditions = other.defaults.compile_conditions;
        }
        if other.logging.file.is_some() {
            self.logging.file = other.logging.file;
        }
    }
}
