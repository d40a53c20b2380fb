//! Configuration loading, validation, and management for toolgate.
//!
//! Loads configuration from `~/.toolgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Hard ceiling for the number of model turns in one orchestrator run.
pub const MAX_TURNS_LIMIT: u32 = 50;

/// The root configuration structure.
///
/// Maps directly to `~/.toolgate/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Orchestrator behaviour
    #[serde(default)]
    pub agent: AgentConfig,

    /// Policy file locations
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Output truncation windows
    #[serde(default)]
    pub output: OutputConfig,

    /// Command execution settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Protocol strictness of an orchestrator session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Any registered tool may be called; legacy command blocks go to the menu.
    #[default]
    Default,
    /// Strict persona: only the designated tool, reasoning required,
    /// single-line arguments, no legacy command blocks.
    Coder,
}

impl AgentMode {
    pub fn is_strict(self) -> bool {
        matches!(self, AgentMode::Coder)
    }
}

impl std::str::FromStr for AgentMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(AgentMode::Default),
            "coder" => Ok(AgentMode::Coder),
            other => Err(ConfigError::ValidationError(format!(
                "unknown agent mode '{other}' (expected 'default' or 'coder')"
            ))),
        }
    }
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentMode::Default => f.write_str("default"),
            AgentMode::Coder => f.write_str("coder"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub mode: AgentMode,

    /// Requested turn budget; clamped to [`MAX_TURNS_LIMIT`].
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// The only tool the strict mode accepts.
    #[serde(default = "default_designated_tool")]
    pub designated_tool: String,

    /// Prefix every tool name carries in the invocation syntax.
    #[serde(default = "default_tool_prefix")]
    pub tool_prefix: String,
}

fn default_max_turns() -> u32 {
    10
}
fn default_designated_tool() -> String {
    "@coder".into()
}
fn default_tool_prefix() -> String {
    "@".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: AgentMode::default(),
            max_turns: default_max_turns(),
            designated_tool: default_designated_tool(),
            tool_prefix: default_tool_prefix(),
        }
    }
}

impl AgentConfig {
    /// The turn budget actually used by the orchestrator.
    pub fn effective_max_turns(&self) -> u32 {
        self.max_turns.clamp(1, MAX_TURNS_LIMIT)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Global policy file; defaults to `~/.toolgate/policy.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_path: Option<PathBuf>,

    /// Directory searched for a local `.toolgate/policy.json`; defaults to the
    /// current working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<PathBuf>,
}

impl PolicyConfig {
    pub fn resolved_global_path(&self) -> PathBuf {
        self.global_path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("policy.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Tool output longer than this is truncated before it is fed back.
    #[serde(default = "default_max_feedback_chars")]
    pub max_feedback_chars: usize,

    #[serde(default = "default_head_chars")]
    pub head_chars: usize,

    #[serde(default = "default_tail_chars")]
    pub tail_chars: usize,

    /// Older history messages longer than this are shortened in the
    /// outgoing context only; stored history is never modified.
    #[serde(default = "default_max_history_message_chars")]
    pub max_history_message_chars: usize,
}

fn default_max_feedback_chars() -> usize {
    30_000
}
fn default_head_chars() -> usize {
    12_000
}
fn default_tail_chars() -> usize {
    12_000
}
fn default_max_history_message_chars() -> usize {
    8_000
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_feedback_chars: default_max_feedback_chars(),
            head_chars: default_head_chars(),
            tail_chars: default_tail_chars(),
            max_history_message_chars: default_max_history_message_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Directory holding `toolgate-<tool>` plugin binaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_dir: Option<PathBuf>,

    /// Explicit tool name → binary path overrides.
    #[serde(default)]
    pub plugins: HashMap<String, PathBuf>,

    /// Shell used for legacy command blocks.
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_timeout_secs() -> u64 {
    120
}
fn default_shell() -> String {
    "sh".into()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            plugin_dir: None,
            plugins: HashMap::new(),
            shell: default_shell(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (`~/.toolgate/config.toml`).
    ///
    /// Environment variables override file values:
    /// - `TOOLGATE_MODE` (`default` | `coder`)
    /// - `TOOLGATE_MAX_TURNS`
    /// - `TOOLGATE_POLICY` (global policy file path)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup function.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(mode) = lookup("TOOLGATE_MODE") {
            self.agent.mode = mode.parse()?;
        }

        if let Some(turns) = lookup("TOOLGATE_MAX_TURNS") {
            self.agent.max_turns = turns.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("TOOLGATE_MAX_TURNS is not a number: {turns}"))
            })?;
        }

        if let Some(policy) = lookup("TOOLGATE_POLICY") {
            self.policy.global_path = Some(PathBuf::from(policy));
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolgate")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be at least 1".into(),
            ));
        }

        if self.agent.tool_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "agent.tool_prefix must not be empty".into(),
            ));
        }

        if !self
            .agent
            .designated_tool
            .starts_with(&self.agent.tool_prefix)
        {
            return Err(ConfigError::ValidationError(format!(
                "agent.designated_tool '{}' must start with the tool prefix '{}'",
                self.agent.designated_tool, self.agent.tool_prefix
            )));
        }

        if self.output.head_chars + self.output.tail_chars > self.output.max_feedback_chars {
            return Err(ConfigError::ValidationError(
                "output.head_chars + output.tail_chars must not exceed output.max_feedback_chars"
                    .into(),
            ));
        }

        if self.executor.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "executor.timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
