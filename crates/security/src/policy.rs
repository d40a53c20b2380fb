//! Policy engine — decides whether a tool call may run.
//!
//! Rules map canonical command prefixes to an [`Action`]. A call is
//! canonicalized with [`normalize_args`], prefixed with the tool name and
//! matched against every rule with [`matches_with_boundary`]; the longest
//! matching pattern wins and no match means [`Action::Ask`].
//!
//! Rules come from a global file (written with defaults on first use) and an
//! optional directory-scoped local file. A local file with `"merge": true`
//! overrides global rules by pattern and appends its new patterns; otherwise it
//! replaces the global list. New rules are written to the active file: the
//! local one when it was loaded, else the global one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::matcher::matches_with_boundary;
use crate::normalize::normalize_args;

/// Directory holding the local policy file, relative to the project directory.
pub const LOCAL_POLICY_DIR: &str = ".toolgate";

/// File name of both the global and local policy files.
pub const POLICY_FILE_NAME: &str = "policy.json";

/// Decision attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Deny,
    Ask,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Allow => f.write_str("allow"),
            Action::Deny => f.write_str("deny"),
            Action::Ask => f.write_str("ask"),
        }
    }
}

impl std::str::FromStr for Action {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Action::Allow),
            "deny" => Ok(Action::Deny),
            "ask" => Ok(Action::Ask),
            other => Err(PolicyError::InvalidRule(format!(
                "unknown action '{other}' (expected allow, deny or ask)"
            ))),
        }
    }
}

/// A single policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub pattern: String,
    pub action: Action,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, action: Action) -> Self {
        Self {
            pattern: pattern.into(),
            action,
        }
    }
}

/// On-disk policy file format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub rules: Vec<Rule>,

    /// Local files only: merge with the global rules instead of replacing them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}

impl PolicyFile {
    /// Update the rule with the same pattern in place, or append it.
    pub fn upsert(&mut self, rule: Rule) {
        upsert(&mut self.rules, rule);
    }
}

fn upsert(rules: &mut Vec<Rule>, rule: Rule) {
    match rules.iter_mut().find(|r| r.pattern == rule.pattern) {
        Some(existing) => existing.action = rule.action,
        None => rules.push(rule),
    }
}

/// The rules written to a fresh global policy file.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new("@coder read", Action::Allow),
        Rule::new("@coder list", Action::Allow),
        Rule::new("@coder search", Action::Allow),
        Rule::new("@coder write", Action::Ask),
        Rule::new("@coder edit", Action::Ask),
        Rule::new("@coder exec", Action::Ask),
        Rule::new("@coder exec --cmd rm", Action::Deny),
        Rule::new("@coder exec --cmd sudo", Action::Deny),
        Rule::new("@shell", Action::Ask),
    ]
}

/// Where the policy files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyPaths {
    pub global: PathBuf,
    pub local: Option<PathBuf>,
}

impl PolicyPaths {
    pub fn new(global: impl Into<PathBuf>) -> Self {
        Self {
            global: global.into(),
            local: None,
        }
    }

    /// Look for a local policy file at `<dir>/.toolgate/policy.json`.
    pub fn with_local_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.local = Some(dir.as_ref().join(LOCAL_POLICY_DIR).join(POLICY_FILE_NAME));
        self
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy file I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid policy file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid rule: {0}")]
    InvalidRule(String),
}

#[derive(Debug, Default)]
struct State {
    global: PolicyFile,
    local: Option<PolicyFile>,
    effective: Vec<Rule>,
}

impl State {
    fn rebuild(&mut self) {
        self.effective = match &self.local {
            None => self.global.rules.clone(),
            Some(local) if local.merge.unwrap_or(false) => {
                let mut merged = self.global.rules.clone();
                for rule in &local.rules {
                    upsert(&mut merged, rule.clone());
                }
                merged
            }
            Some(local) => local.rules.clone(),
        };
    }
}

/// The policy engine. Share it with `Arc`; all access goes through one lock.
#[derive(Debug)]
pub struct PolicyEngine {
    paths: PolicyPaths,
    state: RwLock<State>,
}

impl PolicyEngine {
    /// Load the global file (creating it with [`default_rules`] when absent)
    /// and the local file if one exists.
    pub fn load(paths: PolicyPaths) -> Result<Self, PolicyError> {
        let engine = Self {
            paths,
            state: RwLock::new(State::default()),
        };
        engine.reload()?;
        Ok(engine)
    }

    /// An engine with fixed rules that never touches the filesystem.
    ///
    /// Rules added later are kept in memory only.
    pub fn in_memory(rules: Vec<Rule>) -> Self {
        let mut state = State {
            global: PolicyFile { rules, merge: None },
            local: None,
            effective: Vec::new(),
        };
        state.rebuild();
        Self {
            paths: PolicyPaths::new(PathBuf::new()),
            state: RwLock::new(state),
        }
    }

    /// Re-read both policy files, replacing the in-memory rules.
    pub fn reload(&self) -> Result<(), PolicyError> {
        if self.paths.global.as_os_str().is_empty() {
            return Ok(());
        }

        let global = match read_policy_file(&self.paths.global)? {
            Some(file) => file,
            None => {
                let file = PolicyFile {
                    rules: default_rules(),
                    merge: None,
                };
                write_policy_file(&self.paths.global, &file)?;
                info!(path = %self.paths.global.display(), "Created default policy file");
                file
            }
        };

        let local = match &self.paths.local {
            Some(path) => read_policy_file(path)?,
            None => None,
        };

        let mut state = self.write_state();
        state.global = global;
        state.local = local;
        state.rebuild();
        debug!(
            rules = state.effective.len(),
            local = state.local.is_some(),
            "Policy loaded"
        );
        Ok(())
    }

    /// Decide what to do with `tool` called with `raw_args`.
    pub fn check(&self, tool: &str, raw_args: &str) -> Action {
        let normalized = normalize_args(raw_args);
        let full = normalized.full_command(tool);
        let state = self.read_state();

        let best = state
            .effective
            .iter()
            .filter(|rule| matches_with_boundary(&full, &rule.pattern))
            .max_by_key(|rule| rule.pattern.len());
        let mut action = best.map_or(Action::Ask, |rule| rule.action);

        // Without a subcommand no allow rule may apply; an explicit deny still does.
        if !normalized.has_subcommand() && action == Action::Allow {
            action = Action::Ask;
        }

        debug!(
            tool = %tool,
            command = %full,
            pattern = best.map(|r| r.pattern.as_str()).unwrap_or(""),
            action = %action,
            "Policy decision"
        );
        action
    }

    /// The pattern offered when the operator chooses allow-always or deny-forever.
    pub fn suggested_pattern(&self, tool: &str, raw_args: &str) -> String {
        let normalized = normalize_args(raw_args);
        if normalized.has_subcommand() {
            format!("{tool} {}", normalized.subcommand)
        } else {
            tool.to_string()
        }
    }

    /// Add or update a rule and persist it to the active policy file.
    pub fn add_rule(&self, pattern: &str, action: Action) -> Result<(), PolicyError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(PolicyError::InvalidRule("pattern must not be empty".into()));
        }
        let rule = Rule::new(pattern, action);

        let mut guard = self.write_state();
        let state = &mut *guard;
        let (file, path) = match (state.local.as_mut(), self.paths.local.as_deref()) {
            (Some(local), Some(path)) => (local, path),
            _ => (&mut state.global, self.paths.global.as_path()),
        };
        file.upsert(rule);
        if !path.as_os_str().is_empty() {
            write_policy_file(path, file)?;
        }
        state.rebuild();

        info!(pattern = %pattern, action = %action, "Policy rule added");
        Ok(())
    }

    /// Snapshot of the effective rules, in evaluation order.
    pub fn rules(&self) -> Vec<Rule> {
        self.read_state().effective.clone()
    }

    /// The file new rules are written to.
    pub fn active_path(&self) -> &Path {
        match &self.paths.local {
            Some(path) if self.read_state().local.is_some() => path,
            _ => &self.paths.global,
        }
    }

    pub fn paths(&self) -> &PolicyPaths {
        &self.paths
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_policy_file(path: &Path) -> Result<Option<PolicyFile>, PolicyError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PolicyError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| PolicyError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a policy file readable by its owner only.
fn write_policy_file(path: &Path, file: &PolicyFile) -> Result<(), PolicyError> {
    let io_err = |source: std::io::Error| PolicyError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let json = serde_json::to_string_pretty(file).map_err(|source| PolicyError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut handle = options.open(path).map_err(io_err)?;
    handle.write_all(json.as_bytes()).map_err(io_err)?;
    handle.write_all(b"\n").map_err(io_err)?;

    // `mode` only applies on creation; tighten files that already existed.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!(path = %path.display(), error = %e, "Could not restrict policy file permissions");
        }
    }
    Ok(())
}
