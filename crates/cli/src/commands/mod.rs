pub mod init;
pub mod parse;
pub mod policy;
pub mod replay;
pub mod sanitize;

use toolgate_config::AppConfig;
use toolgate_security::{PolicyEngine, PolicyError, PolicyPaths};

/// Build the policy engine from config: the global file plus the local file
/// of `policy.local_dir` (or the current directory).
pub fn policy_engine(config: &AppConfig) -> Result<PolicyEngine, PolicyError> {
    let local_dir = match &config.policy.local_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().unwrap_or_default(),
    };
    let paths = PolicyPaths::new(config.policy.resolved_global_path()).with_local_dir(local_dir);
    PolicyEngine::load(paths)
}
