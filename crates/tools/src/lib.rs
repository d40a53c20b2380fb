//! Argument handling and command execution for toolgate.
//!
//! Turns the raw `args` text of a tool call into a safe argv:
//! sanitizing ([`sanitize`]), tokenizing ([`argv`]) and, for the designated
//! `@coder` tool, repairing and validating required flags ([`coder`]).
//! Validated argv are run by the process executors ([`PluginExecutor`],
//! [`ShellExecutor`]); their output is capped for the model by [`output`].

pub mod argv;
pub mod coder;
pub mod output;
pub mod plugin;
mod process;
pub mod sanitize;
pub mod shell;

pub use argv::{ParseError, split_args, split_args_lenient};
pub use coder::{ArgsError, ValidationError};
pub use output::{TruncationLimits, truncate_middle};
pub use plugin::PluginExecutor;
pub use sanitize::{Fix, Sanitized, is_placeholder_value, sanitize_args};
pub use shell::{SHELL_TOOL, ShellExecutor};
