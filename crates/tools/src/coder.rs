//! The designated `@coder` tool: argv building, placeholder repair and
//! required-flag validation.
//!
//! Arguments arrive either as JSON (`{"cmd": "read", "args": {"file": "x"}}`)
//! or as CLI text (`read --file x`). Both are turned into the same argv shape,
//! `[subcommand, --flag, value, ...]`, which is what the plugin binary expects
//! after its own name.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::argv::{ParseError, split_args};
use crate::sanitize::{Fix, is_placeholder_value, repair_value_flags};

/// Subcommands of the designated tool and the flags each one requires.
pub const SUBCOMMANDS: &[(&str, &[&str])] = &[
    ("read", &["--file"]),
    ("write", &["--file", "--content"]),
    ("edit", &["--file", "--search", "--replace"]),
    ("search", &["--query"]),
    ("list", &[]),
    ("exec", &["--cmd"]),
];

/// Required flags for `subcommand`, or `None` if it is not a known subcommand.
pub fn required_flags(subcommand: &str) -> Option<&'static [&'static str]> {
    SUBCOMMANDS
        .iter()
        .find(|(name, _)| *name == subcommand)
        .map(|(_, flags)| *flags)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing subcommand (expected one of: {names})", names = subcommand_names())]
    MissingSubcommand,

    #[error("unknown subcommand '{0}' (expected one of: {names})", names = subcommand_names())]
    UnknownSubcommand(String),

    #[error("flag {flag} is given more than once")]
    DuplicateFlag { flag: String },

    #[error("flag {flag} requires a value")]
    MissingValue { flag: String },

    #[error("flag {flag} holds a placeholder instead of a real value")]
    PlaceholderValue { flag: String },
}

impl ValidationError {
    /// The flag the error is about, if any.
    pub fn flag(&self) -> Option<&str> {
        match self {
            ValidationError::MissingValue { flag }
            | ValidationError::PlaceholderValue { flag }
            | ValidationError::DuplicateFlag { flag } => Some(flag),
            _ => None,
        }
    }
}

fn subcommand_names() -> String {
    SUBCOMMANDS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures while turning raw arguments into an argv.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("could not tokenize arguments: {0}")]
    Parse(#[from] ParseError),

    #[error("arguments are not a usable JSON command: {0}")]
    Json(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),
}

/// Build an argv (without the tool name) from sanitized arguments.
///
/// Text that parses as a JSON object or array is converted structurally;
/// everything else goes through the strict tokenizer.
pub fn build_argv(args: &str) -> Result<Vec<String>, ArgsError> {
    let trimmed = args.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return argv_from_json(&value);
        }
    }
    Ok(split_args(args)?)
}

/// Convert a JSON command into argv.
///
/// Objects take the subcommand from `cmd` (or `command`) and flags from the
/// nested `args` object, or from the remaining top-level keys when there is
/// none. Arrays are taken element by element.
pub fn argv_from_json(value: &Value) -> Result<Vec<String>, ArgsError> {
    match value {
        Value::Array(items) => Ok(items.iter().map(scalar_text).collect()),
        Value::Object(map) => {
            let mut argv = Vec::new();
            if let Some(cmd) = map.get("cmd").or_else(|| map.get("command")) {
                argv.push(scalar_text(cmd));
            }

            let flags: Vec<(&String, &Value)> = match map.get("args") {
                Some(Value::Object(nested)) => nested.iter().collect(),
                Some(other) => {
                    return Err(ArgsError::Json(format!(
                        "\"args\" must be an object, got {other}"
                    )));
                }
                None => map
                    .iter()
                    .filter(|(k, _)| k.as_str() != "cmd" && k.as_str() != "command")
                    .collect(),
            };

            for (key, value) in flags {
                match value {
                    Value::Null | Value::Bool(false) => {}
                    Value::Bool(true) => argv.push(format!("--{key}")),
                    other => {
                        argv.push(format!("--{key}"));
                        argv.push(scalar_text(other));
                    }
                }
            }
            Ok(argv)
        }
        other => Err(ArgsError::Json(format!("expected an object or array, got {other}"))),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Drop placeholder values and check the required flags of the subcommand.
///
/// Returns the repairs that were applied. The argv is modified in place.
pub fn repair_and_validate(argv: &mut Vec<String>) -> Result<Vec<Fix>, ValidationError> {
    let fixes = repair_value_flags(argv);
    validate(argv)?;
    if !fixes.is_empty() {
        debug!(fixes = fixes.len(), "Repaired designated tool arguments");
    }
    Ok(fixes)
}

/// Check that the subcommand is known, no flag is repeated and each required
/// flag has a real value.
pub fn validate(argv: &[String]) -> Result<(), ValidationError> {
    let subcommand = argv
        .first()
        .filter(|s| !s.starts_with("--"))
        .ok_or(ValidationError::MissingSubcommand)?;
    let required = required_flags(subcommand)
        .ok_or_else(|| ValidationError::UnknownSubcommand(subcommand.clone()))?;
    if let Some(flag) = repeated_flag(argv) {
        return Err(ValidationError::DuplicateFlag { flag });
    }

    for flag in required {
        match flag_value(argv, flag) {
            None => {
                return Err(ValidationError::MissingValue {
                    flag: (*flag).into(),
                });
            }
            Some(value) if is_placeholder_value(value) => {
                return Err(ValidationError::PlaceholderValue {
                    flag: (*flag).into(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// The first flag name that occurs twice, counting `--flag=value` forms.
fn repeated_flag(argv: &[String]) -> Option<String> {
    let mut seen = Vec::new();
    for token in argv.iter().skip(1) {
        let Some(name) = token.strip_prefix("--").filter(|n| !n.is_empty()) else {
            continue;
        };
        let name = name.split_once('=').map_or(name, |(name, _)| name);
        if seen.contains(&name) {
            return Some(format!("--{name}"));
        }
        seen.push(name);
    }
    None
}

/// The value of `flag` in `argv`, accepting `--flag value` and `--flag=value`.
///
/// A flag followed by another flag, or by nothing, has no value.
pub fn flag_value<'a>(argv: &'a [String], flag: &str) -> Option<&'a str> {
    let prefix = format!("{flag}=");
    for (i, token) in argv.iter().enumerate() {
        if token == flag {
            return argv
                .get(i + 1)
                .map(String::as_str)
                .filter(|next| !next.starts_with("--"));
        }
        if let Some(value) = token.strip_prefix(&prefix) {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cli_text_is_tokenized() {
        assert_eq!(
            build_argv(r#"exec --cmd "ls -la""#).unwrap(),
            strings(&["exec", "--cmd", "ls -la"])
        );
    }

    #[test]
    fn json_object_with_nested_args() {
        let argv = build_argv(r#"{"cmd":"write","args":{"file":"out.go","content":"package main"}}"#)
            .unwrap();
        assert_eq!(argv, strings(&["write", "--content", "package main", "--file", "out.go"]));
    }

    #[test]
    fn json_object_with_flat_keys() {
        let argv = build_argv(r#"{"command":"list","path":"src","recursive":true,"hidden":false}"#)
            .unwrap();
        assert_eq!(argv, strings(&["list", "--path", "src", "--recursive"]));
    }

    #[test]
    fn json_array_elements() {
        let argv = build_argv(r#"["read", "--file", "a.txt"]"#).unwrap();
        assert_eq!(argv, strings(&["read", "--file", "a.txt"]));
    }

    #[test]
    fn json_non_object_args_rejected() {
        assert!(matches!(
            build_argv(r#"{"cmd":"read","args":"--file x"}"#),
            Err(ArgsError::Json(_))
        ));
    }

    #[test]
    fn malformed_json_falls_back_to_tokenizer() {
        assert!(matches!(
            build_argv(r#"{"cmd":"read"#),
            Err(ArgsError::Parse(ParseError::UnbalancedQuote { .. }))
        ));
    }

    #[test]
    fn validation_accepts_complete_calls() {
        assert!(validate(&strings(&["read", "--file", "main.go"])).is_ok());
        assert!(validate(&strings(&["edit", "--file=a", "--search", "x", "--replace", "y"])).is_ok());
        assert!(validate(&strings(&["list"])).is_ok());
    }

    #[test]
    fn validation_names_missing_flag() {
        let err = validate(&strings(&["exec", "--cmd"])).unwrap_err();
        assert_eq!(err, ValidationError::MissingValue { flag: "--cmd".into() });
        assert_eq!(err.flag(), Some("--cmd"));

        let err = validate(&strings(&["write", "--content", "--file", "x"])).unwrap_err();
        assert_eq!(err.flag(), Some("--content"));
    }

    #[test]
    fn validation_rejects_placeholder() {
        let err = validate(&strings(&["search", "--query=\\"])).unwrap_err();
        assert_eq!(err, ValidationError::PlaceholderValue { flag: "--query".into() });
    }

    #[test]
    fn validation_rejects_unknown_or_missing_subcommand() {
        assert_eq!(
            validate(&strings(&["delete", "--file", "x"])),
            Err(ValidationError::UnknownSubcommand("delete".into()))
        );
        assert_eq!(
            validate(&strings(&["--file", "x"])),
            Err(ValidationError::MissingSubcommand)
        );
        assert_eq!(validate(&[]), Err(ValidationError::MissingSubcommand));
    }

    #[test]
    fn validation_rejects_repeated_flags() {
        let argv = build_argv(r#"exec --cmd ls --cmd "rm -rf /""#).unwrap();
        let err = validate(&argv).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateFlag { flag: "--cmd".into() });
        assert_eq!(err.flag(), Some("--cmd"));

        let err = validate(&strings(&["read", "--file=a", "--file", "b"])).unwrap_err();
        assert_eq!(err.flag(), Some("--file"));
    }

    #[test]
    fn validation_messages_list_subcommands() {
        let err = ValidationError::UnknownSubcommand("delete".into());
        assert_eq!(
            err.to_string(),
            "unknown subcommand 'delete' (expected one of: read, write, edit, search, list, exec)"
        );
    }

    #[test]
    fn repair_then_validate() {
        let mut argv = strings(&["search", "--query", "\\", "TODO"]);
        let fixes = repair_and_validate(&mut argv).unwrap();
        assert_eq!(fixes.len(), 1);
        assert_eq!(argv, strings(&["search", "--query", "TODO"]));

        let mut argv = strings(&["search", "--query", "\\"]);
        let err = repair_and_validate(&mut argv).unwrap_err();
        assert_eq!(err, ValidationError::MissingValue { flag: "--query".into() });
    }
}
