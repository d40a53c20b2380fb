//! Canonicalization of tool arguments for policy matching.
//!
//! JSON and CLI-style arguments for the same call must produce the same
//! canonical string, and large payloads must never take part in matching.
//! The canonical form is `subcommand positionals... --flag value ...` with
//! flags sorted by name and payload flags removed.

use serde_json::{Map, Value};
use toolgate_tools::{sanitize_args, split_args_lenient};

/// Flags whose values are payloads rather than command shape.
pub const PAYLOAD_KEYS: &[&str] = &[
    "content", "data", "encoding", "body", "payload", "base64", "patch", "diff",
];

/// Canonical form of a tool call's arguments.
///
/// `subcommand` is empty when none could be determined; `normalized` is then
/// empty too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub subcommand: String,
    pub normalized: String,
}

impl Normalized {
    pub fn has_subcommand(&self) -> bool {
        !self.subcommand.is_empty()
    }

    /// The string patterns are matched against: the tool name, followed by
    /// the normalized arguments when there is a subcommand.
    pub fn full_command(&self, tool: &str) -> String {
        if self.has_subcommand() {
            format!("{tool} {}", self.normalized)
        } else {
            tool.to_string()
        }
    }
}

/// Normalize raw tool arguments.
///
/// The arguments are sanitized exactly once, the same way the executor path
/// sanitizes them, so entity-encoded JSON is recognized as JSON. JSON objects
/// and arrays are then decoded structurally; anything else is split with the
/// lenient tokenizer. Malformed input, or a flag given more than once, yields
/// an empty [`Normalized`].
pub fn normalize_args(raw_args: &str) -> Normalized {
    let sanitized = sanitize_args(raw_args);
    let trimmed = sanitized.text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => from_object(&map),
            Ok(Value::Array(items)) => from_array(&items),
            _ => Normalized::default(),
        };
    }
    from_cli_text(&sanitized.text)
}

fn from_cli_text(text: &str) -> Normalized {
    match split_args_lenient(text) {
        Ok(tokens) => from_tokens(&tokens),
        Err(_) => Normalized::default(),
    }
}

fn is_payload_key(key: &str) -> bool {
    let key = key.trim_start_matches('-');
    PAYLOAD_KEYS.iter().any(|p| p.eq_ignore_ascii_case(key))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A flag and the tokens it owns, before rendering.
struct FlagUnit {
    name: String,
    values: Vec<String>,
}

fn render(subcommand: &str, positionals: &[String], mut flags: Vec<FlagUnit>) -> Normalized {
    if subcommand.is_empty() {
        return Normalized::default();
    }
    // A repeated flag has no single canonical value.
    let mut names: Vec<&str> = flags.iter().map(|f| f.name.as_str()).collect();
    names.sort_unstable();
    if names.windows(2).any(|pair| pair[0] == pair[1]) {
        return Normalized::default();
    }
    flags.retain(|f| !is_payload_key(&f.name));
    flags.sort_by(|a, b| a.name.cmp(&b.name));

    let mut parts = vec![subcommand.to_string()];
    parts.extend(positionals.iter().cloned());
    for flag in flags {
        parts.push(format!("--{}", flag.name));
        parts.extend(flag.values);
    }
    Normalized {
        subcommand: subcommand.to_string(),
        normalized: parts.join(" "),
    }
}

fn from_object(map: &Map<String, Value>) -> Normalized {
    let subcommand = match map.get("cmd").or_else(|| map.get("command")) {
        Some(Value::String(s)) => s.trim().to_string(),
        _ => return Normalized::default(),
    };

    let mut positionals = Vec::new();
    let mut flags = Vec::new();
    match map.get("args") {
        Some(Value::Object(nested)) => flags.extend(flags_from_map(nested.iter())),
        Some(Value::String(text)) => return from_cli_text(&format!("{subcommand} {text}")),
        Some(Value::Array(items)) => positionals.extend(items.iter().map(value_text)),
        Some(_) => return Normalized::default(),
        None => flags.extend(flags_from_map(
            map.iter()
                .filter(|(k, _)| !matches!(k.as_str(), "cmd" | "command")),
        )),
    }
    render(&subcommand, &positionals, flags)
}

fn flags_from_map<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> Vec<FlagUnit> {
    entries
        .filter_map(|(key, value)| {
            let values = match value {
                Value::Null => return None,
                Value::Bool(true) => Vec::new(),
                other => vec![value_text(other)],
            };
            Some(FlagUnit {
                name: key.clone(),
                values,
            })
        })
        .collect()
}

fn from_array(items: &[Value]) -> Normalized {
    match items.split_first() {
        Some((Value::String(first), rest)) => {
            let mut tokens = vec![first.clone()];
            tokens.extend(rest.iter().map(value_text));
            from_tokens(&tokens)
        }
        _ => Normalized::default(),
    }
}

/// CLI tokens: the first token is the subcommand (unless it is a flag), the
/// tokens up to the first `--flag` are positionals, and each `--flag` owns the
/// tokens that follow it up to the next `--flag`.
fn from_tokens(tokens: &[String]) -> Normalized {
    let Some((first, rest)) = tokens.split_first() else {
        return Normalized::default();
    };
    if first.is_empty() || first.starts_with('-') {
        return Normalized::default();
    }

    let mut positionals = Vec::new();
    let mut flags: Vec<FlagUnit> = Vec::new();
    for token in rest {
        if let Some(flag) = token.strip_prefix("--").filter(|f| !f.is_empty()) {
            let (name, value) = match flag.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (flag, None),
            };
            flags.push(FlagUnit {
                name: name.to_string(),
                values: value.into_iter().collect(),
            });
        } else if let Some(current) = flags.last_mut() {
            current.values.push(token.clone());
        } else {
            positionals.push(token.clone());
        }
    }
    render(first, &positionals, flags)
}
