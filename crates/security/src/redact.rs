//! Secret redaction for operator-visible output.
//!
//! Tool output and error text are shown to the operator verbatim, except that
//! anything that looks like a credential is replaced with `[REDACTED]`.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

const REDACTED: &str = "[REDACTED]";

/// Known credential prefixes. Each must start a word.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live_",
    "sk_test_",
    "AKIA",
    "ghp_",
    "gho_",
    "ghs_",
    "github_pat_",
    "xoxb-",
    "xoxp-",
    "AIza",
    "ya29\\.",
    "glpat-",
    "hf_",
    "npm_",
    "dckr_pat_",
];

static PREFIX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = SECRET_PREFIXES.join("|");
    let full = format!("\\b(?:{pattern})[^\\s\"'`,;{{}}\\[\\]]+");
    Regex::new(&full).expect("secret prefix regex is valid")
});

// `password=...`, `api_key: ...`, `token="..."` style assignments.
static ASSIGNMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b((?:api[_-]?key|access[_-]?token|auth[_-]?token|secret|password|passwd)["']?\s*[:=]\s*["']?)[^\s"',;]{6,}"#,
    )
    .expect("secret assignment regex is valid")
});

static PRIVATE_KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)-----BEGIN [A-Z ]*PRIVATE KEY-----.*?(?:-----END [A-Z ]*PRIVATE KEY-----|\z)")
        .expect("private key regex is valid")
});

/// Replace credentials in `text` with `[REDACTED]`.
///
/// Returns `Cow::Borrowed` when nothing was redacted.
#[must_use]
pub fn redact_secrets(text: &str) -> Cow<'_, str> {
    let mut result = Cow::Borrowed(text);

    if result.contains("PRIVATE KEY-----") {
        result = replace(result, &PRIVATE_KEY_REGEX, REDACTED);
    }
    result = replace(result, &PREFIX_REGEX, REDACTED);
    result = replace(result, &ASSIGNMENT_REGEX, "${1}[REDACTED]");
    result
}

fn replace<'a>(text: Cow<'a, str>, regex: &Regex, replacement: &str) -> Cow<'a, str> {
    let replaced = match regex.replace_all(&text, replacement) {
        Cow::Borrowed(_) => None,
        Cow::Owned(s) => Some(s),
    };
    replaced.map_or(text, Cow::Owned)
}
