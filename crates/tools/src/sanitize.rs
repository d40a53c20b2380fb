//! Argument sanitizer.
//!
//! Models routinely corrupt the `args` attribute of a tool call: attribute
//! values arrive HTML-escaped, long commands are wrapped with shell line
//! continuations, and strings are cut off right after a backslash. The steps
//! below undo those artifacts before the text reaches the tokenizer. Each step
//! is a separate public function so it can be tested on its own.
//!
//! Entities are decoded exactly once, so a literal `&amp;` written by the
//! model survives as `&amp;`. The continuation and backslash steps are then
//! repeated until the text stops changing; each of them shortens the text, so
//! the loop terminates. Sanitizing an already sanitized string is a no-op
//! unless the decoded text itself still contains an entity reference.

use std::fmt;

use tracing::{debug, warn};

/// Flags of the designated tool that must carry a real value.
pub const VALUE_FLAGS: &[&str] = &["--content", "--search", "--replace", "--query", "--cmd"];

/// A repair applied to the raw arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fix {
    DecodedEntities { count: usize },
    NormalizedLineEndings,
    JoinedLineContinuations { count: usize },
    StrippedTrailingBackslashes { count: usize },
    DroppedPlaceholder { flag: String, placeholder: String },
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fix::DecodedEntities { count } => write!(f, "decoded {count} HTML entities"),
            Fix::NormalizedLineEndings => f.write_str("normalized CRLF line endings"),
            Fix::JoinedLineContinuations { count } => {
                write!(f, "collapsed {count} line continuations")
            }
            Fix::StrippedTrailingBackslashes { count } => {
                write!(f, "stripped {count} dangling trailing backslashes")
            }
            Fix::DroppedPlaceholder { flag, placeholder } => {
                write!(f, "dropped placeholder value {placeholder:?} after {flag}")
            }
        }
    }
}

/// The cleaned argument string and the repairs that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub text: String,
    pub fixes: Vec<Fix>,
}

impl Sanitized {
    pub fn changed(&self) -> bool {
        !self.fixes.is_empty()
    }
}

/// Decode entities once, then run the remaining repair steps until the text
/// is stable.
pub fn sanitize_args(raw: &str) -> Sanitized {
    let mut fixes = Vec::new();

    let (decoded, count) = decode_entities(raw);
    if count > 0 {
        fixes.push(Fix::DecodedEntities { count });
    }
    let mut text = normalize_line_endings(&decoded);
    if text != decoded {
        fixes.push(Fix::NormalizedLineEndings);
    }

    loop {
        let (collapsed, joined) = collapse_line_continuations(&text);
        if joined > 0 {
            fixes.push(Fix::JoinedLineContinuations { count: joined });
        }
        let (stripped, removed) = strip_trailing_backslashes(&collapsed);
        if removed > 0 {
            fixes.push(Fix::StrippedTrailingBackslashes { count: removed });
        }

        if stripped == text {
            break;
        }
        text = stripped;
    }

    if !fixes.is_empty() {
        debug!(fixes = fixes.len(), "Sanitized tool arguments");
    }
    Sanitized { text, fixes }
}

// ── Step 1: entities and line endings ───────────────────────

/// Decode the HTML entities models emit inside attribute values.
///
/// Named entities `&quot; &#39; &apos; &lt; &gt; &amp;` and numeric
/// `&#NN;` / `&#xHH;` references are decoded in a single left-to-right pass,
/// so `&amp;quot;` becomes `&quot;` and not `"`. Unknown or malformed
/// references are kept verbatim. Returns the decoded text and the number of
/// entities replaced.
pub fn decode_entities(input: &str) -> (String, usize) {
    if !input.contains('&') {
        return (input.to_string(), 0);
    }

    let mut out = String::with_capacity(input.len());
    let mut count = 0;
    let mut rest = input;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        match decode_one(candidate) {
            Some((ch, consumed)) => {
                out.push(ch);
                count += 1;
                rest = &candidate[consumed..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    (out, count)
}

/// Decode one entity at the start of `s` (which begins with `&`).
fn decode_one(s: &str) -> Option<(char, usize)> {
    let end = s.find(';')?;
    // Longest reference we understand is `&#x10FFFF;`.
    if end > 9 {
        return None;
    }
    let name = &s[1..end];
    let ch = match name {
        "quot" => '"',
        "apos" => '\'',
        "lt" => '<',
        "gt" => '>',
        "amp" => '&',
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some((ch, end + 1))
}

/// Convert CRLF and lone CR to LF.
pub fn normalize_line_endings(input: &str) -> String {
    if !input.contains('\r') {
        return input.to_string();
    }
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Step 2: line continuations ──────────────────────────────

/// Collapse `\` + optional spaces/tabs + newline.
///
/// Inside a quoted span the continuation is removed so the quoted text joins
/// across the break; outside quotes it becomes a single space so the words on
/// either side stay separate tokens. Returns the text and the number of
/// continuations collapsed.
pub fn collapse_line_continuations(input: &str) -> (String, usize) {
    if !input.contains('\\') {
        return (input.to_string(), 0);
    }

    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut count = 0;
    let mut single = false;
    let mut double = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            if let Some(newline) = continuation_end(&chars, i + 1) {
                if !single && !double {
                    out.push(' ');
                }
                count += 1;
                i = newline + 1;
                continue;
            }
            if single {
                out.push(c);
                i += 1;
            } else {
                // Escape: copy the escaped character untouched.
                out.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                }
                i += 2;
            }
            continue;
        }

        match c {
            '\'' if !double => single = !single,
            '"' if !single => double = !double,
            _ => {}
        }
        out.push(c);
        i += 1;
    }

    (out, count)
}

/// If `chars[from..]` is optional horizontal whitespace then `\n`, return the
/// index of the newline.
fn continuation_end(chars: &[char], from: usize) -> Option<usize> {
    let mut j = from;
    while let Some(&c) = chars.get(j) {
        match c {
            ' ' | '\t' => j += 1,
            '\n' => return Some(j),
            _ => return None,
        }
    }
    None
}

// ── Step 3: dangling trailing backslashes ───────────────────

/// Strip the dangling escape at the very end of the input.
///
/// Only an unquoted run with an unpaired escape is touched (the strict
/// tokenizer would reject it), and only its last backslash is removed:
/// `foo\\\` becomes `foo\\`, keeping the escaped pair. `foo\\` is an
/// escaped backslash and stays. Every strip is logged. Returns the text and
/// the number of backslashes removed.
pub fn strip_trailing_backslashes(input: &str) -> (String, usize) {
    let trimmed = input.trim_end_matches('\\');
    let run = input.len() - trimmed.len();
    if run % 2 == 0 || in_quotes_at_end(trimmed) {
        return (input.to_string(), 0);
    }

    let kept = &input[..input.len() - 1];
    warn!(
        run,
        tail = %tail_preview(kept),
        "Stripped dangling trailing backslash from tool arguments"
    );
    (kept.to_string(), 1)
}

/// Whether the text ends inside an open quote or an open escape.
fn in_quotes_at_end(s: &str) -> bool {
    let mut single = false;
    let mut double = false;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if !single => {
                chars.next();
            }
            '\'' if !double => single = !single,
            '"' if !single => double = !double,
            _ => {}
        }
    }
    single || double
}

fn tail_preview(s: &str) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(24)).collect()
}

// ── Step 4: placeholder values on value flags ───────────────

/// Whether `token` is a clearly invalid stand-in for a real value.
///
/// Empty, a lone backslash, or a backslash followed only by punctuation and
/// whitespace. Anything carrying a letter or digit (including the literal
/// two-character text `\n`) is treated as a real value.
pub fn is_placeholder_value(token: &str) -> bool {
    if token.is_empty() {
        return true;
    }
    let Some(rest) = token.strip_prefix('\\') else {
        return false;
    };
    rest.chars()
        .all(|c| c.is_ascii_punctuation() || c.is_whitespace())
}

/// Drop placeholder tokens that follow one of [`VALUE_FLAGS`].
///
/// After the placeholder is dropped the next token, if any, becomes the
/// flag's value. When no token follows, or the next token is another flag,
/// the flag is left without a value and validation rejects the call.
pub fn repair_value_flags(argv: &mut Vec<String>) -> Vec<Fix> {
    let mut fixes = Vec::new();
    let mut i = 0;
    while i < argv.len() {
        if VALUE_FLAGS.contains(&argv[i].as_str()) {
            while i + 1 < argv.len() && is_placeholder_value(&argv[i + 1]) {
                let placeholder = argv.remove(i + 1);
                warn!(flag = %argv[i], placeholder = %placeholder, "Dropped placeholder flag value");
                fixes.push(Fix::DroppedPlaceholder {
                    flag: argv[i].clone(),
                    placeholder,
                });
            }
        }
        i += 1;
    }
    fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        let (out, n) = decode_entities("exec --cmd &quot;ls &lt;dir&gt;&quot; &#39;x&#x27; &amp;&amp;");
        assert_eq!(out, r#"exec --cmd "ls <dir>" 'x' &&"#);
        assert_eq!(n, 8);
    }

    #[test]
    fn entity_decoding_is_single_pass() {
        let (out, n) = decode_entities("&amp;quot;");
        assert_eq!(out, "&quot;");
        assert_eq!(n, 1);
    }

    #[test]
    fn unknown_entities_are_kept() {
        let (out, n) = decode_entities("a & b &nbsp; &#xZZ; &;");
        assert_eq!(out, "a & b &nbsp; &#xZZ; &;");
        assert_eq!(n, 0);
    }

    #[test]
    fn crlf_normalized() {
        assert_eq!(normalize_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn continuation_outside_quotes_becomes_space() {
        let (out, n) = collapse_line_continuations("exec --cmd \\  \n\"ls\"");
        assert_eq!(out, "exec --cmd  \"ls\"");
        assert_eq!(n, 1);
        let (out, _) = collapse_line_continuations("a\\\nb");
        assert_eq!(out, "a b");
    }

    #[test]
    fn continuation_inside_quotes_is_removed() {
        let (out, n) = collapse_line_continuations("exec --cmd \"go test \\\n./...\"");
        assert_eq!(out, "exec --cmd \"go test ./...\"");
        assert_eq!(n, 1);
        let (out, _) = collapse_line_continuations("'one\\\ntwo'");
        assert_eq!(out, "'onetwo'");
    }

    #[test]
    fn escaped_backslash_before_newline_is_not_a_continuation() {
        let input = "a\\\\\nb";
        let (out, n) = collapse_line_continuations(input);
        assert_eq!(out, input);
        assert_eq!(n, 0);
    }

    #[test]
    fn strips_dangling_backslash() {
        assert_eq!(strip_trailing_backslashes(r"search --query foo\"), ("search --query foo".into(), 1));
        assert_eq!(strip_trailing_backslashes(r"foo\\\"), (r"foo\\".into(), 1));
    }

    #[test]
    fn keeps_escaped_or_quoted_backslashes() {
        assert_eq!(strip_trailing_backslashes(r"foo\\"), (r"foo\\".into(), 0));
        assert_eq!(strip_trailing_backslashes(r"'C:\dir\"), (r"'C:\dir\".into(), 0));
        assert_eq!(strip_trailing_backslashes("plain"), ("plain".into(), 0));
    }

    #[test]
    fn sanitize_runs_all_steps() {
        let s = sanitize_args("exec --cmd &quot;make \\\r\n  test&quot; \\");
        assert_eq!(s.text, "exec --cmd \"make   test\" ");
        assert!(s.fixes.contains(&Fix::StrippedTrailingBackslashes { count: 1 }));
        assert!(s.fixes.contains(&Fix::NormalizedLineEndings));
        assert!(s.changed());
    }

    #[test]
    fn sanitize_clean_input_is_untouched() {
        let s = sanitize_args("read --file main.go");
        assert_eq!(s.text, "read --file main.go");
        assert!(!s.changed());
    }

    #[test]
    fn sanitize_decodes_entities_once() {
        let s = sanitize_args("write --content &amp;quot;hi&amp;quot;");
        assert_eq!(s.text, "write --content &quot;hi&quot;");

        let s = sanitize_args("write --file a.html --content 'a &amp;amp; b'");
        assert_eq!(s.text, "write --file a.html --content 'a &amp; b'");
        assert_eq!(s.fixes, vec![Fix::DecodedEntities { count: 1 }]);
    }

    #[test]
    fn sanitize_keeps_escaped_pair_before_dangling_backslash() {
        let s = sanitize_args(r"exec --cmd foo\\\");
        assert_eq!(s.text, r"exec --cmd foo\\");
        assert_eq!(s.fixes, vec![Fix::StrippedTrailingBackslashes { count: 1 }]);
    }

    #[test]
    fn placeholder_heuristic() {
        assert!(is_placeholder_value(""));
        assert!(is_placeholder_value("\\"));
        assert!(is_placeholder_value("\\\""));
        assert!(is_placeholder_value("\\.,;"));
        assert!(!is_placeholder_value("\\n"));
        assert!(!is_placeholder_value("\\SGVsbG8="));
        assert!(!is_placeholder_value("TODO"));
        assert!(!is_placeholder_value("."));
    }

    #[test]
    fn repair_promotes_next_token() {
        let mut args = argv(&["search", "--query", "\\", "needle", "--path", "src"]);
        let fixes = repair_value_flags(&mut args);
        assert_eq!(args, argv(&["search", "--query", "needle", "--path", "src"]));
        assert_eq!(fixes.len(), 1);
    }

    #[test]
    fn repair_leaves_flag_bare_when_nothing_follows() {
        let mut args = argv(&["write", "--file", "a.txt", "--content", ""]);
        repair_value_flags(&mut args);
        assert_eq!(args, argv(&["write", "--file", "a.txt", "--content"]));
    }

    #[test]
    fn repair_ignores_other_flags() {
        let mut args = argv(&["read", "--file", "\\"]);
        assert!(repair_value_flags(&mut args).is_empty());
        assert_eq!(args.len(), 3);
    }

    proptest! {
        #[test]
        // Without `;` no entity can be decoded, so the decoded text holds none.
        fn sanitize_is_idempotent(s in "[a-z &#x0-9'\"\\\\\\r\\n\\t]{0,40}") {
            let once = sanitize_args(&s).text;
            let twice = sanitize_args(&once).text;
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn sanitize_is_identity_without_artifacts(s in "[a-zA-Z0-9 ._/-]{0,40}") {
            let out = sanitize_args(&s);
            prop_assert_eq!(&out.text, &s);
            prop_assert!(out.fixes.is_empty());
        }
    }
}
