//! Boundary-aware prefix matching of policy patterns.

/// Word characters for boundary purposes: ASCII letters, digits, `_` and `-`.
pub fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Whether `full` starts with `pattern` without splitting a word.
///
/// When the pattern ends in a word character, the character of `full` right
/// after the pattern (if any) must not be a word character, so `@coder read`
/// matches `@coder read main.go` but not `@coder readlink main.go`.
pub fn matches_with_boundary(full: &str, pattern: &str) -> bool {
    let Some(rest) = full.strip_prefix(pattern) else {
        return false;
    };
    match (pattern.chars().last(), rest.chars().next()) {
        (Some(last), Some(next)) if is_word_char(last) => !is_word_char(next),
        _ => true,
    }
}
