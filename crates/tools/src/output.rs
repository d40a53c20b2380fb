//! Output truncation for model feedback.
//!
//! The operator always sees the full output of a command. What goes back to
//! the model is capped: a head and a tail window are kept and the middle is
//! replaced by a notice with the number of omitted characters.

/// Head/tail truncation limits, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationLimits {
    pub max_chars: usize,
    pub head_chars: usize,
    pub tail_chars: usize,
}

impl Default for TruncationLimits {
    fn default() -> Self {
        Self {
            max_chars: 30_000,
            head_chars: 12_000,
            tail_chars: 12_000,
        }
    }
}

/// Truncate `output` to its head and tail windows if it exceeds `max_chars`.
///
/// Splits on char boundaries, never inside a multi-byte character.
#[must_use]
pub fn truncate_middle(output: &str, limits: TruncationLimits) -> String {
    let total = output.chars().count();
    if total <= limits.max_chars {
        return output.to_string();
    }

    let head_end = byte_offset(output, limits.head_chars);
    let tail_start = byte_offset(output, total.saturating_sub(limits.tail_chars)).max(head_end);
    let head = &output[..head_end];
    let tail = &output[tail_start..];
    let omitted = output[head_end..tail_start].chars().count();

    format!(
        "{head}\n\n... [truncated {omitted} chars, showing first {} and last {} chars] ...\n\n{tail}",
        limits.head_chars, limits.tail_chars
    )
}

fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}
