//! Tool-call parser.
//!
//! A model reply is free text that may contain:
//!
//! - `<reasoning>…</reasoning>` and `<explanation>…</explanation>` spans,
//! - zero or more `<tool_call name="@tool" args="..." />` tags (a batch),
//! - or, in the legacy format, fenced ```` ```bash ```` command blocks.
//!
//! The scanner walks the reply once. Outside a tag it looks for the next
//! opening; inside a `<tool_call` tag it reads `name="value"` attributes,
//! switching to the attribute-value state at an opening quote and back at the
//! matching quote. The result is a lazy sequence of [`Segment`]s. A structural
//! error ends the sequence; [`parse_reply`] then reports zero invocations.

use thiserror::Error;

const TOOL_CALL_OPEN: &str = "<tool_call";
const TOOL_CALL_CLOSE: &str = "</tool_call>";
const REASONING_OPEN: &str = "<reasoning>";
const REASONING_CLOSE: &str = "</reasoning>";
const EXPLANATION_OPEN: &str = "<explanation>";
const EXPLANATION_CLOSE: &str = "</explanation>";

/// Fence languages recognised as legacy command blocks.
pub const SHELL_LANGS: &[&str] = &["bash", "sh", "shell", "zsh", "console"];

/// One tool call extracted from a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocationRequest {
    pub tool_name: String,
    /// The `args` attribute exactly as written (not yet sanitized).
    pub raw_args: String,
    /// The full tag text as it appeared in the reply.
    pub source_span: String,
    /// Byte offset of the tag in the reply.
    pub offset: usize,
}

/// Structural errors in tool-call markup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("<tool_call> tag at byte {offset} is never closed with '/>' or '>'")]
    UnterminatedTag { offset: usize },

    #[error("attribute value in <tool_call> tag at byte {offset} has no closing quote")]
    UnterminatedAttribute { offset: usize },

    #[error("attribute '{name}' in <tool_call> tag at byte {offset} must be quoted")]
    UnquotedAttribute { name: String, offset: usize },

    #[error("<tool_call> tag at byte {offset} has no name attribute")]
    MissingName { offset: usize },

    #[error("malformed <tool_call> tag at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },
}

impl ParseError {
    /// Byte offset of the tag the error refers to.
    pub fn offset(&self) -> usize {
        match self {
            ParseError::UnterminatedTag { offset }
            | ParseError::UnterminatedAttribute { offset }
            | ParseError::UnquotedAttribute { offset, .. }
            | ParseError::MissingName { offset }
            | ParseError::Malformed { offset, .. } => *offset,
        }
    }
}

/// A piece of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    PlainText(&'a str),
    Reasoning(&'a str),
    Explanation(&'a str),
    Invocation(ToolInvocationRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    ToolCall,
    Reasoning,
    Explanation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    InTag,
    InAttrValue { quote: char },
}

/// Lazy segment iterator over a reply. See [`segments`].
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    text: &'a str,
    pos: usize,
    failed: bool,
}

/// Split a reply into segments.
///
/// Yields `Err` once on the first structural error and then stops.
pub fn segments(text: &str) -> Segments<'_> {
    Segments {
        text,
        pos: 0,
        failed: false,
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Result<Segment<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.pos..];
        let Some((offset, kind)) = find_next_tag(rest) else {
            self.pos = self.text.len();
            return Some(Ok(Segment::PlainText(rest)));
        };
        if offset > 0 {
            self.pos += offset;
            return Some(Ok(Segment::PlainText(&rest[..offset])));
        }

        let start = self.pos;
        let item = match kind {
            TagKind::Reasoning => {
                let (content, end) = scan_block(self.text, start, REASONING_OPEN, REASONING_CLOSE);
                self.pos = end;
                Ok(Segment::Reasoning(content))
            }
            TagKind::Explanation => {
                let (content, end) =
                    scan_block(self.text, start, EXPLANATION_OPEN, EXPLANATION_CLOSE);
                self.pos = end;
                Ok(Segment::Explanation(content))
            }
            TagKind::ToolCall => match scan_tool_call(self.text, start) {
                Ok((request, end)) => {
                    self.pos = end;
                    Ok(Segment::Invocation(request))
                }
                Err(e) => {
                    self.failed = true;
                    Err(e)
                }
            },
        };
        Some(item)
    }
}

/// Find the next tag opening in `text`, returning its offset and kind.
fn find_next_tag(text: &str) -> Option<(usize, TagKind)> {
    text.match_indices('<').find_map(|(i, _)| {
        let at = &text[i..];
        if at.starts_with(REASONING_OPEN) {
            Some((i, TagKind::Reasoning))
        } else if at.starts_with(EXPLANATION_OPEN) {
            Some((i, TagKind::Explanation))
        } else if let Some(after) = at.strip_prefix(TOOL_CALL_OPEN) {
            // `<tool_calls>` and friends are plain text.
            match after.chars().next() {
                None => Some((i, TagKind::ToolCall)),
                Some(c) if c.is_whitespace() || c == '/' || c == '>' => {
                    Some((i, TagKind::ToolCall))
                }
                Some(_) => None,
            }
        } else {
            None
        }
    })
}

/// Read a paired block. An unclosed block ends at the next tool call or at
/// the end of the text. Returns the trimmed content and the end offset.
fn scan_block<'a>(text: &'a str, start: usize, open: &str, close: &str) -> (&'a str, usize) {
    let body_start = start + open.len();
    let body = &text[body_start..];
    match body.find(close) {
        Some(end) => (body[..end].trim(), body_start + end + close.len()),
        None => {
            let end = body.find(TOOL_CALL_OPEN).unwrap_or(body.len());
            (body[..end].trim(), body_start + end)
        }
    }
}

fn is_attr_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':'
}

fn skip_whitespace(text: &str, pos: usize) -> usize {
    let rest = &text[pos..];
    pos + (rest.len() - rest.trim_start().len())
}

/// Scan a `<tool_call ... />` tag starting at `start`.
fn scan_tool_call(text: &str, start: usize) -> Result<(ToolInvocationRequest, usize), ParseError> {
    let mut pos = start + TOOL_CALL_OPEN.len();
    let mut state = ScanState::InTag;
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut name = String::new();
    let mut value = String::new();

    let end = loop {
        let Some(c) = text[pos..].chars().next() else {
            return Err(match state {
                ScanState::InAttrValue { .. } => ParseError::UnterminatedAttribute { offset: start },
                ScanState::InTag => ParseError::UnterminatedTag { offset: start },
            });
        };

        match state {
            ScanState::InAttrValue { quote } => {
                if c == quote {
                    attrs.push((std::mem::take(&mut name), std::mem::take(&mut value)));
                    state = ScanState::InTag;
                } else {
                    value.push(c);
                }
                pos += c.len_utf8();
            }
            ScanState::InTag => {
                if c.is_whitespace() {
                    pos += c.len_utf8();
                } else if text[pos..].starts_with("/>") {
                    break pos + 2;
                } else if c == '>' {
                    let after = skip_whitespace(text, pos + 1);
                    if text[after..].starts_with(TOOL_CALL_CLOSE) {
                        break after + TOOL_CALL_CLOSE.len();
                    }
                    break pos + 1;
                } else if is_attr_name_char(c) {
                    let name_len = text[pos..]
                        .find(|ch: char| !is_attr_name_char(ch))
                        .unwrap_or(text.len() - pos);
                    name = text[pos..pos + name_len].to_string();
                    pos = skip_whitespace(text, pos + name_len);

                    match text[pos..].chars().next() {
                        Some('=') => {}
                        None => return Err(ParseError::UnterminatedTag { offset: start }),
                        Some(_) => {
                            return Err(ParseError::Malformed {
                                offset: start,
                                reason: format!("attribute '{name}' has no value"),
                            });
                        }
                    }
                    pos = skip_whitespace(text, pos + 1);

                    match text[pos..].chars().next() {
                        Some(quote @ ('"' | '\'')) => {
                            state = ScanState::InAttrValue { quote };
                            pos += 1;
                        }
                        None => return Err(ParseError::UnterminatedTag { offset: start }),
                        Some(_) => {
                            return Err(ParseError::UnquotedAttribute {
                                name,
                                offset: start,
                            });
                        }
                    }
                } else {
                    return Err(ParseError::Malformed {
                        offset: start,
                        reason: format!("unexpected character {c:?}"),
                    });
                }
            }
        }
    };

    let attr = |key: &str| {
        attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    let tool_name = attr("name")
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ParseError::MissingName { offset: start })?
        .to_string();
    let raw_args = attr("args").unwrap_or_default().to_string();

    Ok((
        ToolInvocationRequest {
            tool_name,
            raw_args,
            source_span: text[start..end].to_string(),
            offset: start,
        },
        end,
    ))
}

/// Everything extracted from one reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    /// Text before the first invocation (the whole reply when there is none).
    pub thought: String,
    pub reasoning: Option<String>,
    pub explanation: Option<String>,
    /// Untagged text for the operator, with tags removed.
    pub display_text: String,
    pub invocations: Vec<ToolInvocationRequest>,
    /// Set when the tool-call markup was malformed; `invocations` is then empty.
    pub error: Option<ParseError>,
}

impl ParsedReply {
    pub fn has_invocations(&self) -> bool {
        !self.invocations.is_empty()
    }
}

/// Parse a model reply. Never fails; malformed markup is reported in
/// [`ParsedReply::error`].
pub fn parse_reply(text: &str) -> ParsedReply {
    let mut reply = ParsedReply::default();
    let mut reasoning = Vec::new();
    let mut explanation = Vec::new();
    let mut plain = Vec::new();

    for item in segments(text) {
        match item {
            Ok(Segment::PlainText(t)) => plain.push(t.trim()),
            Ok(Segment::Reasoning(t)) => reasoning.push(t),
            Ok(Segment::Explanation(t)) => explanation.push(t),
            Ok(Segment::Invocation(request)) => reply.invocations.push(request),
            Err(e) => {
                plain.push(text[e.offset()..].trim());
                reply.invocations.clear();
                reply.error = Some(e);
            }
        }
    }

    reply.thought = match reply.invocations.first() {
        Some(first) => text[..first.offset].trim().to_string(),
        None => text.trim().to_string(),
    };
    reply.reasoning = join_non_empty(&reasoning);
    reply.explanation = join_non_empty(&explanation);
    reply.display_text = plain
        .into_iter()
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    reply
}

fn join_non_empty(parts: &[&str]) -> Option<String> {
    let parts: Vec<&str> = parts.iter().copied().filter(|p| !p.is_empty()).collect();
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

/// A fenced shell block in the legacy reply format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBlock {
    pub lang: String,
    pub script: String,
}

/// Extract fenced shell blocks (```` ```bash ````, `sh`, `shell`, `zsh`,
/// `console`). Unclosed fences are ignored; a leading `$ ` prompt is removed
/// from each line.
pub fn extract_command_blocks(text: &str) -> Vec<CommandBlock> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let line_end = after.find('\n').unwrap_or(after.len());
        let lang = after[..line_end].trim().to_ascii_lowercase();
        let body = &after[line_end..];
        let Some(end) = body.find("```") else {
            break;
        };

        if SHELL_LANGS.contains(&lang.as_str()) {
            let script = body[..end]
                .trim()
                .lines()
                .map(|line| line.strip_prefix("$ ").unwrap_or(line))
                .collect::<Vec<_>>()
                .join("\n");
            if !script.trim().is_empty() {
                blocks.push(CommandBlock { lang, script });
            }
        }
        rest = &body[end + 3..];
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_self_closing_call() {
        let text = r#"Let me look. <tool_call name="@coder" args="read --file main.go" />"#;
        let reply = parse_reply(text);
        assert!(reply.error.is_none());
        assert_eq!(reply.invocations.len(), 1);
        let call = &reply.invocations[0];
        assert_eq!(call.tool_name, "@coder");
        assert_eq!(call.raw_args, "read --file main.go");
        assert_eq!(call.source_span, r#"<tool_call name="@coder" args="read --file main.go" />"#);
        assert_eq!(reply.thought, "Let me look.");
        assert_eq!(reply.display_text, "Let me look.");
    }

    #[test]
    fn batch_of_calls_in_order() {
        let text = concat!(
            "<reasoning>Check both files.</reasoning>\n",
            "<tool_call name='@coder' args='read --file a.rs'/>\n",
            "<tool_call name=\"@coder\" args='{\"cmd\":\"read\",\"args\":{\"file\":\"b.rs\"}}'></tool_call>\n",
            "<tool_call args=\"list\" name=\"@coder\">",
        );
        let reply = parse_reply(text);
        assert!(reply.error.is_none());
        let args: Vec<&str> = reply.invocations.iter().map(|c| c.raw_args.as_str()).collect();
        assert_eq!(
            args,
            ["read --file a.rs", r#"{"cmd":"read","args":{"file":"b.rs"}}"#, "list"]
        );
        assert_eq!(reply.reasoning.as_deref(), Some("Check both files."));
        assert_eq!(reply.thought, "<reasoning>Check both files.</reasoning>");
        assert_eq!(reply.display_text, "");
    }

    #[test]
    fn reasoning_and_explanation_are_stripped_from_display() {
        let text = "<reasoning>Think.</reasoning>\nHere is the plan.\n<explanation>Because.</explanation>\nDone.";
        let reply = parse_reply(text);
        assert_eq!(reply.reasoning.as_deref(), Some("Think."));
        assert_eq!(reply.explanation.as_deref(), Some("Because."));
        assert_eq!(reply.display_text, "Here is the plan.\n\nDone.");
        assert!(!reply.has_invocations());
    }

    #[test]
    fn unclosed_reasoning_stops_at_tool_call() {
        let text = r#"<reasoning>I should read it <tool_call name="@coder" args="read --file x"/>"#;
        let reply = parse_reply(text);
        assert_eq!(reply.reasoning.as_deref(), Some("I should read it"));
        assert_eq!(reply.invocations.len(), 1);
    }

    #[test]
    fn gt_inside_attribute_value() {
        let reply = parse_reply(r#"<tool_call name="@coder" args='exec --cmd "ls > out.txt"' />"#);
        assert_eq!(reply.invocations[0].raw_args, r#"exec --cmd "ls > out.txt""#);
    }

    #[test]
    fn entities_are_left_for_the_sanitizer() {
        let reply = parse_reply(r#"<tool_call name="@coder" args="exec --cmd &quot;ls&quot;"/>"#);
        assert_eq!(reply.invocations[0].raw_args, "exec --cmd &quot;ls&quot;");
    }

    #[test]
    fn plain_answer_has_no_invocations() {
        let reply = parse_reply("The answer is 42.");
        assert!(!reply.has_invocations());
        assert!(reply.error.is_none());
        assert_eq!(reply.thought, "The answer is 42.");
        assert_eq!(reply.display_text, "The answer is 42.");
    }

    #[test]
    fn similar_tag_names_are_plain_text() {
        let reply = parse_reply("Use <tool_calls> sparingly.");
        assert!(!reply.has_invocations());
        assert!(reply.error.is_none());
    }

    #[test]
    fn unterminated_attribute_yields_no_invocations() {
        let text = r#"<tool_call name="@coder" args="read" /> then <tool_call name="@coder" args="read --file"#;
        let reply = parse_reply(text);
        assert!(reply.invocations.is_empty());
        assert!(matches!(reply.error, Some(ParseError::UnterminatedAttribute { .. })));
    }

    #[test]
    fn unterminated_tag_is_an_error() {
        let reply = parse_reply(r#"<tool_call name="@coder" args="list""#);
        assert!(matches!(reply.error, Some(ParseError::UnterminatedTag { offset: 0 })));
    }

    #[test]
    fn missing_name_is_an_error() {
        let reply = parse_reply(r#"<tool_call args="list" />"#);
        assert_eq!(reply.error, Some(ParseError::MissingName { offset: 0 }));
        let reply = parse_reply(r#"<tool_call name="  " args="list" />"#);
        assert_eq!(reply.error, Some(ParseError::MissingName { offset: 0 }));
    }

    #[test]
    fn unquoted_and_nested_quotes_are_errors() {
        let reply = parse_reply("<tool_call name=@coder args=list />");
        assert!(matches!(reply.error, Some(ParseError::UnquotedAttribute { .. })));

        // Inner double quotes end the value early.
        let reply = parse_reply(r#"<tool_call name="@coder" args="{"cmd":"list"}" />"#);
        assert!(matches!(reply.error, Some(ParseError::Malformed { .. })));
        assert!(reply.display_text.contains("<tool_call"));
    }

    #[test]
    fn segments_are_lazy_and_ordered() {
        let text = r#"intro <reasoning>r</reasoning> mid <tool_call name="@a" args="x"/> tail"#;
        let kinds: Vec<&str> = segments(text)
            .map(|s| match s.unwrap() {
                Segment::PlainText(_) => "text",
                Segment::Reasoning(_) => "reasoning",
                Segment::Explanation(_) => "explanation",
                Segment::Invocation(_) => "invocation",
            })
            .collect();
        assert_eq!(kinds, ["text", "reasoning", "text", "invocation", "text"]);

        let mut iter = segments(r#"<tool_call name="@a" args="x"/><tool_call"#);
        assert!(matches!(iter.next(), Some(Ok(Segment::Invocation(_)))));
        assert!(matches!(iter.next(), Some(Err(_))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn extracts_shell_blocks_only() {
        let text = "Run this:\n```bash\n$ cargo test\n```\nand\n```rust\nfn main() {}\n```\n```console\nls -la\n```";
        let blocks = extract_command_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].lang, "bash");
        assert_eq!(blocks[0].script, "cargo test");
        assert_eq!(blocks[1].script, "ls -la");
    }

    #[test]
    fn unclosed_fence_is_ignored() {
        assert!(extract_command_blocks("```sh\nrm -rf /").is_empty());
        assert!(extract_command_blocks("```sh\n```").is_empty());
    }
}
