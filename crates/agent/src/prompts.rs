//! Protocol prompts: the system prompt, per-turn mode anchors and the
//! corrective messages sent when the model breaks the tool-call protocol.

use std::fmt;

use toolgate_config::{AgentConfig, AgentMode};
use toolgate_tools::{ArgsError, ValidationError};
use toolgate_tools::coder::SUBCOMMANDS;

use crate::parser::ParseError;

/// Build the system prompt for a session.
pub fn system_prompt(config: &AgentConfig, context_blocks: &[String]) -> String {
    let tool = &config.designated_tool;
    let mut prompt = format!(
        "You are a coding assistant working in the operator's project.\n\
         \n\
         ## Tools\n\
         Request actions with a single self-closing tag per action:\n\
         <tool_call name=\"{tool}\" args=\"read --file src/main.rs\" />\n\
         \n\
         - `args` is either CLI text (`subcommand --flag value`) or JSON \
         (`{{\"cmd\": \"read\", \"args\": {{\"file\": \"src/main.rs\"}}}}`). \
         Wrap JSON in single quotes.\n\
         - Keep `args` on one line. Quote values containing spaces.\n\
         - You may emit several tags in one reply; they run in order and the \
         batch stops at the first failure.\n\
         - Every call is checked against the operator's security policy and may \
         be denied.\n\
         \n\
         Subcommands of {tool}:\n"
    );
    for (name, flags) in SUBCOMMANDS {
        if flags.is_empty() {
            prompt.push_str(&format!("- {name}\n"));
        } else {
            prompt.push_str(&format!("- {name} {}\n", flags.join(" <value> ") + " <value>"));
        }
    }
    prompt.push_str(
        "\n## Format\n\
         Put your reasoning in <reasoning>...</reasoning> before any tool call. \
         Use <explanation>...</explanation> for notes meant for the operator. \
         When the task is done, reply with the final answer and no tool calls.\n",
    );
    if config.mode.is_strict() {
        prompt.push_str(&format!(
            "\nStrict mode: only {tool} may be called, <reasoning> is mandatory and \
             fenced shell blocks are not executed.\n"
        ));
    }

    let blocks: Vec<&str> = context_blocks
        .iter()
        .map(|b| b.trim())
        .filter(|b| !b.is_empty())
        .collect();
    if !blocks.is_empty() {
        prompt.push_str("\n## Context\n");
        for block in blocks {
            prompt.push('\n');
            prompt.push_str(block);
            prompt.push('\n');
        }
    }
    prompt
}

/// Transient reminder appended to the outgoing context on every turn.
pub fn mode_anchor(config: &AgentConfig) -> String {
    match config.mode {
        AgentMode::Coder => format!(
            "[mode: coder] Start with <reasoning>, then call {} with one-line args. \
             No fenced shell blocks.",
            config.designated_tool
        ),
        AgentMode::Default => format!(
            "[mode: default] Use <tool_call name=\"{}\" ... /> tags for actions, \
             or answer directly when done.",
            config.designated_tool
        ),
    }
}

/// A protocol violation reported back to the model instead of executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    Parse(ParseError),
    MissingReasoning,
    WrongTool { found: String, designated: String },
    LegacyBlocks { designated: String },
    SingleLine { tool: String },
    InvalidArguments { tool: String, error: ArgsError },
}

impl Correction {
    /// Short machine-readable label, used in logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Correction::Parse(_) => "parse_error",
            Correction::MissingReasoning => "missing_reasoning",
            Correction::WrongTool { .. } => "wrong_tool",
            Correction::LegacyBlocks { .. } => "legacy_blocks",
            Correction::SingleLine { .. } => "single_line",
            Correction::InvalidArguments {
                error: ArgsError::Parse(_),
                ..
            } => "tokenize_failed",
            Correction::InvalidArguments { .. } => "invalid_arguments",
        }
    }
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correction::Parse(e) => write!(
                f,
                "FORMAT ERROR: your tool call could not be parsed ({e}). Nothing was executed. \
                 Use <tool_call name=\"@tool\" args='...' /> with quoted attributes, and use \
                 single quotes around args that contain double quotes."
            ),
            Correction::MissingReasoning => write!(
                f,
                "FORMAT ERROR: tool calls must be preceded by a <reasoning>...</reasoning> block. \
                 Nothing was executed. Explain your plan in <reasoning>, then repeat the calls."
            ),
            Correction::WrongTool { found, designated } => write!(
                f,
                "FORMAT ERROR: tool '{found}' is not available in this mode. Nothing was \
                 executed. Use {designated} for every action."
            ),
            Correction::LegacyBlocks { designated } => write!(
                f,
                "FORMAT ERROR: fenced shell blocks are not executed in this mode. Use \
                 <tool_call name=\"{designated}\" args=\"exec --cmd '...'\" /> instead."
            ),
            Correction::SingleLine { tool } => write!(
                f,
                "FORMAT ERROR: the args of your {tool} call span several lines. Nothing was \
                 executed. Put args on a single line; write newlines inside values as \\n."
            ),
            Correction::InvalidArguments {
                tool,
                error: ArgsError::Parse(e),
            } => write!(
                f,
                "FORMAT ERROR: the args of your {tool} call could not be tokenized ({e}). \
                 Nothing was executed. Balance your quotes and do not end args with a backslash."
            ),
            Correction::InvalidArguments { tool, error } => match error {
                ArgsError::Validation(v @ ValidationError::DuplicateFlag { flag }) => write!(
                    f,
                    "FORMAT ERROR: {tool} call rejected: {v}. Nothing was executed. Give {flag} \
                     exactly once; split separate commands into separate tool calls."
                ),
                ArgsError::Validation(v) if v.flag().is_some() => write!(
                    f,
                    "FORMAT ERROR: {tool} call rejected: {v}. Nothing was executed. Provide a \
                     real value for {} and try again.",
                    v.flag().unwrap_or_default()
                ),
                other => write!(
                    f,
                    "FORMAT ERROR: {tool} call rejected: {other}. Nothing was executed."
                ),
            },
        }
    }
}
