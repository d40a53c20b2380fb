//! Terminal operator — renders agent events and asks the human at the keyboard.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use toolgate_agent::input::prompt_line;
use toolgate_agent::parser::CommandBlock;
use toolgate_agent::{AgentError, AgentEvent, EscalationRequest, LegacyChoice, Operator, SecurityDecision};

#[derive(Default)]
pub struct TerminalOperator;

impl TerminalOperator {
    pub fn new() -> Self {
        Self
    }
}

/// An answer at the legacy menu. Editing needs a second prompt for the script.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MenuAnswer {
    Choice(LegacyChoice),
    Edit(usize),
}

fn parse_decision(answer: &str) -> Option<SecurityDecision> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "r" | "run" | "y" | "yes" => Some(SecurityDecision::RunOnce),
        "a" | "always" => Some(SecurityDecision::AllowAlways),
        "d" | "deny" | "no" => Some(SecurityDecision::DenyOnce),
        "n" | "never" => Some(SecurityDecision::DenyForever),
        _ => None,
    }
}

fn parse_menu_answer(answer: &str, blocks: usize) -> Option<MenuAnswer> {
    let answer = answer.trim().to_ascii_lowercase();
    let mut parts = answer.split_whitespace();
    let head = parts.next().unwrap_or("k");
    let block_index = |n: usize| (1..=blocks).contains(&n).then(|| n - 1);

    match head {
        "a" | "all" => Some(MenuAnswer::Choice(LegacyChoice::RunAll)),
        "s" | "sim" | "simulate" => Some(MenuAnswer::Choice(LegacyChoice::Simulate)),
        "k" | "skip" => Some(MenuAnswer::Choice(LegacyChoice::Skip)),
        "e" | "edit" => match parts.next() {
            Some(n) => block_index(n.parse().ok()?).map(MenuAnswer::Edit),
            None if blocks == 1 => Some(MenuAnswer::Edit(0)),
            None => None,
        },
        n => block_index(n.parse().ok()?).map(|i| MenuAnswer::Choice(LegacyChoice::RunOne(i))),
    }
}

/// What the operator is shown before deciding: the canonical command and the
/// literal arguments, which can differ when canonicalization drops parts.
fn escalation_text(request: &EscalationRequest) -> String {
    format!(
        "  ⚠️  {} wants to run:\n     {}\n     args as written: {}",
        request.tool_name, request.command, request.raw_args
    )
}

fn print_block(prefix: &str, text: &str) {
    for line in text.lines() {
        println!("  {prefix} {line}");
    }
}

#[async_trait]
impl Operator for TerminalOperator {
    fn display(&self, event: &AgentEvent) {
        match event {
            AgentEvent::Reasoning { content } => {
                println!("  💭 Reasoning");
                print_block("│", content);
            }
            AgentEvent::Explanation { content } => {
                println!("  📝 Explanation");
                print_block("│", content);
            }
            AgentEvent::Response { content } => print_block("Assistant >", content),
            AgentEvent::ToolStart { command, .. } => println!("  ▶ {command}"),
            AgentEvent::ToolOutput {
                output,
                exit_code,
                duration_ms,
                ..
            } => {
                print_block("│", output);
                println!("  ✓ exit {exit_code} in {duration_ms}ms");
            }
            AgentEvent::ToolError { message, .. } => {
                for line in message.lines() {
                    eprintln!("  ✗ {line}");
                }
            }
            AgentEvent::FormatCorrection { kind, .. } => {
                println!("  ↺ Format correction sent to the model ({kind})");
            }
            AgentEvent::PolicyDenied { command, .. } => println!("  ⛔ Denied: {command}"),
            AgentEvent::BatchInterrupted { skipped, .. } => {
                println!("  ⏹ Batch interrupted, {skipped} call(s) skipped");
            }
            AgentEvent::TurnLimit { max_turns } => {
                println!("  ⚠️  Turn limit of {max_turns} reached");
            }
        }
    }

    async fn confirm_invocation(
        &self,
        cancel: &CancellationToken,
        request: &EscalationRequest,
    ) -> Result<SecurityDecision, AgentError> {
        println!();
        println!("{}", escalation_text(request));
        let prompt = format!(
            "  [r]un once, [a]llow always '{p}', [d]eny, [n]ever allow '{p}' > ",
            p = request.suggested_pattern
        );
        loop {
            let answer = prompt_line(cancel, &prompt).await?;
            match parse_decision(&answer) {
                Some(decision) => return Ok(decision),
                None => println!("  Please answer r, a, d or n."),
            }
        }
    }

    async fn choose_legacy(
        &self,
        cancel: &CancellationToken,
        blocks: &[CommandBlock],
    ) -> Result<LegacyChoice, AgentError> {
        println!();
        println!("  The model suggested {} command block(s):", blocks.len());
        for (i, block) in blocks.iter().enumerate() {
            println!("  [{}] ({})", i + 1, block.lang);
            print_block("│", &block.script);
        }
        let prompt = format!(
            "  [1-{}] run one, [a]ll, [e]dit N, [s]imulate, s[k]ip > ",
            blocks.len()
        );
        loop {
            let answer = prompt_line(cancel, &prompt).await?;
            match parse_menu_answer(&answer, blocks.len()) {
                Some(MenuAnswer::Choice(choice)) => return Ok(choice),
                Some(MenuAnswer::Edit(index)) => {
                    let script = prompt_line(cancel, "  New script > ").await?;
                    return Ok(LegacyChoice::Edit { index, script });
                }
                None => println!("  Unrecognised choice."),
            }
        }
    }
}
