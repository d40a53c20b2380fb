//! The turn orchestrator: a ReAct loop over the tool-call protocol.
//!
//! Each turn sends the conversation to the provider, parses the reply and
//! either runs its batch of tool calls, corrects a protocol violation, hands
//! legacy command blocks to the operator, or accepts the reply as the final
//! answer.
//!
//! # Turn flow
//!
//! 1. Outgoing context: stored history (old long messages shortened in the
//!    copy) plus a transient mode anchor that is never persisted.
//! 2. Provider call, raced against cancellation. The raw reply is persisted.
//! 3. Parse and display reasoning, explanation and response cards.
//! 4. Parse errors and strict-mode violations become corrective user turns.
//! 5. A batch runs in order through gate, sanitizer, tokenizer, validation and
//!    executor, stopping at the first failure. Its summary is the next user turn.
//! 6. Fenced shell blocks go to the legacy menu, which ends the session.
//! 7. Anything else is the final answer.

mod legacy;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use toolgate_config::{AgentConfig, AppConfig, OutputConfig};
use toolgate_core::error::ToolError;
use toolgate_core::message::{Conversation, Message, Role};
use toolgate_core::provider::{ContextSource, Provider};
use toolgate_core::tool::CommandExecutor;
use toolgate_security::{AuditEvent, AuditLogger, AuditOutcome, PolicyEngine, normalize_args, redact_secrets};
use toolgate_tools::coder;
use toolgate_tools::{ArgsError, ShellExecutor, TruncationLimits, sanitize_args, truncate_middle};
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::event::AgentEvent;
use crate::feedback::{BatchExecutionResult, InvocationOutcome};
use crate::gate::{Gate, Verdict};
use crate::operator::Operator;
use crate::parser::{ParsedReply, ToolInvocationRequest, extract_command_blocks, parse_reply};
use crate::prompts::{Correction, mode_anchor, system_prompt};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The model gave a final answer.
    Completed,
    /// Legacy command blocks were handed to the operator.
    HandedOff,
    /// The turn budget ran out.
    TurnLimit,
}

/// The result of [`Orchestrator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub turns: u32,
    /// Commands handed to an executor.
    pub invocations_executed: usize,
    /// Corrective messages sent for protocol violations.
    pub format_corrections: usize,
    pub final_answer: Option<String>,
}

impl RunOutcome {
    fn new() -> Self {
        Self {
            status: RunStatus::Completed,
            turns: 0,
            invocations_executed: 0,
            format_corrections: 0,
            final_answer: None,
        }
    }
}

/// Drives one conversation through the tool-call protocol.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    executor: Arc<dyn CommandExecutor>,
    shell: Arc<dyn CommandExecutor>,
    operator: Arc<dyn Operator>,
    gate: Gate,
    context: Option<Arc<dyn ContextSource>>,
    agent: AgentConfig,
    output: OutputConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: Arc<dyn CommandExecutor>,
        policy: Arc<PolicyEngine>,
        operator: Arc<dyn Operator>,
    ) -> Self {
        let gate = Gate::new(policy, operator.clone(), Arc::new(AuditLogger::new()));
        Self {
            provider,
            executor,
            shell: Arc::new(ShellExecutor::default()),
            operator,
            gate,
            context: None,
            agent: AgentConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Take the agent and output sections of a loaded configuration.
    pub fn with_config(self, config: &AppConfig) -> Self {
        self.with_agent_config(config.agent.clone())
            .with_output_config(config.output.clone())
    }

    pub fn with_agent_config(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_output_config(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    /// Executor for legacy command blocks.
    pub fn with_shell_executor(mut self, shell: Arc<dyn CommandExecutor>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.gate = Gate::new(self.gate.policy().clone(), self.operator.clone(), audit);
        self
    }

    pub fn with_context(mut self, context: Arc<dyn ContextSource>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        self.gate.audit()
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        self.gate.policy()
    }

    /// Start a conversation: the system prompt (with context blocks) and the task.
    pub fn new_conversation(&self, task: impl Into<String>) -> Conversation {
        let blocks = self
            .context
            .as_ref()
            .map(|source| source.blocks())
            .unwrap_or_default();
        let mut conversation = Conversation::new();
        conversation.push(Message::system(system_prompt(&self.agent, &blocks)));
        conversation.push(Message::user(task));
        conversation
    }

    /// Run turns until a final answer, a legacy hand-off or the turn limit.
    ///
    /// Cancellation returns [`AgentError::Cancelled`] immediately; nothing is
    /// appended for the interrupted turn beyond what was already persisted.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        let max_turns = self.agent.effective_max_turns();
        let strict = self.agent.mode.is_strict();
        let mut outcome = RunOutcome::new();
        info!(
            conversation = %conversation.id,
            provider = self.provider.name(),
            mode = %self.agent.mode,
            max_turns,
            "Session started"
        );

        while outcome.turns < max_turns {
            outcome.turns += 1;

            let outgoing = self.outgoing_context(conversation);
            debug!(turn = outcome.turns, messages = outgoing.len(), "Sending prompt");
            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                reply = self.provider.send_prompt(&outgoing) => reply?,
            };
            conversation.push(Message::assistant(reply.clone()));

            let parsed = parse_reply(&reply);
            self.display_cards(&parsed);

            if let Some(error) = parsed.error.clone() {
                self.correct(conversation, &mut outcome, Correction::Parse(error));
                continue;
            }

            if parsed.has_invocations() {
                if strict {
                    if let Some(correction) = self.strict_violation(&parsed) {
                        self.correct(conversation, &mut outcome, correction);
                        continue;
                    }
                }
                let batch = self
                    .run_batch(cancel, &parsed.invocations, &mut outcome)
                    .await?;
                conversation.push(Message::user(batch.summary_message()));
                continue;
            }

            let blocks = extract_command_blocks(&reply);
            if !blocks.is_empty() {
                if strict {
                    let correction = Correction::LegacyBlocks {
                        designated: self.agent.designated_tool.clone(),
                    };
                    self.correct(conversation, &mut outcome, correction);
                    continue;
                }
                info!(blocks = blocks.len(), "Handing legacy command blocks to the operator");
                if let Some(batch) = self.run_legacy(cancel, &blocks, &mut outcome).await? {
                    conversation.push(Message::user(batch.summary_message()));
                }
                outcome.status = RunStatus::HandedOff;
                return Ok(outcome);
            }

            let answer = if parsed.display_text.is_empty() {
                reply.trim().to_string()
            } else {
                parsed.display_text
            };
            info!(turns = outcome.turns, "Session completed");
            outcome.final_answer = Some(answer);
            outcome.status = RunStatus::Completed;
            return Ok(outcome);
        }

        warn!(max_turns, "Turn limit reached, stopping session");
        self.operator.display(&AgentEvent::TurnLimit { max_turns });
        outcome.status = RunStatus::TurnLimit;
        Ok(outcome)
    }

    /// The messages sent to the provider. Stored history is left untouched.
    fn outgoing_context(&self, conversation: &Conversation) -> Vec<Message> {
        let max = self.output.max_history_message_chars;
        let limits = TruncationLimits {
            max_chars: max,
            head_chars: max / 2,
            tail_chars: max / 4,
        };
        let last = conversation.messages.len().saturating_sub(1);

        let mut outgoing: Vec<Message> = conversation
            .messages
            .iter()
            .enumerate()
            .map(|(i, message)| {
                let mut message = message.clone();
                if i != last && message.role != Role::System {
                    message.content = truncate_middle(&message.content, limits);
                }
                message
            })
            .collect();
        outgoing.push(Message::system(mode_anchor(&self.agent)));
        outgoing
    }

    fn display_cards(&self, parsed: &ParsedReply) {
        if let Some(reasoning) = &parsed.reasoning {
            self.operator.display(&AgentEvent::Reasoning {
                content: reasoning.clone(),
            });
        }
        if let Some(explanation) = &parsed.explanation {
            self.operator.display(&AgentEvent::Explanation {
                content: explanation.clone(),
            });
        }
        if !parsed.display_text.is_empty() {
            self.operator.display(&AgentEvent::Response {
                content: parsed.display_text.clone(),
            });
        }
    }

    fn strict_violation(&self, parsed: &ParsedReply) -> Option<Correction> {
        if parsed.reasoning.is_none() {
            return Some(Correction::MissingReasoning);
        }
        parsed
            .invocations
            .iter()
            .find(|call| call.tool_name != self.agent.designated_tool)
            .map(|call| Correction::WrongTool {
                found: call.tool_name.clone(),
                designated: self.agent.designated_tool.clone(),
            })
    }

    /// Send a corrective user turn instead of executing anything.
    fn correct(&self, conversation: &mut Conversation, outcome: &mut RunOutcome, correction: Correction) {
        let message = self.report_correction(outcome, &correction);
        conversation.push(Message::user(message));
    }

    fn report_correction(&self, outcome: &mut RunOutcome, correction: &Correction) -> String {
        outcome.format_corrections += 1;
        warn!(kind = correction.kind(), turn = outcome.turns, "Protocol violation");
        let message = correction.to_string();
        self.operator.display(&AgentEvent::FormatCorrection {
            kind: correction.kind().into(),
            message: message.clone(),
        });
        message
    }

    async fn run_batch(
        &self,
        cancel: &CancellationToken,
        calls: &[ToolInvocationRequest],
        outcome: &mut RunOutcome,
    ) -> Result<BatchExecutionResult, AgentError> {
        let mut batch = BatchExecutionResult::new(calls.len());
        for call in calls {
            let result = self.run_invocation(cancel, call, outcome).await?;
            batch.push(result);
            if batch.is_interrupted() {
                break;
            }
        }

        if batch.is_interrupted() {
            warn!(
                completed = batch.outcomes.len(),
                skipped = batch.skipped(),
                "Batch interrupted"
            );
            self.operator.display(&AgentEvent::BatchInterrupted {
                completed: batch.outcomes.len(),
                skipped: batch.skipped(),
            });
        }
        Ok(batch)
    }

    async fn run_invocation(
        &self,
        cancel: &CancellationToken,
        call: &ToolInvocationRequest,
        outcome: &mut RunOutcome,
    ) -> Result<InvocationOutcome, AgentError> {
        let tool = call.tool_name.as_str();
        let command = normalize_args(&call.raw_args).full_command(tool);

        if let Verdict::Denied(reason) = self.gate.authorize(cancel, tool, &call.raw_args).await? {
            return Ok(InvocationOutcome::failure(command, reason));
        }

        let sanitized = sanitize_args(&call.raw_args);
        for fix in &sanitized.fixes {
            debug!(tool = %tool, fix = %fix, "Sanitized arguments");
        }

        let argv = match self.build_argv(tool, &sanitized.text) {
            Ok(argv) => argv,
            Err(correction) => {
                let message = self.report_correction(outcome, &correction);
                return Ok(InvocationOutcome::failure(command, message));
            }
        };

        self.execute_reported(cancel, self.executor.as_ref(), tool, command, &argv, false, outcome)
            .await
    }

    /// Turn sanitized arguments into the argv handed to the executor.
    fn build_argv(&self, tool: &str, args: &str) -> Result<Vec<String>, Correction> {
        if self.agent.mode.is_strict() && args.contains('\n') {
            return Err(Correction::SingleLine { tool: tool.into() });
        }
        let invalid = |error| Correction::InvalidArguments {
            tool: tool.into(),
            error,
        };

        let mut tail = coder::build_argv(args).map_err(invalid)?;
        if tool == self.agent.designated_tool {
            let fixes = coder::repair_and_validate(&mut tail)
                .map_err(|e| invalid(ArgsError::Validation(e)))?;
            for fix in fixes {
                debug!(tool = %tool, fix = %fix, "Repaired arguments");
            }
        }

        let mut argv = Vec::with_capacity(tail.len() + 1);
        argv.push(tool.to_string());
        argv.extend(tail);
        Ok(argv)
    }

    /// Execute `argv`, report progress to the operator and build the outcome.
    ///
    /// The operator sees full (redacted) output; the outcome carries the
    /// truncated copy for the model.
    #[allow(clippy::too_many_arguments)]
    async fn execute_reported(
        &self,
        cancel: &CancellationToken,
        executor: &dyn CommandExecutor,
        tool: &str,
        command: String,
        argv: &[String],
        interactive: bool,
        outcome: &mut RunOutcome,
    ) -> Result<InvocationOutcome, AgentError> {
        self.operator.display(&AgentEvent::ToolStart {
            tool_name: tool.into(),
            command: command.clone(),
        });
        outcome.invocations_executed += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            result = executor.execute(cancel, argv, interactive) => result,
        };
        let limits = self.feedback_limits();

        match result {
            Ok(out) => {
                debug!(tool = %tool, exit_code = out.exit_code, elapsed_ms = out.duration.as_millis() as u64, "Tool finished");
                self.gate.audit().log(
                    AuditEvent::ToolExecution {
                        tool_name: tool.into(),
                    },
                    "model",
                    &command,
                    AuditOutcome::Success,
                    None,
                );
                self.operator.display(&AgentEvent::ToolOutput {
                    tool_name: tool.into(),
                    output: redact_secrets(&out.output).into_owned(),
                    exit_code: out.exit_code,
                    duration_ms: u64::try_from(out.duration.as_millis()).unwrap_or(u64::MAX),
                });
                Ok(InvocationOutcome::success(
                    command,
                    truncate_middle(&out.output, limits),
                ))
            }
            Err(ToolError::Cancelled(_)) => Err(AgentError::Cancelled),
            Err(e) => {
                let message = e.to_string();
                warn!(tool = %tool, command = %command, error = %message, "Tool execution failed");
                self.gate.audit().log(
                    AuditEvent::ToolExecution {
                        tool_name: tool.into(),
                    },
                    "model",
                    &command,
                    AuditOutcome::Failure,
                    Some(message.clone()),
                );

                let mut shown = message.clone();
                if let Some(partial) = e.partial_output() {
                    shown.push('\n');
                    shown.push_str(partial);
                }
                self.operator.display(&AgentEvent::ToolError {
                    tool_name: tool.into(),
                    message: redact_secrets(&shown).into_owned(),
                });

                let failure = InvocationOutcome::failure(command, message);
                Ok(match e.partial_output() {
                    Some(partial) => failure.with_output(truncate_middle(partial, limits)),
                    None => failure,
                })
            }
        }
    }

    fn feedback_limits(&self) -> TruncationLimits {
        TruncationLimits {
            max_chars: self.output.max_feedback_chars,
            head_chars: self.output.head_chars,
            tail_chars: self.output.tail_chars,
        }
    }
}
