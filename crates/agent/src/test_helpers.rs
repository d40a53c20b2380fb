//! Shared test doubles: scripted provider, recording executor and operator.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use toolgate_core::error::{ProviderError, ToolError};
use toolgate_core::message::Message;
use toolgate_core::provider::Provider;
use toolgate_core::tool::{CommandExecutor, ExecutionOutput};

use crate::error::AgentError;
use crate::event::AgentEvent;
use crate::operator::{EscalationRequest, LegacyChoice, Operator, SecurityDecision};
use crate::parser::CommandBlock;

/// A provider that returns scripted replies in order.
///
/// Records the outgoing context of every call. Fails with
/// `ProviderError::Exhausted` once the script runs out.
pub struct SequentialMockProvider {
    replies: Mutex<VecDeque<String>>,
    received: Mutex<Vec<Vec<Message>>>,
}

impl SequentialMockProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    /// The outgoing context of call `n` (0-based).
    pub fn received(&self, n: usize) -> Vec<Message> {
        self.received.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn send_prompt(&self, messages: &[Message]) -> Result<String, ProviderError> {
        self.received.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Exhausted("no more scripted replies".into()))
    }
}

/// A provider that never answers.
pub struct PendingProvider;

#[async_trait]
impl Provider for PendingProvider {
    fn name(&self) -> &str {
        "pending"
    }

    async fn send_prompt(&self, _messages: &[Message]) -> Result<String, ProviderError> {
        std::future::pending().await
    }
}

/// An executor that records every argv and replays scripted results.
///
/// Returns `"ok"` with exit code 0 once the script is empty.
#[derive(Default)]
pub struct RecordingExecutor {
    results: Mutex<VecDeque<Result<ExecutionOutput, ToolError>>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(results: Vec<Result<ExecutionOutput, ToolError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

pub fn output(text: &str) -> ExecutionOutput {
    ExecutionOutput {
        output: text.into(),
        exit_code: 0,
        duration: Duration::from_millis(5),
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        argv: &[String],
        _interactive: bool,
    ) -> Result<ExecutionOutput, ToolError> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled(argv.join(" ")));
        }
        self.calls.lock().unwrap().push(argv.to_vec());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(output("ok")))
    }
}

/// An operator that answers from scripts and records displayed events.
///
/// Escalations default to `DenyOnce` and legacy menus to `Skip` once their
/// scripts are empty.
#[derive(Default)]
pub struct ScriptedOperator {
    decisions: Mutex<VecDeque<SecurityDecision>>,
    legacy: Mutex<VecDeque<LegacyChoice>>,
    escalations: Mutex<Vec<EscalationRequest>>,
    events: Mutex<Vec<AgentEvent>>,
    cancel_on_escalation: Option<CancellationToken>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decisions(mut self, decisions: impl IntoIterator<Item = SecurityDecision>) -> Self {
        self.decisions = Mutex::new(decisions.into_iter().collect());
        self
    }

    pub fn with_legacy_choice(mut self, choice: LegacyChoice) -> Self {
        self.legacy = Mutex::new(VecDeque::from([choice]));
        self
    }

    /// Fire `token` (simulating Ctrl-C) when an escalation is shown.
    pub fn cancelling_on_escalation(mut self, token: CancellationToken) -> Self {
        self.cancel_on_escalation = Some(token);
        self
    }

    pub fn escalations(&self) -> Vec<EscalationRequest> {
        self.escalations.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<AgentEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(AgentEvent::event_type).collect()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    fn display(&self, event: &AgentEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    async fn confirm_invocation(
        &self,
        cancel: &CancellationToken,
        request: &EscalationRequest,
    ) -> Result<SecurityDecision, AgentError> {
        self.escalations.lock().unwrap().push(request.clone());
        if let Some(token) = &self.cancel_on_escalation {
            token.cancel();
        }
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        Ok(self
            .decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SecurityDecision::DenyOnce))
    }

    async fn choose_legacy(
        &self,
        cancel: &CancellationToken,
        _blocks: &[CommandBlock],
    ) -> Result<LegacyChoice, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        Ok(self
            .legacy
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(LegacyChoice::Skip))
    }
}
