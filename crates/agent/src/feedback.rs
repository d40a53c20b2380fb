//! Batch results and the feedback message the model sees after a batch.

use std::fmt::Write;

/// What happened to one invocation of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    /// Canonical command, e.g. `@coder read --file main.go`.
    pub display_text: String,
    /// Output fed back to the model (already truncated).
    pub tool_output: Option<String>,
    pub error: Option<String>,
}

impl InvocationOutcome {
    pub fn success(display_text: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            display_text: display_text.into(),
            tool_output: Some(output.into()),
            error: None,
        }
    }

    pub fn failure(display_text: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            display_text: display_text.into(),
            tool_output: None,
            error: Some(error.into()),
        }
    }

    /// Attach output captured before the failure.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.tool_output = Some(output.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    /// An invocation failed or was refused; later ones were not run.
    Interrupted,
}

/// Ordered outcomes of one batch of invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchExecutionResult {
    pub outcomes: Vec<InvocationOutcome>,
    pub status: BatchStatus,
    /// Number of invocations the batch contained.
    pub total: usize,
}

impl BatchExecutionResult {
    pub fn new(total: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(total),
            status: BatchStatus::Completed,
            total,
        }
    }

    /// Record an outcome. An error interrupts the batch.
    pub fn push(&mut self, outcome: InvocationOutcome) {
        if outcome.is_error() {
            self.status = BatchStatus::Interrupted;
        }
        self.outcomes.push(outcome);
    }

    pub fn is_interrupted(&self) -> bool {
        self.status == BatchStatus::Interrupted
    }

    /// Invocations that were never attempted.
    pub fn skipped(&self) -> usize {
        self.total.saturating_sub(self.outcomes.len())
    }

    /// The single user turn summarizing the batch for the model.
    pub fn summary_message(&self) -> String {
        let mut msg = match self.status {
            BatchStatus::Completed => format!(
                "[Tool results: {} of {} call(s) completed]\n",
                self.outcomes.len(),
                self.total
            ),
            BatchStatus::Interrupted => format!(
                "[Tool results: batch interrupted after {} of {} call(s)]\n",
                self.outcomes.len(),
                self.total
            ),
        };

        for (i, outcome) in self.outcomes.iter().enumerate() {
            let _ = write!(msg, "\n### {}. {}\n", i + 1, outcome.display_text);
            if let Some(error) = &outcome.error {
                let _ = writeln!(msg, "ERROR: {error}");
            }
            match outcome.tool_output.as_deref() {
                Some(output) if output.trim().is_empty() => msg.push_str("(no output)\n"),
                Some(output) => {
                    msg.push_str(output.trim_end());
                    msg.push('\n');
                }
                None if outcome.error.is_none() => msg.push_str("(no output)\n"),
                None => {}
            }
        }

        if self.is_interrupted() {
            let _ = write!(
                msg,
                "\nThe batch was interrupted: {} remaining call(s) were not executed. \
                 Address the error above before continuing.\n",
                self.skipped()
            );
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_batch_summary() {
        let mut batch = BatchExecutionResult::new(2);
        batch.push(InvocationOutcome::success("@coder read --file a.rs", "fn a() {}\n"));
        batch.push(InvocationOutcome::success("@coder list", ""));

        assert_eq!(batch.status, BatchStatus::Completed);
        let msg = batch.summary_message();
        assert!(msg.starts_with("[Tool results: 2 of 2 call(s) completed]"));
        assert!(msg.contains("### 1. @coder read --file a.rs\nfn a() {}\n"));
        assert!(msg.contains("### 2. @coder list\n(no output)"));
        assert!(!msg.contains("interrupted"));
    }

    #[test]
    fn error_interrupts_and_counts_skipped() {
        let mut batch = BatchExecutionResult::new(3);
        batch.push(InvocationOutcome::success("@coder list", "a.rs"));
        batch.push(
            InvocationOutcome::failure("@coder exec --cmd go test", "Tool exited with code 1")
                .with_output("FAIL"),
        );

        assert!(batch.is_interrupted());
        assert_eq!(batch.skipped(), 1);
        let msg = batch.summary_message();
        assert!(msg.contains("batch interrupted after 2 of 3"));
        assert!(msg.contains("ERROR: Tool exited with code 1\nFAIL"));
        assert!(msg.contains("1 remaining call(s) were not executed"));
    }
}
