//! Legacy command-block menu.
//!
//! Replies in the old format carry fenced shell blocks instead of tool calls.
//! Outside strict mode they are offered to the operator (run one, run all,
//! edit, simulate, skip). Every script passes the gate as an `@shell` call.

use tokio_util::sync::CancellationToken;
use toolgate_tools::SHELL_TOOL;
use tracing::{debug, info, warn};

use super::{Orchestrator, RunOutcome};
use crate::error::AgentError;
use crate::event::AgentEvent;
use crate::feedback::{BatchExecutionResult, InvocationOutcome};
use crate::gate::Verdict;
use crate::operator::LegacyChoice;
use crate::parser::CommandBlock;

impl Orchestrator {
    /// Ask the operator what to do with `blocks` and run the chosen scripts.
    ///
    /// Returns `None` when nothing was run.
    pub(super) async fn run_legacy(
        &self,
        cancel: &CancellationToken,
        blocks: &[CommandBlock],
        outcome: &mut RunOutcome,
    ) -> Result<Option<BatchExecutionResult>, AgentError> {
        let choice = self.operator.choose_legacy(cancel, blocks).await?;
        let scripts: Vec<String> = match choice {
            LegacyChoice::Skip => {
                info!("Legacy command blocks skipped");
                return Ok(None);
            }
            LegacyChoice::Simulate => {
                for block in blocks {
                    self.operator.display(&AgentEvent::Response {
                        content: format!("[simulate] {SHELL_TOOL} would run:\n{}", block.script),
                    });
                }
                return Ok(None);
            }
            LegacyChoice::RunOne(index) => match blocks.get(index) {
                Some(block) => vec![block.script.clone()],
                None => {
                    warn!(index, blocks = blocks.len(), "Legacy block index out of range");
                    return Ok(None);
                }
            },
            LegacyChoice::RunAll => blocks.iter().map(|b| b.script.clone()).collect(),
            LegacyChoice::Edit { index, script } => {
                debug!(index, "Running edited legacy block");
                vec![script]
            }
        };

        let mut batch = BatchExecutionResult::new(scripts.len());
        for script in scripts {
            let display = format!("{SHELL_TOOL} {script}");
            if let Verdict::Denied(reason) = self.gate.authorize(cancel, SHELL_TOOL, &script).await? {
                batch.push(InvocationOutcome::failure(display, reason));
                break;
            }

            let argv = [SHELL_TOOL.to_string(), script];
            let result = self
                .execute_reported(cancel, self.shell.as_ref(), SHELL_TOOL, display, &argv, true, outcome)
                .await?;
            batch.push(result);
            if batch.is_interrupted() {
                break;
            }
        }
        Ok(Some(batch))
    }
}
