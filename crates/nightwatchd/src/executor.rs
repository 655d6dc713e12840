//! Command executor.
//!
//! Runs an ordered list of validated commands directly (argv invocation,
//! never through a shell) and stops at the first failure. The executor
//! imposes no timeout of its own; cancellation is inherited from the
//! enclosing task.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::info;

use nightwatch_common::execution::{ExecutionResult, StepResult, StepStatus, NO_FAILURE};

/// Captured output of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code as the runtime reported it; `-1` when the process was
    /// terminated by a signal. Any non-zero value is a failure.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a single command string. Production uses [`SystemRunner`]; tests
/// script outcomes through [`FakeRunner`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// Direct process invocation in the ambient environment.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let argv = split_command(command)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command"))?;

        let output = Command::new(program).args(args).output().await?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Split a command line into argv, honouring single and double quotes.
/// No expansion of any kind happens here; quotes only group words.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let mut argv = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in command.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        argv.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err(anyhow!("unterminated quote in command: {}", command));
    }
    if in_word {
        argv.push(current);
    }
    if argv.is_empty() {
        return Err(anyhow!("empty command"));
    }
    Ok(argv)
}

/// Run `commands` in order, stopping at the first failure.
///
/// The returned trace satisfies the executor contract: `failed_at_step`
/// is `-1` when everything succeeded, otherwise the index of the first
/// failure, with exactly that many prior results recorded.
pub async fn execute_commands(
    runner: &dyn CommandRunner,
    commands: &[String],
) -> ExecutionResult {
    let mut results = Vec::new();

    for (index, command) in commands.iter().enumerate() {
        info!("[>]  step {}/{}: {}", index + 1, commands.len(), command);

        let outcome = runner.run(command).await;
        let (status, exit_code, stdout, stderr) = match outcome {
            Ok(out) => (
                if out.succeeded() {
                    StepStatus::Success
                } else {
                    StepStatus::Failure
                },
                out.exit_code,
                out.stdout,
                out.stderr,
            ),
            // Spawn failures (missing binary, bad tokenization) are step
            // failures too, not orchestration errors.
            Err(e) => (StepStatus::Failure, -1, String::new(), e.to_string()),
        };

        let failed = status == StepStatus::Failure;
        results.push(StepResult {
            step: command.clone(),
            status,
            exit_code,
            stdout,
            stderr,
            timestamp: Utc::now(),
        });

        if failed {
            info!("[-]  step {} failed (exit {})", index + 1, exit_code);
            return ExecutionResult {
                results,
                failed_at_step: index as i32,
            };
        }
    }

    ExecutionResult {
        results,
        failed_at_step: NO_FAILURE,
    }
}

/// Scripted runner for tests: map command → outcome, default success.
#[derive(Debug, Default)]
pub struct FakeRunner {
    outcomes: std::sync::Mutex<std::collections::HashMap<String, CommandOutput>>,
    ran: std::sync::Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(self, command: &str, outcome: CommandOutput) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .insert(command.to_string(), outcome);
        self
    }

    pub fn with_success(self, command: &str, stdout: &str) -> Self {
        self.with_outcome(
            command,
            CommandOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        )
    }

    pub fn with_failure(self, command: &str, exit_code: i32, stderr: &str) -> Self {
        self.with_outcome(
            command,
            CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        )
    }

    /// Commands actually executed, in order.
    pub fn ran(&self) -> Vec<String> {
        self.ran.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.ran.lock().unwrap().push(command.to_string());
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or(CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            }))
    }
}

// ============================================================================
// Tests
// ============================================================================
