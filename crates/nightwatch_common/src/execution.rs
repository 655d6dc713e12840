//! Execution traces and the cross-capability failure back-channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel for "no step failed".
pub const NO_FAILURE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
}

/// Outcome of one executed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// The command that ran
    pub step: String,

    pub status: StepStatus,

    pub exit_code: i32,

    /// Trimmed stdout
    pub stdout: String,

    /// Trimmed stderr
    pub stderr: String,

    pub timestamp: DateTime<Utc>,
}

impl StepResult {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Trace of an ordered command run that stops at the first failure.
///
/// `failed_at_step` is `-1` when every step succeeded; otherwise it is the
/// zero-based index of the first failing step and `results` holds exactly
/// `failed_at_step + 1` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub results: Vec<StepResult>,

    pub failed_at_step: i32,
}

impl ExecutionResult {
    /// Trace for an empty command list - vacuously successful.
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            failed_at_step: NO_FAILURE,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failed_at_step == NO_FAILURE
    }

    /// The failing step's result, when there is one.
    pub fn failed_step(&self) -> Option<&StepResult> {
        if self.failed_at_step < 0 {
            None
        } else {
            self.results.get(self.failed_at_step as usize)
        }
    }
}

/// Why the last forward step failed - consumed by the next planning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RemediationCommandRejected,
    VerificationCommandRejected,
    ExecutionFailed,
    VerificationFailed,
    UserRejected,
}

/// The cross-capability back-channel: set by whichever capability hit a
/// wall, cleared by any capability that makes forward progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureContext {
    #[serde(rename = "type")]
    pub kind: FailureKind,

    /// The offending command, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Captured command output, for execution and verification failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl FailureContext {
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            step: None,
            reason: None,
            output: None,
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}
