//! `executePlan`, `verifyPlan` and the observe-mode terminal
//! `reportFindings`.

use nightwatch_common::execution::{ExecutionResult, FailureContext, FailureKind};
use nightwatch_common::state::{IncidentResolutionState, Resolution};

use super::{Capabilities, CapabilityResult};
use crate::executor::execute_commands;

impl Capabilities {
    pub(crate) async fn execute_plan(&self, state: IncidentResolutionState) -> CapabilityResult {
        let Some(plan) = state.plan.clone() else {
            return CapabilityResult::fail(state, "precondition: no plan to execute");
        };
        if !state.plan_validated {
            return CapabilityResult::fail(state, "precondition: plan has not been validated");
        }
        if plan.is_noop() {
            return CapabilityResult::fail(
                state,
                "precondition: refusing to execute an empty plan (no safe remediation)",
            );
        }

        let commands: Vec<String> = plan.steps.iter().map(|s| s.action.clone()).collect();
        let trace = execute_commands(self.runner.as_ref(), &commands).await;

        if trace.succeeded() {
            let summary = format!("all {} step(s) succeeded", trace.results.len());
            CapabilityResult::ok(state.with_execution_result(trace), summary)
        } else {
            let (step, reason, output) = describe_failure(&trace);
            let error = format!("execution failed at step {}: {}", trace.failed_at_step, reason);
            let context = FailureContext::new(FailureKind::ExecutionFailed)
                .with_step(step)
                .with_reason(reason)
                .with_output(output);
            CapabilityResult::fail(
                state.with_execution_result(trace).with_failure_context(context),
                error,
            )
        }
    }

    pub(crate) async fn verify_plan(&self, state: IncidentResolutionState) -> CapabilityResult {
        let executed_cleanly = state
            .execution_result
            .as_ref()
            .map(|e| e.succeeded())
            .unwrap_or(false);
        if !executed_cleanly {
            return CapabilityResult::fail(
                state,
                "precondition: execution has not fully succeeded",
            );
        }
        let Some(plan) = state.plan.clone() else {
            return CapabilityResult::fail(state, "precondition: no plan to verify");
        };

        // No verification commands: successful execution is the proof.
        if plan.verification.is_empty() {
            let next = state
                .with_verification_result(ExecutionResult::empty())
                .with_resolution(Resolution::Resolved);
            return CapabilityResult::ok(next, "no verification commands; incident resolved");
        }

        let commands: Vec<String> = plan.verification.iter().map(|s| s.action.clone()).collect();
        let trace = execute_commands(self.runner.as_ref(), &commands).await;

        if trace.succeeded() {
            let summary = format!(
                "verification passed ({} command(s)); incident resolved",
                trace.results.len()
            );
            let next = state
                .with_verification_result(trace)
                .with_resolution(Resolution::Resolved);
            CapabilityResult::ok(next, summary)
        } else {
            let (step, reason, output) = describe_failure(&trace);
            let error = format!("verification failed: {}", reason);
            let context = FailureContext::new(FailureKind::VerificationFailed)
                .with_step(step)
                .with_reason(reason)
                .with_output(output);
            CapabilityResult::fail(
                state
                    .with_verification_result(trace)
                    .with_failure_context(context),
                error,
            )
        }
    }

    pub(crate) async fn report_findings(&self, state: IncidentResolutionState) -> CapabilityResult {
        if state.feasibility.is_none() {
            return CapabilityResult::fail(
                state,
                "precondition: findings require an assessed incident",
            );
        }

        let diagnosis = state
            .incident_graph
            .as_ref()
            .map(|g| g.summary.clone())
            .unwrap_or_default();
        let assessment = state
            .feasibility
            .as_ref()
            .map(|f| f.summary.clone())
            .unwrap_or_default();

        let summary = format!("observed: {} ({})", diagnosis, assessment);
        CapabilityResult::ok(state.with_resolution(Resolution::Observed), summary)
    }
}

/// Pull the failing step's command, a short reason and its output from a
/// trace that is known to have failed.
fn describe_failure(trace: &ExecutionResult) -> (String, String, String) {
    match trace.failed_step() {
        Some(step) => {
            let output = if step.stderr.is_empty() {
                step.stdout.clone()
            } else if step.stdout.is_empty() {
                step.stderr.clone()
            } else {
                format!("{}\n{}", step.stdout, step.stderr)
            };
            (
                step.step.clone(),
                format!("exit code {}", step.exit_code),
                output,
            )
        }
        None => (String::new(), "unknown step".to_string(), String::new()),
    }
}
