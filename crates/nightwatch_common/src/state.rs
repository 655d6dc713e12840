//! The resolution state threaded through every capability.
//!
//! State is treated as immutable: capabilities receive a value and return a
//! new one through the `with_…` builders. The orchestrator keeps the single
//! source of truth.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::execution::{ExecutionResult, FailureContext};
use crate::incident::IncidentGraph;
use crate::plan::{FeasibilityAssessment, RemediationPlan};

/// Terminal states of one incident resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Pending,
    Resolved,
    Observed,
    Dismissed,
}

/// One exchange in the planner's private conversation. Kept across
/// re-planning attempts so the planner learns from rejections without being
/// re-instructed; never serialized into the orchestrator's state view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerTurn {
    pub role: String,
    pub content: String,
}

impl PlannerTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Everything a capability may read; the only value passed between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentResolutionState {
    /// The log lines of the batch under resolution, `[container] message`
    pub logs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_graph: Option<IncidentGraph>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feasibility: Option<FeasibilityAssessment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<RemediationPlan>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<ExecutionResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_context: Option<FailureContext>,

    #[serde(default, skip_serializing)]
    pub planner_history: Vec<PlannerTurn>,

    pub plan_validated: bool,

    pub resolution: Resolution,
}

/// Cross-entity invariant violations, mostly exercised by tests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateInvariantError {
    #[error("planValidated is set but no plan is present")]
    ValidatedWithoutPlan,

    #[error("executionResult is present but the plan was never validated")]
    ExecutedWithoutValidation,

    #[error("verificationResult is present but execution did not fully succeed")]
    VerifiedWithoutCleanExecution,

    #[error("resolution is resolved but verification did not fully succeed")]
    ResolvedWithoutVerification,
}

impl IncidentResolutionState {
    pub fn new(logs: Vec<String>) -> Self {
        Self {
            logs,
            incident_graph: None,
            feasibility: None,
            plan: None,
            execution_result: None,
            verification_result: None,
            failure_context: None,
            planner_history: Vec::new(),
            plan_validated: false,
            resolution: Resolution::Pending,
        }
    }

    pub fn with_incident_graph(mut self, graph: IncidentGraph) -> Self {
        self.incident_graph = Some(graph);
        self
    }

    pub fn with_feasibility(mut self, feasibility: FeasibilityAssessment) -> Self {
        self.feasibility = Some(feasibility);
        self
    }

    /// Reset feasibility so the next loop re-assesses with new facts.
    pub fn without_feasibility(mut self) -> Self {
        self.feasibility = None;
        self
    }

    /// Install a fresh plan. Per the planning contract this clears
    /// validation, execution, verification and any failure context -
    /// everything downstream of the plan is stale once the plan changes.
    pub fn with_plan(mut self, plan: RemediationPlan) -> Self {
        self.plan = Some(plan);
        self.plan_validated = false;
        self.execution_result = None;
        self.verification_result = None;
        self.failure_context = None;
        self
    }

    pub fn with_plan_validated(mut self, validated: bool) -> Self {
        self.plan_validated = validated;
        self
    }

    pub fn with_execution_result(mut self, result: ExecutionResult) -> Self {
        self.execution_result = Some(result);
        self
    }

    pub fn with_verification_result(mut self, result: ExecutionResult) -> Self {
        self.verification_result = Some(result);
        self
    }

    pub fn with_failure_context(mut self, context: FailureContext) -> Self {
        self.failure_context = Some(context);
        self
    }

    pub fn without_failure_context(mut self) -> Self {
        self.failure_context = None;
        self
    }

    /// The operator rejected a validated plan: record their feedback and
    /// drop validation and everything after it. The plan itself is kept -
    /// only the next planning call replaces it.
    pub fn with_approval_rejected(mut self, context: FailureContext) -> Self {
        self.failure_context = Some(context);
        self.plan_validated = false;
        self.execution_result = None;
        self.verification_result = None;
        self
    }

    pub fn with_planner_history(mut self, history: Vec<PlannerTurn>) -> Self {
        self.planner_history = history;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.resolution == Resolution::Pending
    }

    /// Check the cross-entity invariants from the data model.
    pub fn check_invariants(&self) -> Result<(), StateInvariantError> {
        if self.plan_validated && self.plan.is_none() {
            return Err(StateInvariantError::ValidatedWithoutPlan);
        }
        if self.execution_result.is_some() && !(self.plan.is_some() && self.plan_validated) {
            return Err(StateInvariantError::ExecutedWithoutValidation);
        }
        if self.verification_result.is_some() {
            let clean = self
                .execution_result
                .as_ref()
                .map(|e| e.succeeded())
                .unwrap_or(false);
            if !clean {
                return Err(StateInvariantError::VerifiedWithoutCleanExecution);
            }
        }
        if self.resolution == Resolution::Resolved {
            let verified = self
                .verification_result
                .as_ref()
                .map(|v| v.succeeded())
                .unwrap_or(false);
            if !verified {
                return Err(StateInvariantError::ResolvedWithoutVerification);
            }
        }
        Ok(())
    }

    /// The JSON view the orchestrator shows the reasoner each turn. The
    /// planner's private history is excluded by `skip_serializing`.
    pub fn to_reasoner_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{FailureKind, StepResult, StepStatus};
    use crate::plan::PlanStep;
    use chrono::Utc;

    fn sample_plan() -> RemediationPlan {
        RemediationPlan {
            summary: "restart the cache".to_string(),
            steps: vec![PlanStep::new("docker start cache", "bring it back")],
            verification: vec![PlanStep::new(
                "docker inspect cache --format '{{.State.Running}}'",
                "prove recovery",
            )],
        }
    }

    fn clean_execution() -> ExecutionResult {
        ExecutionResult {
            results: vec![StepResult {
                step: "docker start cache".to_string(),
                status: StepStatus::Success,
                exit_code: 0,
                stdout: "cache".to_string(),
                stderr: String::new(),
                timestamp: Utc::now(),
            }],
            failed_at_step: -1,
        }
    }

    #[test]
    fn test_new_state_is_pending() {
        let state = IncidentResolutionState::new(vec!["[cache] gone".to_string()]);
        assert!(state.is_pending());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_with_plan_clears_downstream() {
        let state = IncidentResolutionState::new(vec![])
            .with_plan(sample_plan())
            .with_plan_validated(true)
            .with_execution_result(clean_execution())
            .with_failure_context(FailureContext::new(FailureKind::VerificationFailed));

        let replanned = state.with_plan(sample_plan());
        assert!(!replanned.plan_validated);
        assert!(replanned.execution_result.is_none());
        assert!(replanned.verification_result.is_none());
        assert!(replanned.failure_context.is_none());
        assert!(replanned.plan.is_some());
    }

    #[test]
    fn test_approval_rejection_keeps_plan() {
        let state = IncidentResolutionState::new(vec![])
            .with_plan(sample_plan())
            .with_plan_validated(true);

        let rejected = state.with_approval_rejected(
            FailureContext::new(FailureKind::UserRejected).with_reason("don't restart the db"),
        );
        assert!(rejected.plan.is_some());
        assert!(!rejected.plan_validated);
        assert!(rejected.failure_context.is_some());
    }

    #[test]
    fn test_invariant_validated_without_plan() {
        let state = IncidentResolutionState::new(vec![]).with_plan_validated(true);
        assert_eq!(
            state.check_invariants(),
            Err(StateInvariantError::ValidatedWithoutPlan)
        );
    }

    #[test]
    fn test_invariant_executed_without_validation() {
        let state = IncidentResolutionState::new(vec![])
            .with_plan(sample_plan())
            .with_execution_result(clean_execution());
        assert_eq!(
            state.check_invariants(),
            Err(StateInvariantError::ExecutedWithoutValidation)
        );
    }

    #[test]
    fn test_invariant_verified_without_clean_execution() {
        let mut failed = clean_execution();
        failed.failed_at_step = 0;
        failed.results[0].status = StepStatus::Failure;

        let state = IncidentResolutionState::new(vec![])
            .with_plan(sample_plan())
            .with_plan_validated(true)
            .with_execution_result(failed)
            .with_verification_result(ExecutionResult::empty());
        assert_eq!(
            state.check_invariants(),
            Err(StateInvariantError::VerifiedWithoutCleanExecution)
        );
    }

    #[test]
    fn test_resolved_requires_verification() {
        let state = IncidentResolutionState::new(vec![])
            .with_plan(sample_plan())
            .with_plan_validated(true)
            .with_execution_result(clean_execution())
            .with_resolution(Resolution::Resolved);
        assert_eq!(
            state.check_invariants(),
            Err(StateInvariantError::ResolvedWithoutVerification)
        );

        let resolved = state.with_verification_result(ExecutionResult::empty());
        assert!(resolved.check_invariants().is_ok());
    }

    #[test]
    fn test_planner_history_excluded_from_reasoner_view() {
        let state = IncidentResolutionState::new(vec!["[cache] down".to_string()])
            .with_planner_history(vec![PlannerTurn::new("user", "plan something")]);
        let view = state.to_reasoner_value();
        assert!(view.get("plannerHistory").is_none());
        assert_eq!(view["resolution"], "pending");
        assert_eq!(view["planValidated"], false);
    }
}
