//! Capability library.
//!
//! Nine named capabilities with one contract: take the current resolution
//! state, return a new state plus success/error/idle flags. Preconditions
//! are enforced here as capability failures, not panics - defence in depth
//! against a reasoner that picks the wrong tool, and the failure text
//! feeds straight back so it can re-pick.
//!
//! `requestApproval` and `escalate` are declared here but handled inline
//! by the orchestrator: they consume arguments from the current turn and
//! may terminate the loop.

mod analyze;
mod execution;
mod feasibility;
mod planning;

use std::sync::Arc;

use serde_json::Value;

use nightwatch_common::config::Mode;
use nightwatch_common::knowledge::KnowledgeStore;
use nightwatch_common::state::IncidentResolutionState;

use crate::console::OperatorConsole;
use crate::executor::CommandRunner;
use crate::reasoner::{ReasonerGateway, ToolDecl};
use crate::runtime::ContainerRuntime;

/// The closed set of capabilities the reasoner may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    AnalyzeIncident,
    AssessFeasibility,
    PlanRemediation,
    ValidatePlan,
    RequestApproval,
    ExecutePlan,
    VerifyPlan,
    ReportFindings,
    Escalate,
}

impl CapabilityKind {
    pub fn name(&self) -> &'static str {
        match self {
            CapabilityKind::AnalyzeIncident => "analyzeIncident",
            CapabilityKind::AssessFeasibility => "assessFeasibility",
            CapabilityKind::PlanRemediation => "planRemediation",
            CapabilityKind::ValidatePlan => "validatePlan",
            CapabilityKind::RequestApproval => "requestApproval",
            CapabilityKind::ExecutePlan => "executePlan",
            CapabilityKind::VerifyPlan => "verifyPlan",
            CapabilityKind::ReportFindings => "reportFindings",
            CapabilityKind::Escalate => "escalate",
        }
    }

    /// Unknown names are a protocol error - the reasoner only ever gets
    /// the closed set.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "analyzeIncident" => Some(CapabilityKind::AnalyzeIncident),
            "assessFeasibility" => Some(CapabilityKind::AssessFeasibility),
            "planRemediation" => Some(CapabilityKind::PlanRemediation),
            "validatePlan" => Some(CapabilityKind::ValidatePlan),
            "requestApproval" => Some(CapabilityKind::RequestApproval),
            "executePlan" => Some(CapabilityKind::ExecutePlan),
            "verifyPlan" => Some(CapabilityKind::VerifyPlan),
            "reportFindings" => Some(CapabilityKind::ReportFindings),
            "escalate" => Some(CapabilityKind::Escalate),
            _ => None,
        }
    }

    /// Human interaction happens inline in the orchestrator.
    pub fn is_inline(&self) -> bool {
        matches!(self, CapabilityKind::RequestApproval | CapabilityKind::Escalate)
    }

    /// Which capabilities a mode exposes to the reasoner.
    pub fn for_mode(mode: Mode) -> &'static [CapabilityKind] {
        match mode {
            Mode::Observe => &[
                CapabilityKind::AnalyzeIncident,
                CapabilityKind::AssessFeasibility,
                CapabilityKind::Escalate,
                CapabilityKind::ReportFindings,
            ],
            Mode::Remediate => &[
                CapabilityKind::AnalyzeIncident,
                CapabilityKind::AssessFeasibility,
                CapabilityKind::Escalate,
                CapabilityKind::PlanRemediation,
                CapabilityKind::ValidatePlan,
                CapabilityKind::RequestApproval,
                CapabilityKind::ExecutePlan,
                CapabilityKind::VerifyPlan,
            ],
        }
    }

    fn description(&self) -> &'static str {
        match self {
            CapabilityKind::AnalyzeIncident => {
                "Classify the log batch into an incident graph, or report that nothing is actionable"
            }
            CapabilityKind::AssessFeasibility => {
                "Judge whether a safe, verifiable remediation exists for the analyzed incident"
            }
            CapabilityKind::PlanRemediation => {
                "Produce or revise the remediation plan for a feasible incident"
            }
            CapabilityKind::ValidatePlan => {
                "Run the safety validator over every command in the current plan"
            }
            CapabilityKind::RequestApproval => {
                "Ask the operator to approve the validated plan before execution"
            }
            CapabilityKind::ExecutePlan => "Execute the approved remediation steps in order",
            CapabilityKind::VerifyPlan => {
                "Run the plan's verification commands and resolve the incident on success"
            }
            CapabilityKind::ReportFindings => {
                "Observe-mode terminal: report the diagnosis without acting"
            }
            CapabilityKind::Escalate => {
                "Hand the incident to the operator with a reason and the context you need"
            }
        }
    }

    /// Tool declaration offered to the reasoner for this capability.
    pub fn tool_decl(&self) -> ToolDecl {
        let parameters = match self {
            CapabilityKind::Escalate => serde_json::json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "Why the incident needs a human"
                    },
                    "needed_context": {
                        "type": "string",
                        "description": "What you need from the operator to continue"
                    }
                },
                "required": ["reason", "needed_context"]
            }),
            _ => serde_json::json!({"type": "object", "properties": {}}),
        };
        ToolDecl::new(self.name(), self.description(), parameters)
    }

    pub fn tool_decls_for_mode(mode: Mode) -> Vec<ToolDecl> {
        Self::for_mode(mode).iter().map(|k| k.tool_decl()).collect()
    }
}

/// Uniform capability outcome: the (possibly updated) state plus flags.
#[derive(Debug)]
pub struct CapabilityResult {
    pub state: IncidentResolutionState,
    pub success: bool,
    pub data: Option<String>,
    pub error: Option<String>,
    pub idle: bool,
}

impl CapabilityResult {
    pub fn ok(state: IncidentResolutionState, data: impl Into<String>) -> Self {
        Self {
            state,
            success: true,
            data: Some(data.into()),
            error: None,
            idle: false,
        }
    }

    pub fn fail(state: IncidentResolutionState, error: impl Into<String>) -> Self {
        Self {
            state,
            success: false,
            data: None,
            error: Some(error.into()),
            idle: false,
        }
    }

    /// Analyzer-only: nothing actionable in this batch.
    pub fn idle(state: IncidentResolutionState) -> Self {
        Self {
            state,
            success: true,
            data: Some("no actionable incident".to_string()),
            error: None,
            idle: true,
        }
    }

    /// One-line summary for audit entries and reasoner feedback.
    pub fn summary(&self) -> String {
        if let Some(error) = &self.error {
            error.clone()
        } else {
            self.data.clone().unwrap_or_default()
        }
    }
}

/// The capability handlers and everything they may touch.
pub struct Capabilities {
    pub(crate) gateway: ReasonerGateway,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) console: Arc<dyn OperatorConsole>,
    pub(crate) knowledge: KnowledgeStore,
    pub(crate) known_containers: Vec<String>,
}

impl Capabilities {
    pub fn new(
        gateway: ReasonerGateway,
        runtime: Arc<dyn ContainerRuntime>,
        runner: Arc<dyn CommandRunner>,
        console: Arc<dyn OperatorConsole>,
        knowledge: KnowledgeStore,
        known_containers: Vec<String>,
    ) -> Self {
        Self {
            gateway,
            runtime,
            runner,
            console,
            knowledge,
            known_containers,
        }
    }

    /// Run one capability handler against the state.
    pub async fn dispatch(
        &self,
        kind: CapabilityKind,
        state: IncidentResolutionState,
    ) -> CapabilityResult {
        match kind {
            CapabilityKind::AnalyzeIncident => self.analyze_incident(state).await,
            CapabilityKind::AssessFeasibility => self.assess_feasibility(state).await,
            CapabilityKind::PlanRemediation => self.plan_remediation(state).await,
            CapabilityKind::ValidatePlan => self.validate_plan(state).await,
            CapabilityKind::ExecutePlan => self.execute_plan(state).await,
            CapabilityKind::VerifyPlan => self.verify_plan(state).await,
            CapabilityKind::ReportFindings => self.report_findings(state).await,
            CapabilityKind::RequestApproval | CapabilityKind::Escalate => CapabilityResult::fail(
                state,
                format!("{} is handled inline by the orchestrator", kind.name()),
            ),
        }
    }
}

/// Lenient string extraction from reasoner JSON.
pub(crate) fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for kind in CapabilityKind::for_mode(Mode::Remediate) {
            assert_eq!(CapabilityKind::from_name(kind.name()), Some(*kind));
        }
        assert_eq!(CapabilityKind::from_name("selfDestruct"), None);
    }

    #[test]
    fn test_observe_mode_excludes_remediation() {
        let observe = CapabilityKind::for_mode(Mode::Observe);
        assert!(observe.contains(&CapabilityKind::ReportFindings));
        assert!(!observe.contains(&CapabilityKind::ExecutePlan));
        assert!(!observe.contains(&CapabilityKind::PlanRemediation));
    }

    #[test]
    fn test_remediate_mode_excludes_report() {
        let remediate = CapabilityKind::for_mode(Mode::Remediate);
        assert!(!remediate.contains(&CapabilityKind::ReportFindings));
        assert!(remediate.contains(&CapabilityKind::RequestApproval));
        assert_eq!(remediate.len(), 8);
    }

    #[test]
    fn test_escalate_tool_requires_arguments() {
        let decl = CapabilityKind::Escalate.tool_decl();
        assert_eq!(decl.parameters["required"][0], "reason");
        assert_eq!(decl.parameters["required"][1], "needed_context");
    }

    #[test]
    fn test_inline_capabilities() {
        assert!(CapabilityKind::Escalate.is_inline());
        assert!(CapabilityKind::RequestApproval.is_inline());
        assert!(!CapabilityKind::ExecutePlan.is_inline());
    }
}
