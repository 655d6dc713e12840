//! Feasibility assessments and remediation plans.

use serde::{Deserialize, Serialize};

/// Whether a deterministic, safely verifiable remediation can be produced
/// from the facts currently available.
///
/// Invariant: `feasible` is true exactly when `blocking_reason` is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeasibilityAssessment {
    pub feasible: bool,

    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_reason: Option<String>,
}

impl FeasibilityAssessment {
    pub fn feasible(summary: impl Into<String>) -> Self {
        Self {
            feasible: true,
            summary: summary.into(),
            blocking_reason: None,
        }
    }

    pub fn blocked(summary: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            feasible: false,
            summary: summary.into(),
            blocking_reason: Some(reason.into()),
        }
    }

    /// Restore the `feasible ⇔ blocking_reason absent` invariant on data
    /// that arrived from the reasoner.
    pub fn normalized(mut self) -> Self {
        if self.feasible {
            self.blocking_reason = None;
        } else if self.blocking_reason.is_none() {
            self.blocking_reason = Some(self.summary.clone());
        }
        self
    }
}

/// One command in a plan, with the reasoner's justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// The command to run
    pub action: String,

    /// Why this step is needed
    pub reason: String,
}

impl PlanStep {
    pub fn new(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            reason: reason.into(),
        }
    }
}

/// Ordered remediation steps plus the verification commands that prove
/// recovery. Empty `steps` means the planner found no safe remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub summary: String,

    #[serde(default)]
    pub steps: Vec<PlanStep>,

    #[serde(default)]
    pub verification: Vec<PlanStep>,
}

impl RemediationPlan {
    /// True when the planner produced no remediation commands at all -
    /// the signal that the incident needs a human.
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every command in the plan: remediation steps first, then verification.
    pub fn all_commands(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().chain(self.verification.iter())
    }

    /// Whether `command` appears in the verification list.
    pub fn is_verification_command(&self, command: &str) -> bool {
        self.verification.iter().any(|s| s.action == command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feasible_has_no_blocking_reason() {
        let a = FeasibilityAssessment::feasible("restart is safe");
        assert!(a.feasible);
        assert!(a.blocking_reason.is_none());
    }

    #[test]
    fn test_blocked_carries_reason() {
        let a = FeasibilityAssessment::blocked("memory limit unknown", "operator skipped the question");
        assert!(!a.feasible);
        assert_eq!(
            a.blocking_reason.as_deref(),
            Some("operator skipped the question")
        );
    }

    #[test]
    fn test_normalized_drops_reason_when_feasible() {
        let a = FeasibilityAssessment {
            feasible: true,
            summary: "ok".to_string(),
            blocking_reason: Some("stale".to_string()),
        };
        assert!(a.normalized().blocking_reason.is_none());
    }

    #[test]
    fn test_normalized_fills_reason_when_blocked() {
        let a = FeasibilityAssessment {
            feasible: false,
            summary: "cannot verify".to_string(),
            blocking_reason: None,
        };
        assert_eq!(a.normalized().blocking_reason.as_deref(), Some("cannot verify"));
    }

    #[test]
    fn test_noop_plan() {
        let plan = RemediationPlan {
            summary: "no safe remediation".to_string(),
            steps: vec![],
            verification: vec![],
        };
        assert!(plan.is_noop());
    }

    #[test]
    fn test_verification_membership() {
        let plan = RemediationPlan {
            summary: "restart cache".to_string(),
            steps: vec![PlanStep::new("docker start cache", "bring the cache back")],
            verification: vec![PlanStep::new(
                "docker inspect cache --format '{{.State.Running}}'",
                "confirm it is running",
            )],
        };
        assert!(plan.is_verification_command(
            "docker inspect cache --format '{{.State.Running}}'"
        ));
        assert!(!plan.is_verification_command("docker start cache"));
        assert_eq!(plan.all_commands().count(), 2);
    }
}
