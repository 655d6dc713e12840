//! `planRemediation` and `validatePlan`.
//!
//! Planning keeps a private conversation across replans so the planner
//! sees its own rejected attempts; validation gates every command through
//! the safety grammar and tags the failure for the back-channel.

use std::sync::LazyLock;

use serde_json::Value;

use nightwatch_common::execution::FailureContext;
use nightwatch_common::plan::RemediationPlan;
use nightwatch_common::state::{IncidentResolutionState, PlannerTurn};
use nightwatch_common::validator;

use super::{Capabilities, CapabilityResult};
use crate::prompts::PLANNER_SYSTEM;
use crate::reasoner::{ChatMessage, ChatRole};

static PLAN_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary": {"type": "string"},
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "action": {"type": "string"},
                        "reason": {"type": "string"}
                    },
                    "required": ["action", "reason"]
                }
            },
            "verification": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "action": {"type": "string"},
                        "reason": {"type": "string"}
                    },
                    "required": ["action", "reason"]
                }
            }
        },
        "required": ["summary", "steps", "verification"]
    })
});

fn planner_turn_to_message(turn: &PlannerTurn) -> ChatMessage {
    match turn.role.as_str() {
        "system" => ChatMessage::system(turn.content.clone()),
        "assistant" => ChatMessage::assistant(turn.content.clone()),
        _ => ChatMessage::user(turn.content.clone()),
    }
}

fn message_to_planner_turn(message: &ChatMessage) -> PlannerTurn {
    let role = match message.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    };
    PlannerTurn::new(role, message.content.clone())
}

impl Capabilities {
    pub(crate) async fn plan_remediation(
        &self,
        state: IncidentResolutionState,
    ) -> CapabilityResult {
        let feasible = state
            .feasibility
            .as_ref()
            .map(|f| f.feasible)
            .unwrap_or(false);
        if !feasible {
            return CapabilityResult::fail(
                state,
                "precondition: feasibility has not been positively assessed",
            );
        }
        if state.plan.is_some() && state.failure_context.is_none() {
            return CapabilityResult::fail(
                state,
                "precondition: a plan already exists and nothing has failed",
            );
        }

        let graph_json = state
            .incident_graph
            .as_ref()
            .and_then(|g| serde_json::to_string_pretty(g).ok())
            .unwrap_or_default();
        let facts = self.knowledge.facts_as_string();

        let mut opening = format!(
            "Known containers: {}\n\nIncident graph:\n{}\n\nRecorded facts:\n{}",
            self.known_containers.join(", "),
            graph_json,
            if facts.is_empty() { "(none)" } else { facts.as_str() }
        );
        if let Some(context) = &state.failure_context {
            opening.push_str(&format!(
                "\n\nThe previous attempt failed. Address this before anything else:\n{}",
                serde_json::to_string_pretty(context).unwrap_or_default()
            ));
        }

        // Resume the planner's private conversation.
        let mut history: Vec<ChatMessage> = state
            .planner_history
            .iter()
            .map(planner_turn_to_message)
            .collect();

        let value = match self
            .gateway
            .structured_call(
                PLANNER_SYSTEM,
                &opening,
                &[],
                &crate::reasoner::NoTools,
                &PLAN_SCHEMA,
                &mut history,
            )
            .await
        {
            Ok(value) => value,
            Err(e) => return CapabilityResult::fail(state, format!("planning failed: {}", e)),
        };

        let plan: RemediationPlan = match serde_json::from_value(value) {
            Ok(plan) => plan,
            Err(e) => return CapabilityResult::fail(state, format!("unusable plan: {}", e)),
        };

        let summary = if plan.is_noop() {
            format!("planned 0 steps (no safe remediation): {}", plan.summary)
        } else {
            format!(
                "planned {} step(s), {} verification command(s)",
                plan.steps.len(),
                plan.verification.len()
            )
        };

        let planner_history = history.iter().map(message_to_planner_turn).collect();
        CapabilityResult::ok(
            state.with_plan(plan).with_planner_history(planner_history),
            summary,
        )
    }

    pub(crate) async fn validate_plan(&self, state: IncidentResolutionState) -> CapabilityResult {
        let Some(plan) = state.plan.clone() else {
            return CapabilityResult::fail(state, "precondition: no plan to validate");
        };
        if state.plan_validated {
            return CapabilityResult::fail(state, "plan is already validated");
        }

        match validator::validate_plan(&plan, &self.known_containers) {
            Ok(()) => {
                let summary = format!(
                    "plan validated ({} step(s), {} verification command(s))",
                    plan.steps.len(),
                    plan.verification.len()
                );
                CapabilityResult::ok(state.with_plan_validated(true), summary)
            }
            Err(violation) => {
                let kind = validator::violation_kind(&plan, &violation);
                let error = format!(
                    "command rejected: `{}` ({})",
                    violation.command, violation.rejection
                );
                let context = FailureContext::new(kind)
                    .with_step(violation.command)
                    .with_reason(violation.rejection.to_string());
                CapabilityResult::fail(state.with_failure_context(context), error)
            }
        }
    }
}
