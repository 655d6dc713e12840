//! Orchestrator - drives one incident from a log batch to a terminal state.
//!
//! Each turn the current state is serialized for the reasoner, which picks
//! exactly one capability from the mode's tool set. Human interaction
//! (approval, escalation) is handled inline; everything else dispatches
//! into the capability library. A circuit breaker converts exhausted
//! replan budgets into an operator escalation instead of endless
//! iteration.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use nightwatch_common::audit::{AuditEntry, AuditLog, AuditResult};
use nightwatch_common::config::Mode;
use nightwatch_common::execution::{FailureContext, FailureKind};
use nightwatch_common::knowledge::KnowledgeStore;
use nightwatch_common::state::{IncidentResolutionState, Resolution};

use crate::capabilities::{Capabilities, CapabilityKind, CapabilityResult};
use crate::console::{ApprovalOutcome, EscalationOutcome, OperatorConsole};
use crate::observer::LogBatch;
use crate::prompts::ORCHESTRATOR_SYSTEM;
use crate::reasoner::{ChatMessage, ReasonerGateway, ToolCall};

/// Consecutive reasoner stalls (errors, missing or unknown tool calls)
/// tolerated before the incident is abandoned as an orchestration error.
const MAX_CONSECUTIVE_STALLS: u32 = 5;

/// Hard backstop on loop turns per incident. The replan circuit breaker
/// bounds real work; this bounds a reasoner that dithers without ever
/// replanning.
const MAX_LOOP_TURNS: u32 = 64;

/// How one incident ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentOutcome {
    Resolved,
    Observed,
    Dismissed,
    /// Nothing actionable in the batch; the observer carries on.
    Idle,
}

pub struct Orchestrator {
    gateway: ReasonerGateway,
    capabilities: Capabilities,
    console: Arc<dyn OperatorConsole>,
    knowledge: KnowledgeStore,
    audit: AuditLog,
    mode: Mode,
    max_attempts: u32,
}

impl Orchestrator {
    pub fn new(
        gateway: ReasonerGateway,
        capabilities: Capabilities,
        console: Arc<dyn OperatorConsole>,
        knowledge: KnowledgeStore,
        audit: AuditLog,
        mode: Mode,
        max_attempts: u32,
    ) -> Self {
        Self {
            gateway,
            capabilities,
            console,
            knowledge,
            audit,
            mode,
            max_attempts,
        }
    }

    /// Resolve one batch. Returns when the incident reaches a terminal
    /// state or the analyzer signals that nothing is actionable.
    pub async fn resolve_batch(&self, batch: &LogBatch) -> Result<IncidentOutcome> {
        let incident_id = Uuid::new_v4().to_string();
        info!(
            "[*]  incident {}: {} line(s) from {:?} ({} mode)",
            incident_id,
            batch.logs.len(),
            batch.containers,
            self.mode.as_str()
        );

        let mut state = IncidentResolutionState::new(batch.logs.clone());
        let mut history = vec![ChatMessage::system(ORCHESTRATOR_SYSTEM)];
        let tools = CapabilityKind::tool_decls_for_mode(self.mode);

        let mut attempt_count: u32 = 0;
        let mut stalls: u32 = 0;
        let mut turns: u32 = 0;

        while state.is_pending() {
            turns += 1;
            if turns > MAX_LOOP_TURNS {
                self.record(&incident_id, AuditResult::Failure, "orchestrator", "turn budget exhausted");
                return Err(anyhow!(
                    "incident {} abandoned after {} turns",
                    incident_id,
                    MAX_LOOP_TURNS
                ));
            }

            // Circuit breaker: exhausted replans become a human decision.
            if attempt_count >= self.max_attempts {
                let reason = format!(
                    "replan budget exhausted ({} attempts without progress)",
                    attempt_count
                );
                let needed = "guidance on how to remediate, or permission to dismiss";
                self.record(&incident_id, AuditResult::Blocked, "circuitBreaker", &reason);

                match self.run_escalation(&incident_id, &mut state, &reason, needed).await? {
                    EscalationOutcome::Dismissed => break,
                    EscalationOutcome::Context(context) => {
                        attempt_count = 0;
                        history.push(ChatMessage::user(format!(
                            "The operator provided new context: {}",
                            context
                        )));
                        continue;
                    }
                }
            }

            history.push(ChatMessage::user(format!(
                "Current state:\n{}",
                state.to_reasoner_value()
            )));

            let message = match self.gateway.step(&mut history, &tools).await {
                Ok(message) => message,
                Err(e) => {
                    warn!("[!]  unexpected orchestration error: {}", e);
                    self.record(
                        &incident_id,
                        AuditResult::Failure,
                        "reasoner",
                        &format!("unexpected orchestration error: {}", e),
                    );
                    stalls += 1;
                    if stalls >= MAX_CONSECUTIVE_STALLS {
                        return Err(anyhow!("reasoner unavailable: {}", e));
                    }
                    history.push(ChatMessage::user(
                        "The previous attempt errored. Pick the next capability again.",
                    ));
                    continue;
                }
            };

            let Some(call) = message.tool_calls().first().cloned() else {
                stalls += 1;
                if stalls >= MAX_CONSECUTIVE_STALLS {
                    return Err(anyhow!("reasoner refuses to pick a capability"));
                }
                history.push(ChatMessage::user(
                    "Respond by calling exactly one capability tool, nothing else.",
                ));
                continue;
            };

            let Some(kind) = CapabilityKind::from_name(&call.function.name) else {
                // Unknown tag: protocol error, surface and re-pick.
                stalls += 1;
                if stalls >= MAX_CONSECUTIVE_STALLS {
                    return Err(anyhow!(
                        "reasoner keeps calling unknown capability {}",
                        call.function.name
                    ));
                }
                self.record(
                    &incident_id,
                    AuditResult::Failure,
                    &call.function.name,
                    "unknown capability (protocol error)",
                );
                history.push(ChatMessage::tool_response(
                    call.function.name.clone(),
                    format!("Unknown capability '{}'.", call.function.name),
                ));
                continue;
            };

            // Mode gating is enforced here too, not just via the offered
            // tool list.
            if !CapabilityKind::for_mode(self.mode).contains(&kind) {
                stalls += 1;
                if stalls >= MAX_CONSECUTIVE_STALLS {
                    return Err(anyhow!(
                        "reasoner keeps picking {} outside {} mode",
                        kind.name(),
                        self.mode.as_str()
                    ));
                }
                self.record(
                    &incident_id,
                    AuditResult::Blocked,
                    kind.name(),
                    &format!("not permitted in {} mode", self.mode.as_str()),
                );
                history.push(ChatMessage::tool_response(
                    kind.name(),
                    format!(
                        "{} is not available in {} mode.",
                        kind.name(),
                        self.mode.as_str()
                    ),
                ));
                continue;
            }
            stalls = 0;

            info!("[>]  incident {}: {}", incident_id, kind.name());

            if kind.is_inline() {
                state = self
                    .dispatch_inline(&incident_id, kind, &call, state, &mut history)
                    .await?;
                continue;
            }

            // Replans are the unit of the attempt budget: a planning call
            // that follows a failure context is a genuine retry.
            if kind == CapabilityKind::PlanRemediation && state.failure_context.is_some() {
                attempt_count += 1;
            }

            let result = self.capabilities.dispatch(kind, state).await;
            self.record_capability(&incident_id, kind, &result);
            history.push(capability_response(kind, &result));

            if result.idle {
                info!("[*]  incident {}: idle, returning to observer", incident_id);
                return Ok(IncidentOutcome::Idle);
            }
            state = result.state;
        }

        let outcome = match state.resolution {
            Resolution::Resolved => IncidentOutcome::Resolved,
            Resolution::Observed => IncidentOutcome::Observed,
            Resolution::Dismissed => IncidentOutcome::Dismissed,
            Resolution::Pending => IncidentOutcome::Dismissed,
        };
        info!("[+]  incident {}: {:?}", incident_id, outcome);
        self.record(
            &incident_id,
            AuditResult::Success,
            "orchestrator",
            &format!("terminal state: {:?}", outcome),
        );
        Ok(outcome)
    }

    /// `requestApproval` and `escalate`: argument-consuming, human-facing,
    /// possibly loop-terminating - handled here rather than in the
    /// capability library.
    async fn dispatch_inline(
        &self,
        incident_id: &str,
        kind: CapabilityKind,
        call: &ToolCall,
        state: IncidentResolutionState,
        history: &mut Vec<ChatMessage>,
    ) -> Result<IncidentResolutionState> {
        match kind {
            CapabilityKind::RequestApproval => {
                let plan = match (&state.plan, state.plan_validated) {
                    (Some(plan), true) => plan.clone(),
                    _ => {
                        history.push(ChatMessage::tool_response(
                            kind.name(),
                            "precondition: the plan has not been validated",
                        ));
                        return Ok(state);
                    }
                };

                match self.console.approve_plan(&plan).await? {
                    ApprovalOutcome::Approved => {
                        self.record(incident_id, AuditResult::Success, kind.name(), "approved");
                        history.push(ChatMessage::tool_response(
                            kind.name(),
                            "The operator approved the plan. Proceed to executePlan.",
                        ));
                        Ok(state)
                    }
                    ApprovalOutcome::Rejected(feedback) => {
                        self.record(
                            incident_id,
                            AuditResult::Blocked,
                            kind.name(),
                            &format!("rejected: {}", feedback),
                        );
                        history.push(ChatMessage::tool_response(
                            kind.name(),
                            format!(
                                "The operator rejected the plan: {}. Re-plan with this feedback.",
                                feedback
                            ),
                        ));
                        let context = FailureContext::new(FailureKind::UserRejected)
                            .with_reason(feedback);
                        Ok(state.with_approval_rejected(context))
                    }
                }
            }
            CapabilityKind::Escalate => {
                let reason = call
                    .function
                    .arguments
                    .get("reason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("the agent is stuck")
                    .to_string();
                let needed = call
                    .function
                    .arguments
                    .get("needed_context")
                    .and_then(|n| n.as_str())
                    .unwrap_or("any guidance")
                    .to_string();

                let mut state = state;
                match self
                    .run_escalation(incident_id, &mut state, &reason, &needed)
                    .await?
                {
                    EscalationOutcome::Dismissed => {
                        history.push(ChatMessage::tool_response(
                            kind.name(),
                            "The operator dismissed the incident.",
                        ));
                    }
                    EscalationOutcome::Context(context) => {
                        history.push(ChatMessage::tool_response(
                            kind.name(),
                            format!("The operator provided context: {}", context),
                        ));
                    }
                }
                Ok(state)
            }
            _ => unreachable!("dispatch_inline called for {}", kind.name()),
        }
    }

    /// Shared escalation flow for the capability and the circuit breaker.
    /// Context from the operator is persisted as a fact, clears the
    /// failure context, and re-opens feasibility when it was negative.
    async fn run_escalation(
        &self,
        incident_id: &str,
        state: &mut IncidentResolutionState,
        reason: &str,
        needed_context: &str,
    ) -> Result<EscalationOutcome> {
        let outcome = self.console.escalate(reason, needed_context).await?;
        match &outcome {
            EscalationOutcome::Dismissed => {
                self.record(incident_id, AuditResult::Blocked, "escalate", "dismissed");
                *state = state.clone().with_resolution(Resolution::Dismissed);
            }
            EscalationOutcome::Context(context) => {
                self.record(
                    incident_id,
                    AuditResult::Success,
                    "escalate",
                    &format!("context provided: {}", context),
                );
                self.knowledge.append(needed_context, context)?;

                let mut next = state.clone().without_failure_context();
                let infeasible = next
                    .feasibility
                    .as_ref()
                    .map(|f| !f.feasible)
                    .unwrap_or(false);
                if infeasible {
                    // The new fact may change the verdict; re-assess.
                    next = next.without_feasibility();
                }
                *state = next;
            }
        }
        Ok(outcome)
    }

    fn record_capability(&self, incident_id: &str, kind: CapabilityKind, result: &CapabilityResult) {
        let audit_result = if result.idle {
            AuditResult::Idle
        } else if result.success {
            AuditResult::Success
        } else {
            AuditResult::Failure
        };
        self.record(incident_id, audit_result, kind.name(), &result.summary());
    }

    fn record(&self, incident_id: &str, result: AuditResult, action: &str, summary: &str) {
        let entry = AuditEntry::new(result)
            .with_incident(incident_id)
            .with_action(action)
            .with_summary(summary);
        if let Err(e) = self.audit.record(&entry) {
            warn!("[!]  audit write failed: {}", e);
        }
    }
}

/// The synthetic function response describing a capability's outcome.
fn capability_response(kind: CapabilityKind, result: &CapabilityResult) -> ChatMessage {
    let body: Value = serde_json::json!({
        "success": result.success,
        "summary": result.summary(),
    });
    ChatMessage::tool_response(kind.name(), body.to_string())
}
