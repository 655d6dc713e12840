//! `assessFeasibility` - can this incident be remediated safely?

use std::sync::{LazyLock, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use nightwatch_common::knowledge::KnowledgeStore;
use nightwatch_common::plan::FeasibilityAssessment;
use nightwatch_common::state::IncidentResolutionState;

use super::analyze::{runtime_tool_decls, RuntimeTools};
use super::{Capabilities, CapabilityResult};
use crate::console::OperatorConsole;
use crate::prompts::FEASIBILITY_SYSTEM;
use crate::reasoner::{ToolDecl, ToolHandler};

static FEASIBILITY_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    serde_json::json!({
        "type": "object",
        "properties": {
            "feasible": {"type": "boolean"},
            "summary": {"type": "string"},
            "blockingReason": {"type": ["string", "null"]}
        },
        "required": ["feasible", "summary"]
    })
});

/// Container probes plus the one-question-at-a-time operator channel.
/// Answers are persisted as facts immediately; a skip is remembered so the
/// capability can force the assessment to infeasible.
struct FeasibilityTools<'a> {
    runtime_tools: RuntimeTools<'a>,
    console: &'a dyn OperatorConsole,
    knowledge: &'a KnowledgeStore,
    skipped_question: Mutex<Option<String>>,
}

impl FeasibilityTools<'_> {
    fn skipped(&self) -> Option<String> {
        self.skipped_question.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolHandler for FeasibilityTools<'_> {
    async fn handle(&self, name: &str, arguments: &Value) -> Result<String> {
        if name != "ask_user" {
            return self.runtime_tools.handle(name, arguments).await;
        }

        let question = arguments
            .get("question")
            .and_then(|q| q.as_str())
            .unwrap_or_default()
            .to_string();

        match self.console.ask_question(&question).await? {
            Some(answer) => {
                self.knowledge.append(&question, &answer)?;
                Ok(answer)
            }
            None => {
                *self.skipped_question.lock().unwrap() = Some(question);
                Ok("The operator declined to answer.".to_string())
            }
        }
    }
}

fn feasibility_tool_decls() -> Vec<ToolDecl> {
    let mut tools = runtime_tool_decls();
    tools.push(ToolDecl::new(
        "ask_user",
        "Ask the operator one question whose answer would change the \
         assessment. One question per call.",
        serde_json::json!({
            "type": "object",
            "properties": {"question": {"type": "string"}},
            "required": ["question"]
        }),
    ));
    tools
}

impl Capabilities {
    pub(crate) async fn assess_feasibility(
        &self,
        state: IncidentResolutionState,
    ) -> CapabilityResult {
        let Some(graph) = state.incident_graph.as_ref() else {
            return CapabilityResult::fail(state, "precondition: no incident graph to assess");
        };
        if graph.root.is_none() {
            return CapabilityResult::fail(
                state,
                "precondition: incident graph has no root cause",
            );
        }

        let facts = self.knowledge.facts_as_string();
        let opening = format!(
            "Incident graph:\n{}\n\nRecorded facts:\n{}",
            serde_json::to_string_pretty(graph).unwrap_or_default(),
            if facts.is_empty() { "(none)" } else { facts.as_str() }
        );

        let tools = feasibility_tool_decls();
        let handler = FeasibilityTools {
            runtime_tools: RuntimeTools {
                runtime: self.runtime.as_ref(),
            },
            console: self.console.as_ref(),
            knowledge: &self.knowledge,
            skipped_question: Mutex::new(None),
        };

        let mut history = Vec::new();
        let value = match self
            .gateway
            .structured_call(
                FEASIBILITY_SYSTEM,
                &opening,
                &tools,
                &handler,
                &FEASIBILITY_SCHEMA,
                &mut history,
            )
            .await
        {
            Ok(value) => value,
            Err(e) => {
                return CapabilityResult::fail(state, format!("feasibility call failed: {}", e))
            }
        };

        let assessment: FeasibilityAssessment = match serde_json::from_value(value) {
            Ok(assessment) => assessment,
            Err(e) => {
                return CapabilityResult::fail(
                    state,
                    format!("unusable feasibility assessment: {}", e),
                )
            }
        };
        let mut assessment = assessment.normalized();

        // An unanswered question can never support a feasible verdict.
        if assessment.feasible {
            if let Some(question) = handler.skipped() {
                assessment = FeasibilityAssessment::blocked(
                    assessment.summary,
                    format!("operator declined to answer: {}", question),
                );
            }
        }

        let summary = if assessment.feasible {
            format!("feasible: {}", assessment.summary)
        } else {
            format!(
                "not feasible: {}",
                assessment.blocking_reason.as_deref().unwrap_or("unknown")
            )
        };
        CapabilityResult::ok(state.with_feasibility(assessment), summary)
    }
}
