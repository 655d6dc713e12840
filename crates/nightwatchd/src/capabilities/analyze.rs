//! `analyzeIncident` - log batch in, incident graph (or idle) out.

use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use nightwatch_common::incident::{IncidentEdge, IncidentGraph, IncidentNode};
use nightwatch_common::state::IncidentResolutionState;

use super::{str_field, Capabilities, CapabilityResult};
use crate::prompts::ANALYZER_SYSTEM;
use crate::reasoner::{ToolDecl, ToolHandler};
use crate::runtime::ContainerRuntime;

static GRAPH_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    serde_json::json!({
        "type": "object",
        "properties": {
            "nodes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "container": {"type": "string"},
                        "type": {"type": "string"},
                        "evidence": {"type": "array", "items": {"type": "string"}},
                        "timestamp": {"type": "string"}
                    },
                    "required": ["container", "type", "evidence"]
                }
            },
            "edges": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "from": {"type": "integer"},
                        "to": {"type": "integer"}
                    },
                    "required": ["from", "to"]
                }
            },
            "root": {"type": ["integer", "null"]},
            "summary": {"type": "string"}
        },
        "required": ["nodes", "edges", "summary"]
    })
});

/// Read-only container probes offered during analysis.
pub(crate) struct RuntimeTools<'a> {
    pub runtime: &'a dyn ContainerRuntime,
}

#[async_trait]
impl ToolHandler for RuntimeTools<'_> {
    async fn handle(&self, name: &str, arguments: &Value) -> Result<String> {
        match name {
            "list_containers" => {
                let containers = self.runtime.list_containers().await?;
                Ok(serde_json::to_string(&containers)?)
            }
            "inspect_container" => {
                let target = arguments
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default();
                let details = self.runtime.inspect_container(target).await?;
                Ok(serde_json::to_string(&details)?)
            }
            other => Err(anyhow::anyhow!("unknown tool: {}", other)),
        }
    }
}

pub(crate) fn runtime_tool_decls() -> Vec<ToolDecl> {
    vec![
        ToolDecl::new(
            "list_containers",
            "List all containers with id, name, image, state and status",
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        ToolDecl::new(
            "inspect_container",
            "Inspect one container: running state, OOM flag, restart count, \
             exit code, health, limits, restart policy, mounts, network",
            serde_json::json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }),
        ),
    ]
}

impl Capabilities {
    pub(crate) async fn analyze_incident(
        &self,
        state: IncidentResolutionState,
    ) -> CapabilityResult {
        if state.logs.is_empty() {
            return CapabilityResult::fail(state, "precondition: no logs to analyze");
        }
        if state.incident_graph.is_some() {
            return CapabilityResult::fail(state, "precondition: incident already analyzed");
        }

        let numbered: Vec<String> = state
            .logs
            .iter()
            .enumerate()
            .map(|(i, line)| format!("[{}] {}", i, line))
            .collect();
        let opening = format!(
            "Known containers: {}\n\nLog batch:\n{}",
            self.known_containers.join(", "),
            numbered.join("\n")
        );

        let tools = runtime_tool_decls();
        let handler = RuntimeTools {
            runtime: self.runtime.as_ref(),
        };

        let mut history = Vec::new();
        let value = match self
            .gateway
            .structured_call(
                ANALYZER_SYSTEM,
                &opening,
                &tools,
                &handler,
                &GRAPH_SCHEMA,
                &mut history,
            )
            .await
        {
            Ok(value) => value,
            Err(e) => return CapabilityResult::fail(state, format!("analysis failed: {}", e)),
        };

        let graph = match graph_from_value(&value) {
            Ok(graph) => graph,
            Err(e) => {
                return CapabilityResult::fail(state, format!("unusable incident graph: {}", e))
            }
        };

        if graph.is_empty() {
            return CapabilityResult::idle(state);
        }

        if let Err(e) = graph.validate() {
            return CapabilityResult::fail(state, format!("invalid incident graph: {}", e));
        }

        let summary = format!(
            "{} node(s), root {:?}: {}",
            graph.nodes.len(),
            graph.root,
            graph.summary
        );
        CapabilityResult::ok(state.with_incident_graph(graph), summary)
    }
}

/// Convert reasoner JSON into a graph, tolerating the usual model
/// sloppiness: missing timestamps, null root, stringly indices.
fn graph_from_value(value: &Value) -> Result<IncidentGraph> {
    if let Ok(graph) = serde_json::from_value::<IncidentGraph>(value.clone()) {
        return Ok(graph);
    }

    let nodes = value
        .get("nodes")
        .and_then(|n| n.as_array())
        .map(|nodes| {
            nodes
                .iter()
                .map(|n| IncidentNode {
                    container: str_field(n, "container"),
                    kind: str_field(n, "type"),
                    evidence: n
                        .get("evidence")
                        .and_then(|e| e.as_array())
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|i| i.as_str().map(|s| s.to_string()))
                                .collect()
                        })
                        .unwrap_or_default(),
                    timestamp: n
                        .get("timestamp")
                        .and_then(|t| t.as_str())
                        .and_then(|t| t.parse().ok())
                        .unwrap_or_else(Utc::now),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let edges = value
        .get("edges")
        .and_then(|e| e.as_array())
        .map(|edges| {
            edges
                .iter()
                .filter_map(|e| {
                    Some(IncidentEdge {
                        from: as_index(e.get("from")?)?,
                        to: as_index(e.get("to")?)?,
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let root = value.get("root").and_then(as_index);

    Ok(IncidentGraph {
        nodes,
        edges,
        root,
        summary: str_field(value, "summary"),
    })
}

fn as_index(value: &Value) -> Option<usize> {
    value
        .as_u64()
        .map(|n| n as usize)
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

// ============================================================================
// Tests
// ============================================================================
