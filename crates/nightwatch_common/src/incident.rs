//! Incident model - failure nodes and the causal graph between them.
//!
//! The analyzer produces one node per observed infrastructure failure and
//! directed edges from cause to effect. The graph must be acyclic and the
//! root, when present, is the upstream cause (no incoming edges).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single observed infrastructure failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentNode {
    /// Container the failure was observed in
    pub container: String,

    /// Dotted classification, `<category>.<service>.<failure>`
    /// (e.g. `container.cache.stopped`, `resource.api.oom`)
    #[serde(rename = "type")]
    pub kind: String,

    /// Log lines supporting the classification, in observed order
    pub evidence: Vec<String>,

    /// When the failure was observed
    pub timestamp: DateTime<Utc>,
}

/// Causal edge: `from` caused `to`. Both are indices into `nodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentEdge {
    pub from: usize,
    pub to: usize,
}

/// Directed acyclic graph of incident nodes with an optional root cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentGraph {
    pub nodes: Vec<IncidentNode>,

    #[serde(default)]
    pub edges: Vec<IncidentEdge>,

    /// Index of the upstream cause, if one was identified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<usize>,

    /// One-paragraph description of the incident
    #[serde(default)]
    pub summary: String,
}

/// Structural violations in an incident graph
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("edge {index} references node {node} but the graph has {count} nodes")]
    EdgeOutOfRange {
        index: usize,
        node: usize,
        count: usize,
    },

    #[error("edge {index} is a self-loop on node {node}")]
    SelfLoop { index: usize, node: usize },

    #[error("graph contains a cycle")]
    Cycle,

    #[error("root index {root} is out of range for {count} nodes")]
    RootOutOfRange { root: usize, count: usize },

    #[error("root node {root} has an incoming edge")]
    RootHasIncomingEdge { root: usize },

    #[error("graph has no nodes but declares edges or a root")]
    EmptyGraphWithReferences,
}

impl IncidentGraph {
    /// Graph with no nodes - the analyzer's "nothing actionable" shape.
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            root: None,
            summary: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The root node, when a valid root index is present.
    pub fn root_node(&self) -> Option<&IncidentNode> {
        self.root.and_then(|i| self.nodes.get(i))
    }

    /// Check every structural invariant:
    /// - edge endpoints in `[0, nodes.len())`, no self-loops
    /// - the edge relation is acyclic
    /// - `root`, if set, is in range and has no incoming edges
    /// - an empty node list carries no edges and no root
    pub fn validate(&self) -> Result<(), GraphError> {
        let count = self.nodes.len();

        if count == 0 {
            if !self.edges.is_empty() || self.root.is_some() {
                return Err(GraphError::EmptyGraphWithReferences);
            }
            return Ok(());
        }

        for (index, edge) in self.edges.iter().enumerate() {
            for node in [edge.from, edge.to] {
                if node >= count {
                    return Err(GraphError::EdgeOutOfRange { index, node, count });
                }
            }
            if edge.from == edge.to {
                return Err(GraphError::SelfLoop {
                    index,
                    node: edge.from,
                });
            }
        }

        if let Some(root) = self.root {
            if root >= count {
                return Err(GraphError::RootOutOfRange { root, count });
            }
            if self.edges.iter().any(|e| e.to == root) {
                return Err(GraphError::RootHasIncomingEdge { root });
            }
        }

        self.check_acyclic()
    }

    /// Kahn's algorithm: if a topological order does not consume every node
    /// that participates in an edge, the remainder forms a cycle.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let count = self.nodes.len();
        let mut indegree = vec![0usize; count];
        for edge in &self.edges {
            indegree[edge.to] += 1;
        }

        let mut queue: Vec<usize> = (0..count).filter(|&n| indegree[n] == 0).collect();
        let mut visited = 0usize;

        while let Some(node) = queue.pop() {
            visited += 1;
            for edge in self.edges.iter().filter(|e| e.from == node) {
                indegree[edge.to] -= 1;
                if indegree[edge.to] == 0 {
                    queue.push(edge.to);
                }
            }
        }

        if visited == count {
            Ok(())
        } else {
            Err(GraphError::Cycle)
        }
    }

    /// Unique containers referenced by the graph, in node order.
    pub fn containers(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for node in &self.nodes {
            if !out.contains(&node.container) {
                out.push(node.container.clone());
            }
        }
        out
    }
}

// ============================================================================
// Tests
// ============================================================================
