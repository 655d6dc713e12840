//! Shared foundation for the Nightwatch agent.
//!
//! Everything here is runtime-agnostic: the incident data model, the
//! resolution state machine's value types, the command safety validator,
//! topology parsing, the knowledge store, the audit log and configuration.
//! The daemon crate (`nightwatchd`) supplies the async machinery around it.

pub mod audit;
pub mod config;
pub mod execution;
pub mod incident;
pub mod knowledge;
pub mod plan;
pub mod state;
pub mod topology;
pub mod validator;

pub use audit::{sanitize_for_audit, AuditEntry, AuditLog, AuditResult};
pub use config::{Constraints, Mode, MonitorConfig, ObserverSettings, ReasonerSettings};
pub use execution::{
    ExecutionResult, FailureContext, FailureKind, StepResult, StepStatus, NO_FAILURE,
};
pub use incident::{GraphError, IncidentEdge, IncidentGraph, IncidentNode};
pub use knowledge::{Fact, KnowledgeStore, KNOWLEDGE_HEADER};
pub use plan::{FeasibilityAssessment, PlanStep, RemediationPlan};
pub use state::{IncidentResolutionState, PlannerTurn, Resolution, StateInvariantError};
pub use topology::Topology;
pub use validator::{
    validate_command, validate_plan, violation_kind, CommandRejection, PlanViolation,
};
