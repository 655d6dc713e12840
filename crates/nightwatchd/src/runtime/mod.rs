//! Container runtime interface.
//!
//! The core only needs four operations: list, inspect, follow logs and a
//! liveness probe. Production uses the `docker` CLI driver; tests use
//! [`fake::FakeRuntime`].

mod docker;
pub mod fake;

pub use docker::DockerRuntime;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One line of container output, already demultiplexed and trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub container: String,
    pub message: String,
    pub stream: LogStreamKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStreamKind {
    Stdout,
    Stderr,
}

/// `docker ps`-level view of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
}

/// `docker inspect`-level view: runtime state, limits and wiring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDetails {
    pub name: String,
    pub running: bool,
    pub oom_killed: bool,
    pub restart_count: i64,
    pub exit_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    /// Bytes; 0 means unlimited
    pub memory_limit: i64,
    pub cpu_quota: i64,
    pub restart_policy: String,
    /// Variable names only, never values
    pub env_keys: Vec<String>,
    pub mounts: Vec<String>,
    pub network_mode: String,
    pub ports: Vec<String>,
}

/// The operations Nightwatch requires from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether the runtime answers at all.
    async fn ping(&self) -> bool;

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails>;

    /// Follow a container's output from "now". Events arrive in the order
    /// the runtime emitted them; the stream ends when the receiver is
    /// dropped or the container goes away.
    async fn follow_logs(&self, name: &str) -> Result<mpsc::Receiver<LogEvent>>;
}
