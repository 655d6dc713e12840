//! Deterministic runtime double for tests.
//!
//! Pre-load container summaries and inspect documents; push log events into
//! followed streams by hand.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ContainerDetails, ContainerRuntime, ContainerSummary, LogEvent};

#[derive(Default)]
pub struct FakeRuntime {
    available: bool,
    containers: Vec<ContainerSummary>,
    details: HashMap<String, ContainerDetails>,
    log_senders: Mutex<HashMap<String, mpsc::Sender<LogEvent>>>,
    inspect_calls: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            available: true,
            ..Default::default()
        }
    }

    pub fn with_container(mut self, summary: ContainerSummary) -> Self {
        self.containers.push(summary);
        self
    }

    pub fn with_details(mut self, details: ContainerDetails) -> Self {
        self.details.insert(details.name.clone(), details);
        self
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Default::default()
        }
    }

    /// Containers that were inspected, in call order.
    pub fn inspected(&self) -> Vec<String> {
        self.inspect_calls.lock().unwrap().clone()
    }

    /// Feed an event into a stream previously opened with `follow_logs`.
    pub async fn push_log(&self, event: LogEvent) -> Result<()> {
        let sender = {
            let senders = self.log_senders.lock().unwrap();
            senders
                .get(&event.container)
                .cloned()
                .ok_or_else(|| anyhow!("no follower for container {}", event.container))?
        };
        sender
            .send(event)
            .await
            .map_err(|_| anyhow!("follower dropped"))
    }

    /// A simple summary for tests that only care about name and state.
    pub fn summary(name: &str, state: &str) -> ContainerSummary {
        ContainerSummary {
            id: format!("{name}-id"),
            name: name.to_string(),
            image: format!("example/{name}:latest"),
            state: state.to_string(),
            status: state.to_string(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> bool {
        self.available
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        Ok(self.containers.clone())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails> {
        self.inspect_calls.lock().unwrap().push(name.to_string());
        self.details
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("no such container: {}", name))
    }

    async fn follow_logs(&self, name: &str) -> Result<mpsc::Receiver<LogEvent>> {
        let (tx, rx) = mpsc::channel(64);
        self.log_senders
            .lock()
            .unwrap()
            .insert(name.to_string(), tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::LogStreamKind;
    use chrono::Utc;

    #[tokio::test]
    async fn test_fake_inspect_and_call_tracking() {
        let runtime = FakeRuntime::new().with_details(ContainerDetails {
            name: "cache".to_string(),
            running: true,
            ..Default::default()
        });

        let details = runtime.inspect_container("cache").await.unwrap();
        assert!(details.running);
        assert!(runtime.inspect_container("ghost").await.is_err());
        assert_eq!(runtime.inspected(), vec!["cache", "ghost"]);
    }

    #[tokio::test]
    async fn test_fake_log_push() {
        let runtime = FakeRuntime::new();
        let mut rx = runtime.follow_logs("cache").await.unwrap();

        runtime
            .push_log(LogEvent {
                container: "cache".to_string(),
                message: "OOMKilled".to_string(),
                stream: LogStreamKind::Stderr,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.message, "OOMKilled");
    }
}
