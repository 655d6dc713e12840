//! Docker CLI driver.
//!
//! Shells out to the `docker` binary rather than the engine socket: the
//! agent already lives or dies by the CLI being present for remediation
//! commands, and the CLI's JSON output is stable enough to parse.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ContainerDetails, ContainerRuntime, ContainerSummary, LogEvent, LogStreamKind};

/// Channel depth per followed container before the reader applies
/// backpressure to the pipe.
const LOG_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Debug, Clone, Default)]
pub struct DockerRuntime;

impl DockerRuntime {
    pub fn new() -> Self {
        Self
    }

    async fn docker_output(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to run docker {}", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "docker {} failed: {}",
                args.join(" "),
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> bool {
        Command::new("docker")
            .args(["version", "--format", "{{.Server.Version}}"])
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let stdout = self
            .docker_output(&["ps", "--all", "--format", "{{json .}}"])
            .await?;

        let mut containers = Vec::new();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<PsLine>(line) {
                Ok(ps) => containers.push(ContainerSummary {
                    id: ps.id,
                    name: ps.names,
                    image: ps.image,
                    state: ps.state,
                    status: ps.status,
                }),
                Err(e) => warn!("[!]  Unparseable docker ps line: {} ({})", line, e),
            }
        }
        Ok(containers)
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails> {
        let stdout = self.docker_output(&["inspect", name]).await?;
        let parsed: Vec<Value> =
            serde_json::from_str(&stdout).context("docker inspect returned invalid JSON")?;
        let value = parsed
            .first()
            .ok_or_else(|| anyhow!("docker inspect returned no entries for {}", name))?;

        Ok(details_from_inspect(name, value))
    }

    async fn follow_logs(&self, name: &str) -> Result<mpsc::Receiver<LogEvent>> {
        let mut child = Command::new("docker")
            .args(["logs", "--follow", "--tail", "0", name])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to follow logs for {}", name))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("no stdout pipe for {}", name))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("no stderr pipe for {}", name))?;

        let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);

        spawn_line_reader(name.to_string(), LogStreamKind::Stdout, stdout, tx.clone());
        spawn_line_reader(name.to_string(), LogStreamKind::Stderr, stderr, tx);

        // Keep the child alive as long as someone reads; the readers hold
        // the pipes, kill_on_drop reaps it once both sides are gone.
        tokio::spawn(async move {
            let status = child.wait().await;
            debug!("[*]  log follower for exited: {:?}", status);
        });

        Ok(rx)
    }
}

fn spawn_line_reader(
    container: String,
    stream: LogStreamKind,
    pipe: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    tx: mpsc::Sender<LogEvent>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let message = line.trim().to_string();
            if message.is_empty() {
                continue;
            }
            let event = LogEvent {
                container: container.clone(),
                message,
                stream,
                timestamp: Utc::now(),
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });
}

/// Pull the fields the capabilities care about out of `docker inspect`'s
/// (large) document. Missing fields degrade to defaults rather than fail:
/// the reasoner treats the details as evidence, not as a contract.
fn details_from_inspect(name: &str, value: &Value) -> ContainerDetails {
    let state = value.get("State");
    let host_config = value.get("HostConfig");
    let config = value.get("Config");

    let str_at = |v: Option<&Value>, key: &str| -> String {
        v.and_then(|x| x.get(key))
            .and_then(|x| x.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let bool_at = |v: Option<&Value>, key: &str| -> bool {
        v.and_then(|x| x.get(key))
            .and_then(|x| x.as_bool())
            .unwrap_or(false)
    };
    let int_at = |v: Option<&Value>, key: &str| -> i64 {
        v.and_then(|x| x.get(key))
            .and_then(|x| x.as_i64())
            .unwrap_or(0)
    };

    let env_keys = config
        .and_then(|c| c.get("Env"))
        .and_then(|e| e.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.as_str())
                .filter_map(|e| e.split('=').next())
                .map(|k| k.to_string())
                .collect()
        })
        .unwrap_or_default();

    let mounts = value
        .get("Mounts")
        .and_then(|m| m.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|m| {
                    let source = m.get("Source")?.as_str()?;
                    let destination = m.get("Destination")?.as_str()?;
                    Some(format!("{}:{}", source, destination))
                })
                .collect()
        })
        .unwrap_or_default();

    let ports = value
        .get("NetworkSettings")
        .and_then(|n| n.get("Ports"))
        .and_then(|p| p.as_object())
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();

    let health = state
        .and_then(|s| s.get("Health"))
        .and_then(|h| h.get("Status"))
        .and_then(|s| s.as_str())
        .map(|s| s.to_string());

    ContainerDetails {
        name: name.to_string(),
        running: bool_at(state, "Running"),
        oom_killed: bool_at(state, "OOMKilled"),
        restart_count: int_at(Some(value), "RestartCount"),
        exit_code: int_at(state, "ExitCode"),
        health,
        memory_limit: int_at(host_config, "Memory"),
        cpu_quota: int_at(host_config, "CpuQuota"),
        restart_policy: host_config
            .and_then(|h| h.get("RestartPolicy"))
            .and_then(|r| r.get("Name"))
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string(),
        env_keys,
        mounts,
        network_mode: str_at(host_config, "NetworkMode"),
        ports,
    }
}
