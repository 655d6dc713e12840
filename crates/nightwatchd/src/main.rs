//! Nightwatch daemon - watches container logs, resolves incidents.
//!
//! Startup: load config and topology (both are hard requirements), open
//! the knowledge store and audit log, probe the container runtime, then
//! follow every known container's logs. Batches flow to the orchestrator
//! one at a time; Ctrl-C stops the observer without flushing and lets the
//! in-flight batch finish.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nightwatch_common::audit::AuditLog;
use nightwatch_common::config::MonitorConfig;
use nightwatch_common::knowledge::KnowledgeStore;
use nightwatch_common::topology::Topology;

use nightwatchd::capabilities::Capabilities;
use nightwatchd::console::TerminalConsole;
use nightwatchd::executor::SystemRunner;
use nightwatchd::observer;
use nightwatchd::orchestrator::Orchestrator;
use nightwatchd::reasoner::{OllamaReasoner, ReasonerGateway};
use nightwatchd::runtime::{ContainerRuntime, DockerRuntime};

#[derive(Debug, Parser)]
#[command(name = "nightwatchd", version, about = "Autonomous incident resolution for container workloads")]
struct Args {
    /// Monitor configuration (JSON)
    #[arg(long, default_value = "nightwatch.config.json")]
    config: PathBuf,

    /// Compose-style topology defining the known containers
    #[arg(long, default_value = "docker-compose.yml")]
    topology: PathBuf,

    /// Knowledge store (markdown, append-only)
    #[arg(long, default_value = "nightwatch.knowledge.md")]
    knowledge: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "nightwatchd=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("[*]  Nightwatch v{}", env!("CARGO_PKG_VERSION"));

    // Hard startup requirements: config and topology.
    let config = MonitorConfig::load(&args.config).context("startup failed")?;
    let topology = Topology::load(&args.topology).context("startup failed")?;

    info!(
        "[>]  mode: {}, replan budget: {}, watching {} container(s)",
        config.mode.as_str(),
        config.constraints.max_actions_per_incident,
        topology.containers().len()
    );

    let knowledge = KnowledgeStore::new(&args.knowledge);
    let audit = AuditLog::new(AuditLog::discover_path());

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::new());
    if !runtime.ping().await {
        anyhow::bail!("container runtime is not reachable (is docker running?)");
    }

    let reasoner = Arc::new(OllamaReasoner::new(&config.reasoner.base_url));
    if !reasoner.is_available().await {
        warn!(
            "[!]  reasoner endpoint {} is not responding; calls will be retried",
            config.reasoner.base_url
        );
    }
    let gateway = ReasonerGateway::new(
        reasoner,
        &config.reasoner.model,
        config.reasoner.think,
    );

    let console = Arc::new(TerminalConsole::new());
    let capabilities = Capabilities::new(
        gateway.clone(),
        Arc::clone(&runtime),
        Arc::new(SystemRunner::new()),
        console.clone(),
        knowledge.clone(),
        topology.containers().to_vec(),
    );
    let orchestrator = Orchestrator::new(
        gateway,
        capabilities,
        console,
        knowledge,
        audit,
        config.mode,
        config.constraints.max_actions_per_incident,
    );

    // Observer wiring: one pump per container into the batching
    // coordinator, batches consumed below one at a time.
    let mut channels = observer::spawn_coordinator(Duration::from_millis(config.observer.window_ms));
    for container in topology.containers() {
        tokio::spawn(observer::pump_container(
            Arc::clone(&runtime),
            container.clone(),
            channels.event_tx.clone(),
        ));
    }

    info!("[+]  observing; waiting for incident-worthy logs");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("[*]  shutdown requested");
                // Cancels any pending debounce window; no flush on teardown.
                let _ = channels.shutdown_tx.send(true);
                break;
            }
            batch = channels.batch_rx.recv() => {
                let Some(batch) = batch else { break };
                match orchestrator.resolve_batch(&batch).await {
                    Ok(outcome) => info!("[+]  batch handled: {:?}", outcome),
                    Err(e) => warn!("[!]  batch abandoned: {:#}", e),
                }
                if channels.done_tx.send(()).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("[+]  Nightwatch stopped");
    Ok(())
}
