// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod dependency;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod job;
pub mod logging;
pub mod persistence;
pub mod platform;
pub mod status;
pub mod types;
pub mod wrapper;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::ExperimentConfig;
use crate::config::loader::load_and_validate;
use crate::dag::{WorkflowGraph, build_graph};
use crate::engine::{Orchestrator, Runtime, RuntimeEvent, RuntimeOptions, spawn_cycle_ticker};
use crate::exec::SimulatedBackend;
use crate::job::EdgeInfo;
use crate::persistence::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, load_or_build};
use crate::platform::DisconnectedPlatform;
use crate::wrapper::WrapperOrderer;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - graph build (fresh or restored from a snapshot)
/// - orchestrator / runtime
/// - simulated submission backend
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    info!(expid = %cfg.expid(), sections = cfg.jobs.len(), "loaded experiment");

    match args.command {
        Command::Graph => {
            let (graph, _) = build_graph(&cfg)?;
            print_graph(&cfg, &graph);
            Ok(())
        }
        Command::Order => {
            let (graph, _) = build_graph(&cfg)?;
            print_order(&cfg, &graph);
            Ok(())
        }
        Command::Simulate {
            fail,
            state,
            step_ms,
        } => simulate(cfg, fail, state, Duration::from_millis(step_ms)).await,
    }
}

async fn simulate(
    cfg: ExperimentConfig,
    fail: Vec<String>,
    state: Option<PathBuf>,
    step_delay: Duration,
) -> Result<()> {
    let store: Box<dyn SnapshotStore> = match state {
        Some(path) => Box::new(FileSnapshotStore::new(path)),
        None => Box::new(MemorySnapshotStore::new()),
    };
    let (graph, outcome) = load_or_build(store.as_ref(), &cfg)?;
    info!(
        jobs = graph.len(),
        created = outcome.created,
        reused = outcome.reused,
        rewired = outcome.rewired.len(),
        "workflow graph ready"
    );

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(256);

    let fail: BTreeSet<String> = fail.into_iter().collect();
    let backend = SimulatedBackend::new(rt_tx.clone(), fail, step_delay);

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let options = RuntimeOptions {
        exit_when_idle: true,
        cycle_interval: Duration::from_secs(cfg.config.cycle_interval_secs.max(1)),
    };
    let ticker = spawn_cycle_ticker(rt_tx.clone(), options.cycle_interval);

    let core = Orchestrator::new(cfg, graph, Arc::new(DisconnectedPlatform), options);
    let runtime = Runtime::new(core, rt_rx, backend, store);
    let summary = runtime.run().await?;
    ticker.abort();

    println!("completed ({}):", summary.completed.len());
    for name in summary.completed.iter() {
        println!("  {name}");
    }
    if !summary.failed.is_empty() {
        println!("failed ({}):", summary.failed.len());
        for name in summary.failed.iter() {
            println!("  {name}");
        }
    }
    if !summary.skipped.is_empty() {
        println!("skipped ({}):", summary.skipped.len());
        for name in summary.skipped.iter() {
            println!("  {name}");
        }
    }
    if !summary.pending.is_empty() {
        println!("not finished ({}):", summary.pending.len());
        for name in summary.pending.iter() {
            println!("  {name}");
        }
    }
    Ok(())
}

/// Print jobs and reduced edges (dry run).
fn print_graph(cfg: &ExperimentConfig, graph: &WorkflowGraph) {
    println!("expflow graph for {}", cfg.expid());
    println!("jobs ({}):", graph.len());
    for job in graph.jobs() {
        println!("  - {} [{}]", job.name, job.running);
    }
    println!();

    let edges = graph.edges();
    println!("edges ({}):", edges.len());
    for (parent, child, info) in edges.iter() {
        println!("  {parent} -> {child}{}", edge_suffix(info));
    }

    debug!("graph dump complete (no execution)");
}

fn edge_suffix(info: &EdgeInfo) -> String {
    let mut parts = Vec::new();
    if info.is_special() {
        parts.push(format!("status={}", info.status));
        if info.from_step > 0 {
            parts.push(format!("from_step={}", info.from_step));
        }
    }
    if info.optional {
        parts.push("optional".to_string());
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" [{}]", parts.join(" "))
    }
}

fn print_order(cfg: &ExperimentConfig, graph: &WorkflowGraph) {
    let orders = WrapperOrderer::new(cfg).order_all(graph);
    if orders.is_empty() {
        println!("no wrappers configured");
        return;
    }
    for (wrapper, groups) in orders.iter() {
        println!("wrapper {wrapper}:");
        for group in groups.iter() {
            let date = group.date.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
            let member = group.member.as_deref().unwrap_or("-");
            println!("  {date} {member}:");
            for run in group.runs.iter() {
                println!("    {}: {}", run.running, run.jobs.join(", "));
            }
        }
    }
}
