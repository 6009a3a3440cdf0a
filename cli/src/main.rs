// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

//! # Arcanum Fleet Daemon
//!
//! The `arcanum` binary drives the fleet reconciler on a fixed timer:
//! every tick runs one reconciliation cycle against the agent and spell
//! stores. Cycles are serialized by construction; a slow cycle delays
//! the next tick instead of overlapping it.
//!
//! This build wires the in-memory store adapters and the tracing-only
//! runtime, optionally seeded from a JSON fixture, which is enough to
//! exercise the full control loop end to end.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use serde::Deserialize;
use tracing::{error, info, warn};

use arcanum_fleet::application::FleetReconciler;
use arcanum_fleet::config::{FleetConfig, PortRange, Tenancy, DEFAULT_PORT_RANGE};
use arcanum_fleet::domain::agent::AgentRecord;
use arcanum_fleet::infrastructure::{
    EventBus, InMemoryAgentStore, InMemorySpellStore, TracingAgentRuntime,
};

/// Arcanum fleet daemon - keep running agents consistent with their records
#[derive(Parser)]
#[command(name = "arcanum")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Inclusive listener port range, "start-end"
    #[arg(long, env = "ARCANUM_PORT_RANGE", default_value = DEFAULT_PORT_RANGE)]
    port_range: String,

    /// Seconds between reconciliation cycles
    #[arg(long, env = "ARCANUM_RECONCILE_INTERVAL", default_value = "5")]
    interval: u64,

    /// Logical project id for store queries
    #[arg(long, env = "ARCANUM_PROJECT_ID")]
    project: Option<String>,

    /// Scope every store query to --project (single-tenant mode)
    #[arg(long, env = "ARCANUM_SINGLE_USER_MODE")]
    single_user: bool,

    /// JSON fixture seeding the in-memory stores
    #[arg(long, value_name = "FILE")]
    seed: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ARCANUM_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Deserialize)]
struct SeedFile {
    #[serde(default)]
    agents: Vec<AgentRecord>,
    #[serde(default)]
    spells: Vec<SeedSpell>,
}

#[derive(Deserialize)]
struct SeedSpell {
    name: String,
    #[serde(default)]
    project_id: Option<String>,
    content: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let tenancy = match (cli.single_user, cli.project.as_deref()) {
        (true, Some(project)) => Tenancy::single(project),
        (true, None) => {
            warn!("--single-user without --project, falling back to multi-tenant queries");
            Tenancy::Multi
        }
        (false, _) => Tenancy::Multi,
    };
    let port_range = PortRange::parse_or_default(&cli.port_range);
    info!(
        "fleet configuration: ports {}-{} ({} available), {}",
        port_range.start,
        port_range.end,
        port_range.capacity(),
        match &tenancy {
            Tenancy::Multi => "multi-tenant".to_string(),
            Tenancy::Single { project_id } => format!("single-tenant ({})", project_id),
        },
    );

    let agents = InMemoryAgentStore::new();
    let spells = InMemorySpellStore::new();
    if let Some(path) = &cli.seed {
        seed_stores(path, &agents, &spells)?;
    }

    let mut reconciler = FleetReconciler::new(
        FleetConfig::new(port_range, tenancy),
        Arc::new(agents),
        Arc::new(spells),
        Arc::new(TracingAgentRuntime::new()),
        EventBus::with_default_capacity(),
    );

    eprintln!("{}", "Arcanum fleet daemon running. Ctrl-C to stop.".green());
    let mut ticker = tokio::time::interval(Duration::from_secs(cli.interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed fetch skips this cycle; the next tick retries.
                if let Err(e) = reconciler.reconcile().await {
                    error!("reconciliation cycle failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down ({} live instances)", reconciler.instance_count());
                break;
            }
        }
    }

    Ok(())
}

fn seed_stores(path: &Path, agents: &InMemoryAgentStore, spells: &InMemorySpellStore) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    let seed: SeedFile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse seed file {}", path.display()))?;

    info!("seeding {} agents, {} spells", seed.agents.len(), seed.spells.len());
    for record in seed.agents {
        agents.insert(record);
    }
    for spell in seed.spells {
        spells.put(spell.project_id.as_deref(), &spell.name, spell.content);
    }
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
