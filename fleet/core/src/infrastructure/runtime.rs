// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

//! Tracing-only runtime adapter.
//!
//! Stands in for the real agent runtime in the demo daemon: every
//! lifecycle call is logged and succeeds. The reconciler only cares
//! about the port contract, so this is enough to observe full cycles.

use async_trait::async_trait;
use tracing::info;

use crate::domain::agent::AgentId;
use crate::domain::runtime::{AgentHandle, AgentRuntime, RuntimeConfig, RuntimeError};
use crate::domain::spell::SpellRecord;

#[derive(Debug, Clone, Default)]
pub struct TracingAgentRuntime;

impl TracingAgentRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentRuntime for TracingAgentRuntime {
    async fn spawn(&self, config: RuntimeConfig) -> Result<Box<dyn AgentHandle>, RuntimeError> {
        info!(
            "spawning agent {} on port {} (project: {})",
            config.agent_id,
            config.port,
            config.project_id.as_deref().unwrap_or("-"),
        );
        Ok(Box::new(TracingAgentHandle {
            agent_id: config.agent_id,
            port: config.port,
        }))
    }
}

pub struct TracingAgentHandle {
    agent_id: AgentId,
    port: u16,
}

#[async_trait]
impl AgentHandle for TracingAgentHandle {
    async fn load_spell(&self, spell: &SpellRecord) -> Result<(), RuntimeError> {
        info!("agent {}: loading spell '{}' ({})", self.agent_id, spell.name, spell.hash);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), RuntimeError> {
        info!("agent {}: tearing down (port {})", self.agent_id, self.port);
        Ok(())
    }
}
