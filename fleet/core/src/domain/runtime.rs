// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::{AgentData, AgentId, AgentRecord};
use crate::domain::spell::SpellRecord;

/// Everything the runtime collaborator needs to bring one agent up: the
/// record's configuration, the port reserved for its embedded listener,
/// and the logical project the agent belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub agent_id: AgentId,
    pub port: u16,
    pub project_id: Option<String>,
    pub data: AgentData,
    pub spells: Vec<String>,
}

impl RuntimeConfig {
    pub fn from_record(record: &AgentRecord, port: u16, project_id: Option<&str>) -> Self {
        Self {
            agent_id: record.id.clone(),
            port,
            project_id: project_id.map(str::to_owned),
            data: record.data.clone(),
            spells: record.spells.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn agent runtime: {0}")]
    SpawnFailed(String),
    #[error("failed to load spell '{name}': {reason}")]
    LoadFailed { name: String, reason: String },
    #[error("failed to tear down agent runtime: {0}")]
    TeardownFailed(String),
}

/// Factory port for the external agent runtime collaborator.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn spawn(&self, config: RuntimeConfig) -> Result<Box<dyn AgentHandle>, RuntimeError>;
}

/// Live handle to one spawned agent. The reconciler holds exactly one per
/// instance and is the only long-lived owner.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Load (or hot-reload) a spell into the running agent.
    async fn load_spell(&self, spell: &SpellRecord) -> Result<(), RuntimeError>;

    /// Tear the agent down. Called at most once, on destroy.
    async fn destroy(&self) -> Result<(), RuntimeError>;
}
