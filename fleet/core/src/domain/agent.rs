// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an agent record and its running instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Desired state of one agent, owned by the record store.
///
/// Snapshots of these records are compared by deep equality for change
/// suppression, so every field participates in `PartialEq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub enabled: bool,
    /// Set by the editor when the record changed in a way that requires a
    /// full rebuild of the running instance.
    #[serde(default)]
    pub dirty: bool,
    #[serde(default)]
    pub data: AgentData,
    /// Named spells the agent keeps loaded, in addition to its root spell.
    #[serde(default)]
    pub spells: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Free-form agent configuration. Fields the reconciler does not interpret
/// are preserved in `extra` and handed to the runtime verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_spell: Option<String>,
    /// Instances flagged here are owned by an external integration and are
    /// never created by the reconciler.
    #[serde(default)]
    pub externally_managed: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Partial update applied back to the record store. Only fields the
/// reconciler writes are representable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
}

impl AgentPatch {
    pub fn clear_dirty() -> Self {
        Self { dirty: Some(false) }
    }
}
