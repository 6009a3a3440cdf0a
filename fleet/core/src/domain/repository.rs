// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

//! Store ports the reconciler consumes. The backing transport, query
//! language and persistence engine are external concerns; these traits
//! model the stores as simple queryable/patchable collections.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::agent::{AgentId, AgentPatch, AgentRecord};
use crate::domain::spell::SpellRecord;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentQuery {
    /// Scope to a logical project (single-tenant mode).
    pub project_id: Option<String>,
    /// Restrict to an id set. `None` means no id filter.
    pub ids: Option<Vec<AgentId>>,
}

impl AgentQuery {
    pub fn scoped(project_id: Option<&str>) -> Self {
        Self {
            project_id: project_id.map(str::to_owned),
            ids: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpellQuery {
    pub project_id: Option<String>,
    /// Restrict to a name set. `None` means no name filter.
    pub names: Option<Vec<String>>,
}

impl SpellQuery {
    pub fn by_name(project_id: Option<&str>, name: &str) -> Self {
        Self {
            project_id: project_id.map(str::to_owned),
            names: Some(vec![name.to_owned()]),
        }
    }

    pub fn by_names(project_id: Option<&str>, names: &[String]) -> Self {
        Self {
            project_id: project_id.map(str::to_owned),
            names: Some(names.to_vec()),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store query failed: {0}")]
    QueryFailed(String),
    #[error("store patch failed: {0}")]
    PatchFailed(String),
}

#[async_trait]
pub trait AgentRecordStore: Send + Sync {
    async fn find(&self, query: AgentQuery) -> Result<Vec<AgentRecord>, StoreError>;

    /// Apply a partial update and return the updated record.
    async fn patch(&self, id: &AgentId, patch: AgentPatch) -> Result<AgentRecord, StoreError>;
}

#[async_trait]
pub trait SpellRecordStore: Send + Sync {
    async fn find(&self, query: SpellQuery) -> Result<Vec<SpellRecord>, StoreError>;
}
