// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

//! In-memory store adapters.
//!
//! Used by the daemon's demo mode and by tests. The spell store computes
//! a sha256 content hash on insert, so replacing a spell's content
//! changes its `hash` exactly the way the production store does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::agent::{AgentId, AgentPatch, AgentRecord};
use crate::domain::repository::{
    AgentQuery, AgentRecordStore, SpellQuery, SpellRecordStore, StoreError,
};
use crate::domain::spell::SpellRecord;

#[derive(Clone, Default)]
pub struct InMemoryAgentStore {
    records: Arc<Mutex<Vec<AgentRecord>>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record with the same id.
    pub fn insert(&self, record: AgentRecord) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    pub fn remove(&self, id: &AgentId) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.retain(|r| r.id != *id);
    }

    pub fn get(&self, id: &AgentId) -> Option<AgentRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.iter().find(|r| r.id == *id).cloned()
    }

    pub fn mark_dirty(&self, id: &AgentId) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = records.iter_mut().find(|r| r.id == *id) {
            record.dirty = true;
        }
    }
}

#[async_trait]
impl AgentRecordStore for InMemoryAgentStore {
    async fn find(&self, query: AgentQuery) -> Result<Vec<AgentRecord>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .iter()
            .filter(|r| match &query.project_id {
                Some(project) => r.project_id.as_deref() == Some(project.as_str()),
                None => true,
            })
            .filter(|r| match &query.ids {
                Some(ids) => ids.contains(&r.id),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn patch(&self, id: &AgentId, patch: AgentPatch) -> Result<AgentRecord, StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = records
            .iter_mut()
            .find(|r| r.id == *id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(dirty) = patch.dirty {
            record.dirty = dirty;
        }
        Ok(record.clone())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySpellStore {
    spells: Arc<Mutex<HashMap<String, SpellRecord>>>,
}

impl InMemorySpellStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a spell, hashing its content. Returns the hash.
    pub fn put(&self, project_id: Option<&str>, name: &str, content: serde_json::Value) -> String {
        let hash = content_hash(&content);
        let content = match content {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("graph".to_owned(), other);
                map
            }
        };
        let record = SpellRecord {
            name: name.to_owned(),
            hash: hash.clone(),
            project_id: project_id.map(str::to_owned),
            content,
        };
        let mut spells = self.spells.lock().unwrap_or_else(|e| e.into_inner());
        spells.insert(name.to_owned(), record);
        hash
    }

    pub fn get(&self, name: &str) -> Option<SpellRecord> {
        let spells = self.spells.lock().unwrap_or_else(|e| e.into_inner());
        spells.get(name).cloned()
    }
}

#[async_trait]
impl SpellRecordStore for InMemorySpellStore {
    async fn find(&self, query: SpellQuery) -> Result<Vec<SpellRecord>, StoreError> {
        let spells = self.spells.lock().unwrap_or_else(|e| e.into_inner());
        Ok(spells
            .values()
            .filter(|s| match &query.project_id {
                Some(project) => s.project_id.as_deref() == Some(project.as_str()),
                None => true,
            })
            .filter(|s| match &query.names {
                Some(names) => names.contains(&s.name),
                None => true,
            })
            .cloned()
            .collect())
    }
}

fn content_hash(content: &serde_json::Value) -> String {
    let bytes = serde_json::to_vec(content).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
