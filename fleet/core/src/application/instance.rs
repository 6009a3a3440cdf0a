// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use tracing::debug;

use crate::domain::agent::AgentId;
use crate::domain::runtime::{AgentHandle, RuntimeError};
use crate::domain::spell::SpellRecord;

/// Actual runtime state of one agent: its live handle, the port reserved
/// for its listener, and the hashes of the spells last loaded into it.
///
/// Owned exclusively by the fleet reconciler. Lifecycle is
/// `Absent -> Running -> Absent`; any config change that needs more than a
/// spell hot-reload goes through destroy-then-recreate instead of
/// in-place mutation.
pub struct AgentInstance {
    pub id: AgentId,
    pub port: u16,
    /// Hash of the root spell as last loaded, `None` before first load.
    pub root_spell_hash: Option<String>,
    /// Last-loaded hash per named spell, keyed by name so the desired
    /// spell list can reorder without forcing reloads.
    pub spell_hashes: HashMap<String, String>,
    handle: Box<dyn AgentHandle>,
}

impl AgentInstance {
    pub fn new(id: AgentId, port: u16, handle: Box<dyn AgentHandle>) -> Self {
        Self {
            id,
            port,
            root_spell_hash: None,
            spell_hashes: HashMap::new(),
            handle,
        }
    }

    /// Load a spell into the running agent and record its hash as the new
    /// baseline. The hash is only advanced on a successful load, so a
    /// failed load is retried on the next reconciliation cycle.
    pub async fn load_root_spell(&mut self, spell: &SpellRecord) -> Result<(), RuntimeError> {
        self.handle.load_spell(spell).await?;
        debug!("agent {} loaded root spell '{}' ({})", self.id, spell.name, spell.hash);
        self.root_spell_hash = Some(spell.hash.clone());
        Ok(())
    }

    /// As [`load_root_spell`], for an entry of the named spell list.
    pub async fn load_named_spell(&mut self, spell: &SpellRecord) -> Result<(), RuntimeError> {
        self.handle.load_spell(spell).await?;
        debug!("agent {} loaded spell '{}' ({})", self.id, spell.name, spell.hash);
        self.spell_hashes.insert(spell.name.clone(), spell.hash.clone());
        Ok(())
    }

    /// Tear down the underlying runtime. The caller releases the port and
    /// drops the instance afterwards.
    pub async fn teardown(&self) -> Result<(), RuntimeError> {
        self.handle.destroy().await
    }
}
