// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

//! Per-agent spell reconciliation.
//!
//! Ensures a running agent's loaded spells match the desired named
//! spells, reloading only when the store's content hash differs from the
//! instance's recorded baseline. Runs once per surviving agent per cycle;
//! newly created agents load everything unconditionally as part of
//! creation instead.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::application::instance::AgentInstance;
use crate::domain::agent::AgentRecord;
use crate::domain::events::FleetEvent;
use crate::domain::repository::{SpellQuery, SpellRecordStore};
use crate::domain::spell::SpellRecord;
use crate::infrastructure::event_bus::EventBus;

pub struct SpellSynchronizer {
    spells: Arc<dyn SpellRecordStore>,
    scope: Option<String>,
    events: EventBus,
}

impl SpellSynchronizer {
    pub fn new(spells: Arc<dyn SpellRecordStore>, scope: Option<String>, events: EventBus) -> Self {
        Self { spells, scope, events }
    }

    /// Reconcile one agent's loaded spells against the store. Returns the
    /// number of reloads performed.
    ///
    /// Every failure here is per-spell: it is logged, the affected
    /// baseline hash stays unchanged so the reload is retried next cycle,
    /// and sibling spells are still evaluated.
    pub async fn synchronize(&self, record: &AgentRecord, instance: &mut AgentInstance) -> usize {
        let mut reloaded = 0;

        if let Some(root) = record.data.root_spell.clone() {
            reloaded += self.sync_root(&root, instance).await;
        }
        if !record.spells.is_empty() {
            reloaded += self.sync_named(record, instance).await;
        }

        reloaded
    }

    async fn sync_root(&self, name: &str, instance: &mut AgentInstance) -> usize {
        let Some(spell) = self.fetch_one(name).await else {
            return 0;
        };

        if instance.root_spell_hash.as_deref() == Some(spell.hash.as_str()) {
            return 0;
        }

        info!("reloading root spell '{}' for agent {}", name, instance.id);
        match instance.load_root_spell(&spell).await {
            Ok(()) => {
                self.publish_reload(instance, &spell);
                1
            }
            Err(e) => {
                warn!("agent {}: root spell '{}' reload failed: {}", instance.id, name, e);
                0
            }
        }
    }

    async fn sync_named(&self, record: &AgentRecord, instance: &mut AgentInstance) -> usize {
        let query = SpellQuery::by_names(self.scope.as_deref(), &record.spells);
        let fetched = match self.spells.find(query).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("agent {}: spell fetch failed: {}", instance.id, e);
                return 0;
            }
        };
        let by_name: HashMap<&str, &SpellRecord> =
            fetched.iter().map(|s| (s.name.as_str(), s)).collect();

        let mut reloaded = 0;
        for name in &record.spells {
            let Some(spell) = by_name.get(name.as_str()) else {
                warn!("agent {}: spell '{}' not found in store", instance.id, name);
                continue;
            };
            if instance.spell_hashes.get(name) == Some(&spell.hash) {
                continue;
            }

            info!("reloading spell '{}' for agent {}", name, instance.id);
            match instance.load_named_spell(spell).await {
                Ok(()) => {
                    self.publish_reload(instance, spell);
                    reloaded += 1;
                }
                Err(e) => {
                    warn!("agent {}: spell '{}' reload failed: {}", instance.id, name, e);
                }
            }
        }
        reloaded
    }

    async fn fetch_one(&self, name: &str) -> Option<SpellRecord> {
        match self.spells.find(SpellQuery::by_name(self.scope.as_deref(), name)).await {
            Ok(mut fetched) if !fetched.is_empty() => Some(fetched.remove(0)),
            Ok(_) => {
                warn!("spell '{}' not found in store", name);
                None
            }
            Err(e) => {
                warn!("failed to fetch spell '{}': {}", name, e);
                None
            }
        }
    }

    fn publish_reload(&self, instance: &AgentInstance, spell: &SpellRecord) {
        self.events.publish(FleetEvent::SpellReloaded {
            agent_id: instance.id.clone(),
            spell: spell.name.clone(),
            hash: spell.hash.clone(),
            reloaded_at: Utc::now(),
        });
    }
}
