// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

//! Fleet reconciliation control loop.
//!
//! One `reconcile()` call is one cycle: fetch the desired agent records,
//! diff them against the previously retained snapshot, apply
//! create/destroy/rebuild transitions, hot-reload changed spells on the
//! survivors, and retain the fetched sequence for the next diff.
//!
//! The passes are deliberately split (deletion, addition, dirty rebuild,
//! spell sync) so each pass's failures stay independent: a port
//! exhaustion on one new agent never blocks deletions or rebuilds of
//! others in the same cycle. Every failure is contained at the smallest
//! unit and surfaces as a retry on a later cycle; only a failed top-level
//! fetch aborts a cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::instance::AgentInstance;
use crate::application::port_pool::{PortPool, PortPoolError};
use crate::application::spell_sync::SpellSynchronizer;
use crate::config::FleetConfig;
use crate::domain::agent::{AgentId, AgentPatch, AgentRecord};
use crate::domain::events::FleetEvent;
use crate::domain::repository::{AgentQuery, AgentRecordStore, SpellQuery, SpellRecordStore, StoreError};
use crate::domain::runtime::{AgentRuntime, RuntimeConfig, RuntimeError};
use crate::domain::spell::SpellRecord;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Ports(#[from] PortPoolError),
}

/// Outcome of one reconciliation cycle, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// The fetched sequence matched the retained snapshot; nothing ran.
    pub suppressed: bool,
    pub created: usize,
    pub destroyed: usize,
    pub rebuilt: usize,
    pub reloaded: usize,
    /// Per-item failures (creation, rebuild, acknowledge patch). The
    /// affected items are retried on a later cycle.
    pub failures: usize,
}

/// Top-level owner of the fleet's actual state: the live instance map,
/// the port pool, and the last-seen desired snapshot.
///
/// `reconcile` takes `&mut self`, so cycles are serialized by ownership:
/// a caller cannot start a new cycle while one is still applying changes,
/// and no other component can reach the instance map or the pool.
pub struct FleetReconciler {
    config: FleetConfig,
    agents: Arc<dyn AgentRecordStore>,
    spells: Arc<dyn SpellRecordStore>,
    runtime: Arc<dyn AgentRuntime>,
    events: EventBus,
    spell_sync: SpellSynchronizer,
    instances: HashMap<AgentId, AgentInstance>,
    ports: PortPool,
    snapshot: Vec<AgentRecord>,
}

impl FleetReconciler {
    pub fn new(
        config: FleetConfig,
        agents: Arc<dyn AgentRecordStore>,
        spells: Arc<dyn SpellRecordStore>,
        runtime: Arc<dyn AgentRuntime>,
        events: EventBus,
    ) -> Self {
        let ports = PortPool::new(config.port_range);
        let spell_sync = SpellSynchronizer::new(
            spells.clone(),
            config.scope().map(str::to_owned),
            events.clone(),
        );
        Self {
            config,
            agents,
            spells,
            runtime,
            events,
            spell_sync,
            instances: HashMap::new(),
            ports,
            snapshot: Vec::new(),
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instance_port(&self, id: &AgentId) -> Option<u16> {
        self.instances.get(id).map(|i| i.port)
    }

    pub fn ports_available(&self) -> usize {
        self.ports.available()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run one reconciliation cycle. Returns `Err` only when the desired
    /// records cannot be fetched at all; everything past that point is
    /// contained per item.
    pub async fn reconcile(&mut self) -> Result<CycleReport, FleetError> {
        let desired = self
            .agents
            .find(AgentQuery::scoped(self.config.scope()))
            .await?;

        let mut report = CycleReport::default();

        // Change suppression: an unchanged desired sequence costs one
        // fetch and a comparison, nothing else.
        if desired == self.snapshot {
            debug!("desired fleet unchanged ({} records), skipping cycle", desired.len());
            report.suppressed = true;
            return Ok(report);
        }

        let prev_ids: HashSet<AgentId> = self.snapshot.iter().map(|r| r.id.clone()).collect();
        let desired_ids: HashSet<AgentId> = desired.iter().map(|r| r.id.clone()).collect();

        // Removed-instance detection: a snapshot id without a live
        // instance means something outside a normal deletion tore it
        // down. Attempt teardown anyway and move on.
        for id in &prev_ids {
            if !self.instances.contains_key(id) && desired_ids.contains(id) {
                debug!("agent {} has no live instance, treating as already torn down", id);
                self.destroy_instance(id).await;
            }
        }

        // Deletion pass.
        for id in &prev_ids {
            if !desired_ids.contains(id) && self.destroy_instance(id).await {
                report.destroyed += 1;
            }
        }

        // Addition pass. Dirty records are left to the rebuild pass so
        // they are not processed twice.
        let mut failed: HashSet<AgentId> = HashSet::new();
        for record in &desired {
            if record.dirty || prev_ids.contains(&record.id) {
                continue;
            }
            if !record.enabled {
                debug!("agent {} is disabled, not creating", record.id);
                continue;
            }
            if record.data.externally_managed {
                debug!("agent {} is externally managed, not creating", record.id);
                continue;
            }
            match self.create_instance(record).await {
                Ok(()) => report.created += 1,
                Err(e) => {
                    warn!("failed to create agent {}: {}", record.id, e);
                    report.failures += 1;
                    failed.insert(record.id.clone());
                }
            }
        }

        // Dirty pass: unconditional full rebuild, then acknowledge by
        // clearing the flag in the store. The patch happens only after a
        // successful rebuild, so a crash in between repeats the rebuild
        // rather than losing it.
        let mut rebuilt: HashSet<AgentId> = HashSet::new();
        for record in &desired {
            if !record.dirty {
                continue;
            }
            self.destroy_instance(&record.id).await;
            match self.create_instance(record).await {
                Ok(()) => {
                    report.rebuilt += 1;
                    rebuilt.insert(record.id.clone());
                    self.events.publish(FleetEvent::AgentRebuilt {
                        id: record.id.clone(),
                        rebuilt_at: Utc::now(),
                    });
                    if let Err(e) = self.agents.patch(&record.id, AgentPatch::clear_dirty()).await {
                        warn!("failed to acknowledge rebuild of agent {}: {}", record.id, e);
                        report.failures += 1;
                    }
                }
                Err(e) => {
                    warn!("failed to rebuild agent {}: {}", record.id, e);
                    report.failures += 1;
                    failed.insert(record.id.clone());
                }
            }
        }

        // Spell sync pass: survivors only. Instances created or rebuilt
        // this cycle already loaded everything.
        for record in &desired {
            if record.dirty || failed.contains(&record.id) || !prev_ids.contains(&record.id) {
                continue;
            }
            if let Some(instance) = self.instances.get_mut(&record.id) {
                report.reloaded += self.spell_sync.synchronize(record, instance).await;
            }
        }

        // Retain the snapshot for the next diff. Failed creations are
        // dropped so change suppression cannot starve their retry, and
        // rebuilt records are kept with the flag already cleared so a
        // clean rebuild is fully suppressed next cycle.
        self.snapshot = desired
            .into_iter()
            .filter(|r| !failed.contains(&r.id))
            .map(|mut r| {
                if rebuilt.contains(&r.id) {
                    r.dirty = false;
                }
                r
            })
            .collect();

        info!(
            "reconciled fleet: {} created, {} destroyed, {} rebuilt, {} spells reloaded, {} failures, {} live",
            report.created, report.destroyed, report.rebuilt, report.reloaded, report.failures,
            self.instances.len(),
        );
        self.events.publish(FleetEvent::CycleCompleted {
            created: report.created,
            destroyed: report.destroyed,
            rebuilt: report.rebuilt,
            reloaded: report.reloaded,
            failures: report.failures,
            completed_at: Utc::now(),
        });

        Ok(report)
    }

    /// Allocate a port, spawn the runtime, load every desired spell
    /// unconditionally, and register the instance.
    async fn create_instance(&mut self, record: &AgentRecord) -> Result<(), FleetError> {
        let port = self.ports.allocate()?;
        let config = RuntimeConfig::from_record(record, port, self.config.scope());
        let handle = match self.runtime.spawn(config).await {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(release) = self.ports.release(port) {
                    warn!("could not return port {} after spawn failure: {}", port, release);
                }
                return Err(e.into());
            }
        };

        let mut instance = AgentInstance::new(record.id.clone(), port, handle);
        self.initial_spell_load(record, &mut instance).await;
        self.instances.insert(record.id.clone(), instance);

        info!("created agent {} on port {}", record.id, port);
        self.events.publish(FleetEvent::AgentCreated {
            id: record.id.clone(),
            port,
            created_at: Utc::now(),
        });
        Ok(())
    }

    /// Tear down and deregister an instance, returning its port to the
    /// pool. Destroying an absent id is a no-op.
    async fn destroy_instance(&mut self, id: &AgentId) -> bool {
        let Some(instance) = self.instances.remove(id) else {
            return false;
        };
        if let Err(e) = instance.teardown().await {
            // The handle is dropped regardless; the runtime owns cleanup
            // of whatever survived.
            warn!("teardown of agent {} failed: {}", id, e);
        }
        if let Err(e) = self.ports.release(instance.port) {
            warn!("could not release port {} of agent {}: {}", instance.port, id, e);
        }

        info!("destroyed agent {} (port {})", id, instance.port);
        self.events.publish(FleetEvent::AgentDestroyed {
            id: id.clone(),
            port: instance.port,
            destroyed_at: Utc::now(),
        });
        true
    }

    /// Initial unconditional load of the root spell and every named
    /// spell, bypassing the synchronizer's hash gating. Individual
    /// failures are logged and left for the synchronizer to retry.
    async fn initial_spell_load(&self, record: &AgentRecord, instance: &mut AgentInstance) {
        if let Some(root) = record.data.root_spell.as_deref() {
            match self.fetch_spells(&[root.to_owned()]).await {
                Some(spells) if !spells.is_empty() => {
                    if let Err(e) = instance.load_root_spell(&spells[0]).await {
                        warn!("agent {}: initial root spell load failed: {}", record.id, e);
                    }
                }
                Some(_) => warn!("agent {}: root spell '{}' not found", record.id, root),
                None => {}
            }
        }

        if record.spells.is_empty() {
            return;
        }
        let Some(spells) = self.fetch_spells(&record.spells).await else {
            return;
        };
        let by_name: HashMap<&str, &SpellRecord> =
            spells.iter().map(|s| (s.name.as_str(), s)).collect();
        for name in &record.spells {
            let Some(spell) = by_name.get(name.as_str()) else {
                warn!("agent {}: spell '{}' not found", record.id, name);
                continue;
            };
            if let Err(e) = instance.load_named_spell(spell).await {
                warn!("agent {}: initial load of spell '{}' failed: {}", record.id, name, e);
            }
        }
    }

    async fn fetch_spells(&self, names: &[String]) -> Option<Vec<SpellRecord>> {
        match self
            .spells
            .find(SpellQuery::by_names(self.config.scope(), names))
            .await
        {
            Ok(spells) => Some(spells),
            Err(e) => {
                warn!("spell fetch failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PortRange, Tenancy};
    use crate::domain::agent::AgentData;
    use crate::domain::runtime::AgentHandle;
    use crate::infrastructure::repositories::{InMemoryAgentStore, InMemorySpellStore};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RuntimeLog {
        spawns: Vec<(AgentId, u16)>,
        loads: Vec<(AgentId, String)>,
        destroys: Vec<AgentId>,
    }

    #[derive(Default)]
    struct MockRuntime {
        log: Arc<Mutex<RuntimeLog>>,
        fail_spawn: Mutex<HashSet<AgentId>>,
    }

    impl MockRuntime {
        fn fail_spawn_for(&self, id: &str) {
            self.fail_spawn.lock().unwrap().insert(AgentId::new(id));
        }

        fn clear_spawn_failures(&self) {
            self.fail_spawn.lock().unwrap().clear();
        }

        fn spawns(&self) -> Vec<(AgentId, u16)> {
            self.log.lock().unwrap().spawns.clone()
        }

        fn destroys(&self) -> Vec<AgentId> {
            self.log.lock().unwrap().destroys.clone()
        }

        fn loads_for(&self, id: &str) -> Vec<String> {
            let id = AgentId::new(id);
            self.log
                .lock()
                .unwrap()
                .loads
                .iter()
                .filter(|(agent, _)| *agent == id)
                .map(|(_, name)| name.clone())
                .collect()
        }

        fn call_count(&self) -> usize {
            let log = self.log.lock().unwrap();
            log.spawns.len() + log.loads.len() + log.destroys.len()
        }
    }

    struct MockHandle {
        agent: AgentId,
        log: Arc<Mutex<RuntimeLog>>,
    }

    #[async_trait]
    impl AgentRuntime for MockRuntime {
        async fn spawn(&self, config: RuntimeConfig) -> Result<Box<dyn AgentHandle>, RuntimeError> {
            if self.fail_spawn.lock().unwrap().contains(&config.agent_id) {
                return Err(RuntimeError::SpawnFailed("injected".into()));
            }
            self.log
                .lock()
                .unwrap()
                .spawns
                .push((config.agent_id.clone(), config.port));
            Ok(Box::new(MockHandle {
                agent: config.agent_id,
                log: self.log.clone(),
            }))
        }
    }

    #[async_trait]
    impl AgentHandle for MockHandle {
        async fn load_spell(&self, spell: &SpellRecord) -> Result<(), RuntimeError> {
            self.log
                .lock()
                .unwrap()
                .loads
                .push((self.agent.clone(), spell.name.clone()));
            Ok(())
        }

        async fn destroy(&self) -> Result<(), RuntimeError> {
            self.log.lock().unwrap().destroys.push(self.agent.clone());
            Ok(())
        }
    }

    fn record(id: &str) -> AgentRecord {
        AgentRecord {
            id: AgentId::new(id),
            enabled: true,
            dirty: false,
            data: AgentData::default(),
            spells: Vec::new(),
            project_id: None,
            updated_at: Utc::now(),
        }
    }

    fn fixture(range: &str) -> (FleetReconciler, InMemoryAgentStore, InMemorySpellStore, Arc<MockRuntime>) {
        let agents = InMemoryAgentStore::new();
        let spells = InMemorySpellStore::new();
        let runtime = Arc::new(MockRuntime::default());
        let config = FleetConfig::new(PortRange::parse(range).unwrap(), Tenancy::Multi);
        let reconciler = FleetReconciler::new(
            config,
            Arc::new(agents.clone()),
            Arc::new(spells.clone()),
            runtime.clone(),
            EventBus::with_default_capacity(),
        );
        (reconciler, agents, spells, runtime)
    }

    #[tokio::test]
    async fn unchanged_fleet_suppresses_the_cycle() {
        let (mut reconciler, agents, _spells, runtime) = fixture("7000-7009");
        agents.insert(record("a1"));

        let first = reconciler.reconcile().await.unwrap();
        assert_eq!(first.created, 1);
        let calls_after_first = runtime.call_count();

        let second = reconciler.reconcile().await.unwrap();
        assert!(second.suppressed);
        assert_eq!(second.created, 0);
        assert_eq!(runtime.call_count(), calls_after_first);
    }

    #[tokio::test]
    async fn diff_applies_exactly_the_set_difference() {
        let (mut reconciler, agents, _spells, runtime) = fixture("7000-7009");
        for id in ["a1", "a2", "a3"] {
            agents.insert(record(id));
        }
        reconciler.reconcile().await.unwrap();

        agents.remove(&AgentId::new("a1"));
        agents.insert(record("a4"));
        agents.insert(record("a5"));

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.destroyed, 1);
        assert_eq!(report.created, 2);
        assert_eq!(reconciler.instance_count(), 4);
        assert_eq!(runtime.destroys(), vec![AgentId::new("a1")]);

        // No two live instances share a port.
        let ports: Vec<u16> = ["a2", "a3", "a4", "a5"]
            .iter()
            .map(|id| reconciler.instance_port(&AgentId::new(*id)).unwrap())
            .collect();
        let unique: HashSet<u16> = ports.iter().copied().collect();
        assert_eq!(unique.len(), ports.len());
    }

    #[tokio::test]
    async fn disabled_and_externally_managed_records_are_not_created() {
        let (mut reconciler, agents, _spells, runtime) = fixture("7000-7009");
        let mut disabled = record("a1");
        disabled.enabled = false;
        let mut managed = record("a2");
        managed.data.externally_managed = true;
        agents.insert(disabled);
        agents.insert(managed);

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.created, 0);
        assert!(runtime.spawns().is_empty());
        assert_eq!(reconciler.instance_count(), 0);
    }

    #[tokio::test]
    async fn dirty_rebuild_clears_flag_and_does_not_repeat() {
        let (mut reconciler, agents, _spells, runtime) = fixture("7000-7009");
        agents.insert(record("a1"));
        reconciler.reconcile().await.unwrap();

        agents.mark_dirty(&AgentId::new("a1"));
        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.rebuilt, 1);
        assert_eq!(report.created, 0);
        assert_eq!(report.destroyed, 0);
        assert_eq!(runtime.destroys(), vec![AgentId::new("a1")]);
        assert_eq!(runtime.spawns().len(), 2);
        assert!(!agents.get(&AgentId::new("a1")).unwrap().dirty);

        // The acknowledged rebuild is fully suppressed next cycle.
        let next = reconciler.reconcile().await.unwrap();
        assert!(next.suppressed);
        assert_eq!(runtime.spawns().len(), 2);
    }

    #[tokio::test]
    async fn brand_new_dirty_record_is_rebuilt_exactly_once() {
        let (mut reconciler, agents, _spells, runtime) = fixture("7000-7009");
        let mut rec = record("a1");
        rec.dirty = true;
        agents.insert(rec);

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.rebuilt, 1);
        assert_eq!(report.created, 0);
        assert_eq!(runtime.spawns().len(), 1);
        assert_eq!(reconciler.instance_count(), 1);
    }

    #[tokio::test]
    async fn port_exhaustion_skips_creation_and_recovers_after_release() {
        let (mut reconciler, agents, _spells, _runtime) = fixture("7000-7001");
        for id in ["a1", "a2", "a3"] {
            agents.insert(record(id));
        }

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.failures, 1);
        assert_eq!(reconciler.instance_count(), 2);
        assert_eq!(reconciler.ports_available(), 0);

        // Freeing one port lets the skipped agent in on the next cycle.
        let survivor_ids: Vec<AgentId> = ["a1", "a2", "a3"]
            .iter()
            .map(|id| AgentId::new(*id))
            .filter(|id| reconciler.instance_port(id).is_some())
            .collect();
        agents.remove(&survivor_ids[0]);

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.destroyed, 1);
        assert_eq!(report.created, 1);
        assert_eq!(reconciler.instance_count(), 2);
    }

    #[tokio::test]
    async fn failed_creation_is_retried_without_a_record_change() {
        let (mut reconciler, agents, _spells, runtime) = fixture("7000-7009");
        agents.insert(record("a1"));
        runtime.fail_spawn_for("a1");

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.failures, 1);
        assert_eq!(reconciler.instance_count(), 0);
        // The failed spawn returned its port.
        assert_eq!(reconciler.ports_available(), 10);

        runtime.clear_spawn_failures();
        let report = reconciler.reconcile().await.unwrap();
        assert!(!report.suppressed);
        assert_eq!(report.created, 1);
        assert_eq!(reconciler.instance_count(), 1);
    }

    #[tokio::test]
    async fn creation_loads_root_and_named_spells_unconditionally() {
        let (mut reconciler, agents, spells, runtime) = fixture("7000-7009");
        spells.put(None, "greeter", serde_json::json!({"nodes": 1}));
        spells.put(None, "echo", serde_json::json!({"nodes": 2}));
        let mut rec = record("a1");
        rec.data.root_spell = Some("greeter".into());
        rec.spells = vec!["echo".into()];
        agents.insert(rec);

        reconciler.reconcile().await.unwrap();
        assert_eq!(runtime.loads_for("a1"), vec!["greeter", "echo"]);
    }

    #[tokio::test]
    async fn survivors_reload_only_changed_spells() {
        let (mut reconciler, agents, spells, runtime) = fixture("7000-7009");
        spells.put(None, "greeter", serde_json::json!({"v": 1}));
        let mut rec = record("a1");
        rec.data.root_spell = Some("greeter".into());
        agents.insert(rec);
        reconciler.reconcile().await.unwrap();
        assert_eq!(runtime.loads_for("a1").len(), 1);

        // Spell content change alone: new hash in the store, plus an
        // unrelated fleet change so the cycle is not suppressed.
        spells.put(None, "greeter", serde_json::json!({"v": 2}));
        agents.insert(record("a2"));

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.reloaded, 1);
        assert_eq!(runtime.loads_for("a1").len(), 2);

        // Same hash next time: no further reloads.
        agents.insert(record("a3"));
        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.reloaded, 0);
        assert_eq!(runtime.loads_for("a1").len(), 2);
    }

    #[tokio::test]
    async fn spell_content_change_does_not_rebuild_the_instance() {
        let (mut reconciler, agents, spells, runtime) = fixture("7000-7009");
        spells.put(None, "greeter", serde_json::json!({"v": 1}));
        let mut rec = record("a1");
        rec.data.root_spell = Some("greeter".into());
        agents.insert(rec);
        reconciler.reconcile().await.unwrap();

        spells.put(None, "greeter", serde_json::json!({"v": 2}));
        agents.insert(record("a2"));
        reconciler.reconcile().await.unwrap();

        assert!(runtime.destroys().is_empty());
        assert_eq!(
            runtime
                .spawns()
                .iter()
                .filter(|(id, _)| *id == AgentId::new("a1"))
                .count(),
            1
        );
    }
}
