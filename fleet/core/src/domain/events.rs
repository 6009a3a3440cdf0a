// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;

/// Fleet lifecycle events published over the event bus.
///
/// Observability only: no component drives its own state from these, so
/// the bus's lossy in-memory semantics are acceptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    AgentCreated {
        id: AgentId,
        port: u16,
        created_at: DateTime<Utc>,
    },
    AgentDestroyed {
        id: AgentId,
        port: u16,
        destroyed_at: DateTime<Utc>,
    },
    AgentRebuilt {
        id: AgentId,
        rebuilt_at: DateTime<Utc>,
    },
    SpellReloaded {
        agent_id: AgentId,
        spell: String,
        hash: String,
        reloaded_at: DateTime<Utc>,
    },
    CycleCompleted {
        created: usize,
        destroyed: usize,
        rebuilt: usize,
        reloaded: usize,
        failures: usize,
        completed_at: DateTime<Utc>,
    },
}
