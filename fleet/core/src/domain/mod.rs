// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod events;
pub mod repository;
pub mod runtime;
pub mod spell;

pub use agent::{AgentData, AgentId, AgentPatch, AgentRecord};
pub use events::FleetEvent;
pub use repository::{AgentQuery, AgentRecordStore, SpellQuery, SpellRecordStore, StoreError};
pub use runtime::{AgentHandle, AgentRuntime, RuntimeConfig, RuntimeError};
pub use spell::SpellRecord;
