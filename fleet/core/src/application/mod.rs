// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

pub mod instance;
pub mod port_pool;
pub mod reconciler;
pub mod spell_sync;

pub use instance::AgentInstance;
pub use port_pool::{PortPool, PortPoolError};
pub use reconciler::{CycleReport, FleetError, FleetReconciler};
pub use spell_sync::SpellSynchronizer;
