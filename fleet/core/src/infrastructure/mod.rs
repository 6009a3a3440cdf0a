// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod repositories;
pub mod runtime;

pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use repositories::{InMemoryAgentStore, InMemorySpellStore};
pub use runtime::TracingAgentRuntime;
