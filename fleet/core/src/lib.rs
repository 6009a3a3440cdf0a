// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0
//! Fleet reconciliation core for the Arcanum agent orchestrator.
//!
//! Keeps an in-memory fleet of long-lived agent instances consistent
//! with the desired records in an external store: create/destroy diffing
//! against the last-seen snapshot, hash-gated spell hot-reloads on
//! survivors, and a bounded pool of listener ports that must never
//! double-allocate.
//!
//! # Architecture
//!
//! - **domain**: typed records and the collaborator ports (record
//!   stores, agent runtime).
//! - **application**: the reconciler, the spell synchronizer, the port
//!   pool, and the instance lifecycle wrapper.
//! - **infrastructure**: in-memory adapters and the event bus.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::{CycleReport, FleetError, FleetReconciler};
pub use config::{FleetConfig, PortRange, Tenancy, DEFAULT_PORT_RANGE};
pub use domain::*;
