// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

//! Startup configuration: the listener port range and the tenancy mode
//! that scopes store queries.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fallback used when the configured range string does not parse.
pub const DEFAULT_PORT_RANGE: &str = "10001-10100";

/// Inclusive range of listener ports available to agent instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Build a range, swapping the bounds if they arrive inverted.
    pub fn new(start: u16, end: u16) -> Self {
        if start > end {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    /// Parse a `"start-end"` string.
    pub fn parse(s: &str) -> Option<Self> {
        let (start, end) = s.trim().split_once('-')?;
        let start = start.trim().parse().ok()?;
        let end = end.trim().parse().ok()?;
        Some(Self::new(start, end))
    }

    /// Parse a `"start-end"` string, falling back to [`DEFAULT_PORT_RANGE`]
    /// on malformed input. Startup never fails on a bad range string.
    pub fn parse_or_default(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| {
            warn!("unparseable port range '{}', using default {}", s, DEFAULT_PORT_RANGE);
            Self::default()
        })
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    /// Number of ports in the range.
    pub fn capacity(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        // The default constant is well-formed.
        Self::parse(DEFAULT_PORT_RANGE).unwrap_or(Self { start: 10001, end: 10100 })
    }
}

/// Whether store queries are scoped to one logical project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Tenancy {
    /// Unscoped queries: the reconciler sees every record.
    #[default]
    Multi,
    /// All queries filter by this project id.
    Single { project_id: String },
}

impl Tenancy {
    pub fn single(project_id: impl Into<String>) -> Self {
        Self::Single { project_id: project_id.into() }
    }

    /// Project id to scope queries with, if any.
    pub fn scope(&self) -> Option<&str> {
        match self {
            Self::Multi => None,
            Self::Single { project_id } => Some(project_id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FleetConfig {
    pub port_range: PortRange,
    pub tenancy: Tenancy,
}

impl FleetConfig {
    pub fn new(port_range: PortRange, tenancy: Tenancy) -> Self {
        Self { port_range, tenancy }
    }

    pub fn scope(&self) -> Option<&str> {
        self.tenancy.scope()
    }
}
