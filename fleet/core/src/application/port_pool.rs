// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

//! Bounded pool of listener ports handed out to agent instances.
//!
//! Invariant: a port is in the pool iff no live instance holds it. The
//! pool is owned and mutated exclusively by the fleet reconciler.

use thiserror::Error;

use crate::config::PortRange;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortPoolError {
    /// Every port in the range is held by a live instance. Fatal to the
    /// requesting creation attempt, never to the reconciler.
    #[error("port pool exhausted")]
    Exhausted,
    /// Release of a port that is already available, or was never handed
    /// out. Caller bug; rejected to preserve uniqueness.
    #[error("port {0} is not currently allocated")]
    NotAllocated(u16),
    #[error("port {0} is outside the configured range")]
    OutOfRange(u16),
}

#[derive(Debug)]
pub struct PortPool {
    range: PortRange,
    available: Vec<u16>,
}

impl PortPool {
    /// Populate the pool with every port in the inclusive range.
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            available: range.iter().collect(),
        }
    }

    /// Remove and return an arbitrary available port. Callers must not
    /// depend on which one.
    pub fn allocate(&mut self) -> Result<u16, PortPoolError> {
        self.available.pop().ok_or(PortPoolError::Exhausted)
    }

    /// Return a previously allocated port to the pool.
    pub fn release(&mut self, port: u16) -> Result<(), PortPoolError> {
        if !self.range.contains(port) {
            return Err(PortPoolError::OutOfRange(port));
        }
        if self.available.contains(&port) {
            return Err(PortPoolError::NotAllocated(port));
        }
        self.available.push(port);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.range.capacity()
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(range: &str) -> PortPool {
        PortPool::new(PortRange::parse(range).unwrap())
    }

    #[test]
    fn allocates_every_port_exactly_once() {
        let mut pool = pool("7000-7004");
        let mut seen = std::collections::HashSet::new();
        for _ in 0..5 {
            assert!(seen.insert(pool.allocate().unwrap()));
        }
        assert_eq!(pool.allocate(), Err(PortPoolError::Exhausted));
        assert!(seen.iter().all(|p| (7000..=7004).contains(p)));
    }

    #[test]
    fn release_makes_port_available_again() {
        let mut pool = pool("10-10");
        let port = pool.allocate().unwrap();
        assert_eq!(port, 10);
        assert_eq!(pool.allocate(), Err(PortPoolError::Exhausted));

        pool.release(port).unwrap();
        assert_eq!(pool.allocate().unwrap(), 10);
    }

    #[test]
    fn double_release_is_rejected() {
        let mut pool = pool("7000-7001");
        let port = pool.allocate().unwrap();
        pool.release(port).unwrap();
        assert_eq!(pool.release(port), Err(PortPoolError::NotAllocated(port)));
    }

    #[test]
    fn release_outside_range_is_rejected() {
        let mut pool = pool("7000-7001");
        assert_eq!(pool.release(9), Err(PortPoolError::OutOfRange(9)));
    }

    #[test]
    fn capacity_matches_range() {
        let pool = pool("7000-7009");
        assert_eq!(pool.capacity(), 10);
        assert_eq!(pool.available(), 10);
    }
}
