// Copyright (c) 2026 Arcanum Labs
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for Fleet Events
//
// In-memory event streaming over tokio broadcast channels. Subscribers
// that fall behind lose the oldest events; nothing replays on restart.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::FleetEvent;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("event bus closed")]
    Closed,
    #[error("no event available")]
    Empty,
    #[error("receiver lagged by {0} events")]
    Lagged(u64),
}

/// Bus for publishing and subscribing to fleet lifecycle events.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<FleetEvent>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    /// before old ones are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Default capacity (1000 events).
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers. Publishing with no
    /// subscribers is not an error.
    pub fn publish(&self, event: FleetEvent) {
        debug!("publishing event: {:?}", event);
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("no subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<FleetEvent>,
}

impl EventReceiver {
    /// Receive the next event, waiting until one is available.
    pub async fn recv(&mut self) -> Result<FleetEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Receive an event without blocking.
    pub fn try_recv(&mut self) -> Result<FleetEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}
