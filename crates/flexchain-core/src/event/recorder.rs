//! A listener that keeps every event it sees.

use std::sync::{Mutex, PoisonError};

use flexchain_types::event::{ChainEvent, EventKind};

use super::listener::ChainEventListener;
use crate::chain::control::RunControl;

/// Records events in publish order.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<ChainEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every recorded event.
    pub fn events(&self) -> Vec<ChainEvent> {
        self.lock().clone()
    }

    /// `(event name, node id)` pairs, handy for asserting on ordering.
    pub fn trace(&self) -> Vec<(&'static str, Option<String>)> {
        self.lock()
            .iter()
            .map(|e| (e.name(), e.node_id().map(str::to_string)))
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ChainEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChainEventListener for EventRecorder {
    fn on_event(&self, event: &ChainEvent, _run: &RunControl) -> anyhow::Result<()> {
        self.lock().push(event.clone());
        Ok(())
    }
}
