//! Per-chain event bus.
//!
//! Listeners are called synchronously, in registration order, on the task that
//! publishes. Every event is also forwarded to a `tokio::sync::broadcast`
//! channel so async consumers can tap the stream; publishing with no active
//! subscribers is a no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use flexchain_types::event::{ChainEvent, EventKind};
use tokio::sync::broadcast;

use super::listener::{ChainEventListener, ListenerId};
use crate::chain::control::RunControl;

struct Registration {
    id: ListenerId,
    kind: Option<EventKind>,
    listener: Arc<dyn ChainEventListener>,
}

/// Synchronous listener registry plus a broadcast tap.
pub struct EventBus {
    listeners: RwLock<Vec<Arc<Registration>>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<ChainEvent>,
}

impl EventBus {
    /// Create a bus whose broadcast tap holds up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            sender,
        }
    }

    /// Register a listener for every event.
    pub fn register(&self, listener: Arc<dyn ChainEventListener>) -> ListenerId {
        self.add(None, listener)
    }

    /// Register a listener for one event kind only.
    pub fn register_for(&self, kind: EventKind, listener: Arc<dyn ChainEventListener>) -> ListenerId {
        self.add(Some(kind), listener)
    }

    fn add(&self, kind: Option<EventKind>, listener: Arc<dyn ChainEventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(Registration { id, kind, listener }));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// New receiver for every future event.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.sender.subscribe()
    }

    /// Deliver `event` to matching listeners, then to broadcast subscribers.
    ///
    /// The registry is snapshotted first, so listeners may register or remove
    /// listeners without deadlocking. Listener errors are logged and skipped.
    pub fn publish(&self, event: &ChainEvent, run: &RunControl) {
        let kind = event.kind();
        let snapshot: Vec<Arc<Registration>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for reg in snapshot.iter().filter(|r| r.kind.is_none_or(|k| k == kind)) {
            if let Err(e) = reg.listener.on_event(event, run) {
                tracing::warn!(
                    listener = %reg.id,
                    event = event.name(),
                    chain_id = event.chain_id(),
                    run_id = event.run_id(),
                    error = %e,
                    "event listener failed, continuing"
                );
            }
        }

        let _ = self.sender.send(event.clone());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listener_count", &self.listener_count())
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::event::listener::listener_fn;
    use crate::memory::Memory;

    fn run() -> RunControl {
        RunControl::new("chain", "run-1", Memory::new())
    }

    fn started() -> ChainEvent {
        ChainEvent::ChainStarted {
            chain_id: "chain".into(),
            run_id: "run-1".into(),
        }
    }

    fn finished_node(node: &str) -> ChainEvent {
        ChainEvent::NodeFinished {
            chain_id: "chain".into(),
            run_id: "run-1".into(),
            node_id: node.into(),
            exec_count: 1,
        }
    }

    #[test]
    fn listeners_called_in_registration_order() {
        let bus = EventBus::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.register(listener_fn(move |_, _| {
                seen.lock().unwrap().push(tag);
                Ok(())
            }));
        }

        bus.publish(&started(), &run());
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn filtered_listener_only_sees_its_kind() {
        let bus = EventBus::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.register_for(
            EventKind::NodeFinished,
            listener_fn(move |e, _| {
                s.lock().unwrap().push(e.name());
                Ok(())
            }),
        );

        let ctl = run();
        bus.publish(&started(), &ctl);
        bus.publish(&finished_node("a"), &ctl);
        assert_eq!(*seen.lock().unwrap(), vec!["on_node_finished"]);
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let bus = EventBus::new(16);
        let count = Arc::new(AtomicU64::new(0));

        bus.register(listener_fn(|_, _| {
            anyhow::bail!("listener exploded")
        }));
        let c = count.clone();
        bus.register(listener_fn(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        bus.publish(&started(), &run());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_listener() {
        let bus = EventBus::new(16);
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let id = bus.register(listener_fn(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        assert_eq!(bus.listener_count(), 1);

        assert!(bus.remove(id));
        assert!(!bus.remove(id));
        bus.publish(&started(), &run());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_can_stop_run() {
        let bus = EventBus::new(16);
        bus.register(listener_fn(|_, run| {
            run.stop_normal("enough");
            Ok(())
        }));

        let ctl = run();
        ctl.begin();
        bus.publish(&started(), &ctl);
        assert!(ctl.is_stopped());
        assert_eq!(ctl.message().as_deref(), Some("enough"));
    }

    #[tokio::test]
    async fn publish_reaches_broadcast_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(&finished_node("a"), &run());

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, ChainEvent::NodeFinished { ref node_id, .. } if node_id == "a"));
    }

    #[test]
    fn publish_with_no_listeners_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(&started(), &run());
    }

    #[test]
    fn debug_impl() {
        let bus = EventBus::new(16);
        let _rx = bus.subscribe();
        let debug = format!("{bus:?}");
        assert!(debug.contains("EventBus"));
        assert!(debug.contains("receiver_count"));
    }
}
