use std::sync::Arc;

use flexchain_types::event::ChainEvent;

use crate::chain::control::RunControl;

/// Receives chain lifecycle events synchronously on the task driving the run.
///
/// `run` exposes the run's memory and the `stop_normal`/`stop_error` controls.
/// A returned error is logged and otherwise ignored.
pub trait ChainEventListener: Send + Sync {
    fn on_event(&self, event: &ChainEvent, run: &RunControl) -> anyhow::Result<()>;
}

impl<F> ChainEventListener for F
where
    F: Fn(&ChainEvent, &RunControl) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &ChainEvent, run: &RunControl) -> anyhow::Result<()> {
        self(event, run)
    }
}

/// Wrap a closure as a shareable listener.
pub fn listener_fn<F>(f: F) -> Arc<dyn ChainEventListener>
where
    F: Fn(&ChainEvent, &RunControl) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handle returned by listener registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}
