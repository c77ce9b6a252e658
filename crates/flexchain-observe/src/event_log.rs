//! Chain events as tracing events.

use flexchain_core::chain::RunControl;
use flexchain_core::event::ChainEventListener;
use flexchain_types::event::ChainEvent;
use flexchain_types::status::ChainStatus;

/// Logs every chain event with its chain, run and node ids.
///
/// Lifecycle events log at `info`, node steps at `debug`, failures at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl TracingListener {
    pub fn new() -> Self {
        Self
    }
}

impl ChainEventListener for TracingListener {
    fn on_event(&self, event: &ChainEvent, _run: &RunControl) -> anyhow::Result<()> {
        let chain_id = event.chain_id();
        let run_id = event.run_id();
        match event {
            ChainEvent::ChainStarted { .. } => {
                tracing::info!(chain_id, run_id, "chain started");
            }
            ChainEvent::NodeExecuteBefore { node_id, .. } => {
                tracing::debug!(chain_id, run_id, node_id = %node_id, "node starting");
            }
            ChainEvent::InvokeAfter { node_id, result, .. } => {
                tracing::debug!(chain_id, run_id, node_id = %node_id, %result, "node returned");
            }
            ChainEvent::NodeFinished {
                node_id, exec_count, ..
            } => {
                tracing::debug!(chain_id, run_id, node_id = %node_id, exec_count, "node finished");
            }
            ChainEvent::Error { node_id, error, .. } => {
                tracing::warn!(chain_id, run_id, node_id = ?node_id, error = %error, "chain error");
            }
            ChainEvent::ChainFinished {
                status, message, ..
            } => {
                if *status == ChainStatus::StoppedError {
                    tracing::warn!(chain_id, run_id, %status, message = ?message, "chain finished");
                } else {
                    tracing::info!(chain_id, run_id, %status, message = ?message, "chain finished");
                }
            }
        }
        Ok(())
    }
}
