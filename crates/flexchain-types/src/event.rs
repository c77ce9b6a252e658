//! Chain lifecycle events.
//!
//! Events are published by the executor on the task driving a run and delivered
//! to listeners in registration order. Each variant carries the chain id and the
//! run id so a listener shared between chains (or runs) can tell them apart.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::ChainStatus;

/// Discriminator for [`ChainEvent`], used for filtered listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ChainStarted,
    NodeExecuteBefore,
    InvokeAfter,
    NodeFinished,
    Error,
    ChainFinished,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::ChainStarted => "on_chain_started",
            EventKind::NodeExecuteBefore => "on_node_execute_before",
            EventKind::InvokeAfter => "on_invoke_after",
            EventKind::NodeFinished => "on_node_finished",
            EventKind::Error => "on_error",
            EventKind::ChainFinished => "on_chain_finished",
        }
    }
}

/// Immutable lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    ChainStarted {
        chain_id: String,
        run_id: String,
    },
    NodeExecuteBefore {
        chain_id: String,
        run_id: String,
        node_id: String,
    },
    InvokeAfter {
        chain_id: String,
        run_id: String,
        node_id: String,
        result: Value,
    },
    NodeFinished {
        chain_id: String,
        run_id: String,
        node_id: String,
        exec_count: u64,
    },
    Error {
        chain_id: String,
        run_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
        error: String,
    },
    ChainFinished {
        chain_id: String,
        run_id: String,
        status: ChainStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChainEvent::ChainStarted { .. } => EventKind::ChainStarted,
            ChainEvent::NodeExecuteBefore { .. } => EventKind::NodeExecuteBefore,
            ChainEvent::InvokeAfter { .. } => EventKind::InvokeAfter,
            ChainEvent::NodeFinished { .. } => EventKind::NodeFinished,
            ChainEvent::Error { .. } => EventKind::Error,
            ChainEvent::ChainFinished { .. } => EventKind::ChainFinished,
        }
    }

    /// Stable event name, e.g. `on_node_finished`.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn chain_id(&self) -> &str {
        match self {
            ChainEvent::ChainStarted { chain_id, .. }
            | ChainEvent::NodeExecuteBefore { chain_id, .. }
            | ChainEvent::InvokeAfter { chain_id, .. }
            | ChainEvent::NodeFinished { chain_id, .. }
            | ChainEvent::Error { chain_id, .. }
            | ChainEvent::ChainFinished { chain_id, .. } => chain_id,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            ChainEvent::ChainStarted { run_id, .. }
            | ChainEvent::NodeExecuteBefore { run_id, .. }
            | ChainEvent::InvokeAfter { run_id, .. }
            | ChainEvent::NodeFinished { run_id, .. }
            | ChainEvent::Error { run_id, .. }
            | ChainEvent::ChainFinished { run_id, .. } => run_id,
        }
    }

    /// Node the event refers to; `None` for chain-level events.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ChainEvent::NodeExecuteBefore { node_id, .. }
            | ChainEvent::InvokeAfter { node_id, .. }
            | ChainEvent::NodeFinished { node_id, .. } => Some(node_id),
            ChainEvent::Error { node_id, .. } => node_id.as_deref(),
            ChainEvent::ChainStarted { .. } | ChainEvent::ChainFinished { .. } => None,
        }
    }
}
