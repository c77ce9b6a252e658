//! Iteration guard for looping chains.
//!
//! `LoopGuard` is an ordinary event listener. On every `NodeFinished` it reads
//! the finishing node's `_exec_count` and stops the run normally once the
//! count exceeds the configured limit. Events bubbling up from nested runs are
//! ignored; their counters live in the nested memory.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flexchain_types::event::ChainEvent;

use super::control::RunControl;
use crate::event::ChainEventListener;

/// Limit value meaning "no limit".
pub const UNBOUNDED: u64 = u64::MAX;

/// Result of checking one execution count against the limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopCheckResult {
    Ok,
    LimitReached { description: String },
}

/// Stops a run once any node has executed more than `max_loop_count` times.
///
/// Cloning produces a shared view of the same limit.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    max_loop_count: Arc<AtomicU64>,
}

impl LoopGuard {
    /// An unbounded guard.
    pub fn new() -> Self {
        Self::with_limit(UNBOUNDED)
    }

    pub fn with_limit(max: u64) -> Self {
        Self {
            max_loop_count: Arc::new(AtomicU64::new(max)),
        }
    }

    pub fn max_loop_count(&self) -> Option<u64> {
        match self.max_loop_count.load(Ordering::Relaxed) {
            UNBOUNDED => None,
            n => Some(n),
        }
    }

    /// Change the limit; `None` removes it. Affects runs started afterwards and
    /// runs in flight alike.
    pub fn set_max_loop_count(&self, max: Option<u64>) {
        self.max_loop_count
            .store(max.unwrap_or(UNBOUNDED), Ordering::Relaxed);
    }

    pub fn check(&self, node_id: &str, exec_count: u64) -> LoopCheckResult {
        let max = self.max_loop_count.load(Ordering::Relaxed);
        if max != UNBOUNDED && exec_count > max {
            LoopCheckResult::LimitReached {
                description: format!(
                    "loop limit reached: node '{node_id}' executed {exec_count} times (max_loop_count: {max})"
                ),
            }
        } else {
            LoopCheckResult::Ok
        }
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainEventListener for LoopGuard {
    fn on_event(&self, event: &ChainEvent, run: &RunControl) -> anyhow::Result<()> {
        let ChainEvent::NodeFinished { node_id, run_id, .. } = event else {
            return Ok(());
        };
        if run_id != run.run_id() {
            return Ok(());
        }

        // the memory counter is authoritative
        let exec_count = run.memory().exec_count(node_id);
        if let LoopCheckResult::LimitReached { description } = self.check(node_id, exec_count) {
            tracing::info!(
                chain_id = run.chain_id(),
                run_id = run.run_id(),
                node_id = %node_id,
                exec_count,
                "loop guard stopping run"
            );
            run.stop_normal(description);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    fn finished(node: &str) -> ChainEvent {
        ChainEvent::NodeFinished {
            chain_id: "c".into(),
            run_id: "r".into(),
            node_id: node.into(),
            exec_count: 0,
        }
    }

    #[test]
    fn unbounded_never_trips() {
        let guard = LoopGuard::new();
        assert_eq!(guard.max_loop_count(), None);
        assert_eq!(guard.check("n", u64::MAX - 1), LoopCheckResult::Ok);
    }

    #[test]
    fn trips_only_above_limit() {
        let guard = LoopGuard::with_limit(3);
        assert_eq!(guard.check("n", 3), LoopCheckResult::Ok);
        match guard.check("n", 4) {
            LoopCheckResult::LimitReached { description } => {
                assert!(description.contains("loop limit"));
                assert!(description.contains("'n'"));
            }
            other => panic!("expected limit, got {other:?}"),
        }
    }

    #[test]
    fn clone_shares_limit() {
        let guard = LoopGuard::new();
        let other = guard.clone();
        other.set_max_loop_count(Some(2));
        assert_eq!(guard.max_loop_count(), Some(2));
        other.set_max_loop_count(None);
        assert_eq!(guard.max_loop_count(), None);
    }

    #[test]
    fn listener_stops_run_from_memory_count() {
        let guard = LoopGuard::with_limit(1);
        let run = RunControl::new("c", "r", Memory::new());
        run.begin();

        run.memory().node_memory("n").increment_exec_count();
        guard.on_event(&finished("n"), &run).unwrap();
        assert!(!run.is_stopped());

        run.memory().node_memory("n").increment_exec_count();
        guard.on_event(&finished("n"), &run).unwrap();
        assert!(run.is_stopped());
        assert!(run.message().unwrap().contains("loop limit"));
    }

    #[test]
    fn ignores_nested_run_events() {
        let guard = LoopGuard::with_limit(0);
        let run = RunControl::new("c", "r", Memory::new());
        run.begin();
        run.memory().node_memory("n").increment_exec_count();

        let nested = ChainEvent::NodeFinished {
            chain_id: "inner".into(),
            run_id: "r-nested".into(),
            node_id: "n".into(),
            exec_count: 1,
        };
        guard.on_event(&nested, &run).unwrap();
        assert!(!run.is_stopped());

        guard.on_event(&finished("n"), &run).unwrap();
        assert!(run.is_stopped());
    }

    #[test]
    fn ignores_other_events() {
        let guard = LoopGuard::with_limit(0);
        let run = RunControl::new("c", "r", Memory::new());
        run.begin();
        let event = ChainEvent::ChainStarted {
            chain_id: "c".into(),
            run_id: "r".into(),
        };
        guard.on_event(&event, &run).unwrap();
        assert!(!run.is_stopped());
    }
}
