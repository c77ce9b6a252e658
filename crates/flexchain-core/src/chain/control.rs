//! Per-run control object.
//!
//! Everything run-scoped lives here (status, stop message, memory,
//! cancellation token) so one `Chain` can drive many runs at once.

use std::sync::{Mutex, PoisonError};

use flexchain_types::status::ChainStatus;
use tokio_util::sync::CancellationToken;

use crate::memory::Memory;

#[derive(Debug, Default)]
struct RunState {
    status: ChainStatus,
    message: Option<String>,
    current_node: Option<String>,
    stopped_by: Option<String>,
}

/// Handle to one chain run, passed to nodes and listeners.
#[derive(Debug)]
pub struct RunControl {
    chain_id: String,
    run_id: String,
    memory: Memory,
    state: Mutex<RunState>,
    token: CancellationToken,
}

impl RunControl {
    pub fn new(chain_id: impl Into<String>, run_id: impl Into<String>, memory: Memory) -> Self {
        Self::with_token(chain_id, run_id, memory, CancellationToken::new())
    }

    /// Build a control driven by an existing token, e.g. a parent's child token.
    pub fn with_token(
        chain_id: impl Into<String>,
        run_id: impl Into<String>,
        memory: Memory,
        token: CancellationToken,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            run_id: run_id.into(),
            memory,
            state: Mutex::new(RunState::default()),
            token,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Cancelled once the run stops. Long-running nodes may select on it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Move from `Idle` to `Running`.
    pub fn begin(&self) {
        let mut state = self.lock();
        if state.status == ChainStatus::Idle {
            state.status = ChainStatus::Running;
        }
    }

    /// Request a normal stop. Returns `false` if the run already stopped.
    pub fn stop_normal(&self, reason: impl Into<String>) -> bool {
        self.stop(ChainStatus::StoppedNormal, reason.into())
    }

    /// Request an error stop. Returns `false` if the run already stopped.
    pub fn stop_error(&self, reason: impl Into<String>) -> bool {
        self.stop(ChainStatus::StoppedError, reason.into())
    }

    /// Mark a run that ran out of work as `StoppedNormal`, without a message.
    pub(crate) fn finish(&self) {
        let mut state = self.lock();
        if state.status.is_stopped() {
            return;
        }
        state.status = ChainStatus::StoppedNormal;
        drop(state);
        self.token.cancel();
    }

    // First request wins.
    fn stop(&self, status: ChainStatus, reason: String) -> bool {
        let mut state = self.lock();
        if state.status.is_stopped() {
            return false;
        }
        state.status = status;
        state.message = Some(reason);
        state.stopped_by = state.current_node.clone();
        drop(state);
        self.token.cancel();
        true
    }

    pub fn status(&self) -> ChainStatus {
        self.lock().status
    }

    pub fn is_stopped(&self) -> bool {
        self.status().is_stopped()
    }

    /// Reason recorded by the winning stop request.
    pub fn message(&self) -> Option<String> {
        self.lock().message.clone()
    }

    /// Node that was executing when the winning stop request was made.
    /// `None` for stops requested by listeners or from outside the run.
    pub fn stopped_by(&self) -> Option<String> {
        self.lock().stopped_by.clone()
    }

    /// Mark `node_id` as executing. Returns the node it replaces, which must
    /// be handed back to [`RunControl::leave_node`].
    pub(crate) fn enter_node(&self, node_id: &str) -> Option<String> {
        self.lock().current_node.replace(node_id.to_string())
    }

    pub(crate) fn leave_node(&self, previous: Option<String>) {
        self.lock().current_node = previous;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> RunControl {
        RunControl::new("c", "r", Memory::new())
    }

    #[test]
    fn starts_idle_then_running() {
        let ctl = control();
        assert_eq!(ctl.status(), ChainStatus::Idle);
        ctl.begin();
        assert_eq!(ctl.status(), ChainStatus::Running);
        assert!(!ctl.is_stopped());
        assert!(!ctl.token().is_cancelled());
    }

    #[test]
    fn first_stop_wins() {
        let ctl = control();
        ctl.begin();
        assert!(ctl.stop_normal("loop limit"));
        assert!(!ctl.stop_error("too late"));
        assert_eq!(ctl.status(), ChainStatus::StoppedNormal);
        assert_eq!(ctl.message().as_deref(), Some("loop limit"));
        assert!(ctl.token().is_cancelled());
    }

    #[test]
    fn begin_after_stop_keeps_stopped() {
        let ctl = control();
        ctl.stop_error("boom");
        ctl.begin();
        assert_eq!(ctl.status(), ChainStatus::StoppedError);
    }

    #[test]
    fn parent_cancellation_reaches_child_token() {
        let parent = control();
        let child = RunControl::with_token("child", "r2", Memory::new(), parent.token().child_token());
        parent.begin();
        parent.stop_normal("done");
        assert!(child.token().is_cancelled());
        assert!(!child.is_stopped());
    }

    #[test]
    fn stop_records_executing_node() {
        let ctl = control();
        ctl.begin();
        let outer = ctl.enter_node("router");
        let inner = ctl.enter_node("child");
        assert_eq!(inner.as_deref(), Some("router"));
        ctl.leave_node(inner);
        assert!(ctl.stop_error("bad input"));
        ctl.leave_node(outer);

        assert_eq!(ctl.stopped_by().as_deref(), Some("router"));
    }

    #[test]
    fn stop_outside_a_node_has_no_origin() {
        let ctl = control();
        ctl.begin();
        ctl.leave_node(ctl.enter_node("a"));
        ctl.stop_error("listener");
        assert_eq!(ctl.stopped_by(), None);
    }

    #[test]
    fn ids_and_memory() {
        let ctl = control();
        ctl.memory().set("k", serde_json::json!(1));
        assert_eq!(ctl.chain_id(), "c");
        assert_eq!(ctl.run_id(), "r");
        assert_eq!(ctl.memory().get("k"), Some(serde_json::json!(1)));
    }
}
