//! Closure-backed nodes.

use std::future::Future;

use flexchain_types::definition::InputMode;
use flexchain_types::error::NodeError;
use flexchain_types::result::NodeResult;
use serde_json::Value;

use crate::chain::{Node, NodeContext};
use crate::memory::Memory;

type SyncFn = dyn Fn(Value, &NodeContext<'_>) -> Result<NodeResult, NodeError> + Send + Sync;

/// Node backed by a synchronous closure.
pub struct FnNode {
    id: String,
    input_mode: InputMode,
    f: Box<SyncFn>,
}

impl FnNode {
    pub fn new<F>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, &NodeContext<'_>) -> Result<NodeResult, NodeError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            input_mode: InputMode::Previous,
            f: Box::new(f),
        }
    }

    /// Receive a memory snapshot instead of the previous result.
    pub fn reading_memory(mut self) -> Self {
        self.input_mode = InputMode::Memory;
        self
    }
}

impl Node for FnNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    async fn invoke(&self, input: Value, ctx: &NodeContext<'_>) -> Result<NodeResult, NodeError> {
        (self.f)(input, ctx)
    }
}

impl std::fmt::Debug for FnNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnNode")
            .field("id", &self.id)
            .field("input_mode", &self.input_mode)
            .finish_non_exhaustive()
    }
}

/// Node backed by an async closure over the input and the run's memory.
pub struct AsyncFnNode<F> {
    id: String,
    input_mode: InputMode,
    f: F,
}

impl<F> AsyncFnNode<F> {
    pub fn new<Fut>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, Memory) -> Fut + Send + Sync,
        Fut: Future<Output = Result<NodeResult, NodeError>> + Send,
    {
        Self {
            id: id.into(),
            input_mode: InputMode::Previous,
            f,
        }
    }

    pub fn reading_memory(mut self) -> Self {
        self.input_mode = InputMode::Memory;
        self
    }
}

impl<F, Fut> Node for AsyncFnNode<F>
where
    F: Fn(Value, Memory) -> Fut + Send + Sync,
    Fut: Future<Output = Result<NodeResult, NodeError>> + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    fn invoke(
        &self,
        input: Value,
        ctx: &NodeContext<'_>,
    ) -> impl Future<Output = Result<NodeResult, NodeError>> + Send {
        (self.f)(input, ctx.memory().clone())
    }
}

impl<F> std::fmt::Debug for AsyncFnNode<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnNode")
            .field("id", &self.id)
            .field("input_mode", &self.input_mode)
            .finish_non_exhaustive()
    }
}
