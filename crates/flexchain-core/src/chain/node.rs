//! The node capability.
//!
//! Follows the same blanket-impl pattern as the rest of the workspace:
//! 1. `Node` uses RPITIT async methods for static dispatch
//! 2. `NodeDyn` is the object-safe companion with boxed futures
//! 3. every `T: Node` is a `NodeDyn`, so chains store `Box<dyn NodeDyn>`

use std::future::Future;
use std::pin::Pin;

use flexchain_types::definition::InputMode;
use flexchain_types::error::NodeError;
use flexchain_types::result::NodeResult;
use serde_json::Value;

use super::control::RunControl;
use super::executor::{self, EventRoute};
use crate::memory::{Memory, NodeMemory};

/// A unit of work inside a chain.
///
/// Nodes never hold a reference to their chain; everything run-scoped is
/// reached through the [`NodeContext`].
pub trait Node: Send + Sync {
    /// Identifier, unique within the enclosing chain.
    fn id(&self) -> &str;

    /// Whether the node wants the previous result or a memory snapshot.
    fn input_mode(&self) -> InputMode {
        InputMode::Previous
    }

    fn invoke(
        &self,
        input: Value,
        ctx: &NodeContext<'_>,
    ) -> impl Future<Output = Result<NodeResult, NodeError>> + Send;
}

/// Object-safe version of [`Node`] with boxed futures.
pub trait NodeDyn: Send + Sync {
    fn id(&self) -> &str;

    fn input_mode(&self) -> InputMode;

    fn invoke_boxed<'a>(
        &'a self,
        input: Value,
        ctx: &'a NodeContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<NodeResult, NodeError>> + Send + 'a>>;
}

impl<T: Node> NodeDyn for T {
    fn id(&self) -> &str {
        Node::id(self)
    }

    fn input_mode(&self) -> InputMode {
        Node::input_mode(self)
    }

    fn invoke_boxed<'a>(
        &'a self,
        input: Value,
        ctx: &'a NodeContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<NodeResult, NodeError>> + Send + 'a>> {
        Box::pin(self.invoke(input, ctx))
    }
}

/// What a node sees of the run while it executes.
pub struct NodeContext<'a> {
    node_id: &'a str,
    control: &'a RunControl,
    route: &'a EventRoute<'a>,
}

impl<'a> NodeContext<'a> {
    pub(crate) fn new(node_id: &'a str, route: &'a EventRoute<'a>) -> Self {
        Self {
            node_id,
            control: route.control(),
            route,
        }
    }

    pub(crate) fn route(&self) -> &'a EventRoute<'a> {
        self.route
    }

    /// Id of the node being invoked.
    pub fn node_id(&self) -> &str {
        self.node_id
    }

    pub fn memory(&self) -> &Memory {
        self.control.memory()
    }

    /// Private memory of the node being invoked.
    pub fn node_memory(&self) -> NodeMemory {
        self.control.memory().node_memory(self.node_id)
    }

    /// Run control, for `stop_normal`/`stop_error` and the cancellation token.
    pub fn control(&self) -> &RunControl {
        self.control
    }

    /// Invoke a child node as a step of this run.
    ///
    /// The child gets its own before/after/finished events and execution
    /// counter, exactly like a node driven by the executor. A child failure is
    /// returned to the caller, which decides whether it fails the parent node.
    pub async fn run_child(&self, node: &dyn NodeDyn, input: Value) -> Result<NodeResult, NodeError> {
        let child_id = node.id();
        self.route
            .publish(&executor::before_event(self.control, child_id));

        let input = match node.input_mode() {
            InputMode::Memory => self.control.memory().snapshot_value(),
            InputMode::Previous => input,
        };
        let child_ctx = NodeContext::new(child_id, self.route);
        let previous = self.control.enter_node(child_id);
        let outcome = node.invoke_boxed(input, &child_ctx).await;
        self.control.leave_node(previous);
        let result = outcome?;

        let exec_count = executor::record_success(self.control, child_id, &result);
        self.route
            .publish(&executor::after_event(self.control, child_id, &result));
        self.route
            .publish(&executor::finished_event(self.control, child_id, exec_count));
        Ok(result)
    }
}

impl std::fmt::Debug for NodeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("node_id", &self.node_id)
            .field("chain_id", &self.control.chain_id())
            .field("run_id", &self.control.run_id())
            .finish()
    }
}
