//! Chains: node graphs driven by the executor.
//!
//! A `Chain` owns its nodes, edges, listeners and collaborators (condition
//! evaluator, id generator). The graph is read-only while runs are in flight;
//! every run gets a fresh [`Memory`] and [`RunControl`], so one chain can serve
//! many concurrent runs.

pub mod control;
pub mod edge;
pub mod executor;
pub mod guard;
pub mod loop_chain;
pub mod node;
pub mod sequential;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flexchain_types::config::EngineConfig;
use flexchain_types::error::{ChainError, GraphDefinitionError, NodeError};
use flexchain_types::event::{ChainEvent, EventKind};
use flexchain_types::result::NodeResult;
use flexchain_types::status::ChainStatus;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use control::RunControl;
pub use edge::{Condition, Edge};
pub use loop_chain::LoopChain;
pub use node::{Node, NodeContext, NodeDyn};
pub use sequential::SequentialChain;

use crate::event::{ChainEventListener, EventBus, ListenerId};
use crate::expression::{ConditionEvaluator, JexlEvaluator};
use crate::id::{IdGenerator, UuidV7IdGenerator};
use crate::memory::Memory;

/// Key under which non-object results are returned by `execute_for_result`.
pub const RESULT_KEY: &str = "result";

/// A graph of nodes plus the machinery to run it.
pub struct Chain {
    id: String,
    pub(crate) nodes: Vec<Box<dyn NodeDyn>>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) node_conditions: HashMap<String, Condition>,
    pub(crate) entry: Option<String>,
    pub(crate) bus: EventBus,
    pub(crate) evaluator: Arc<dyn ConditionEvaluator>,
    id_generator: Arc<dyn IdGenerator>,
    inherit_parent_memory: bool,
}

impl Chain {
    /// Empty chain with default engine settings.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, &EngineConfig::default())
    }

    pub fn with_config(id: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            id: id.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            node_conditions: HashMap::new(),
            entry: None,
            bus: EventBus::new(config.event_channel_capacity),
            evaluator: Arc::new(JexlEvaluator::new()),
            id_generator: Arc::new(UuidV7IdGenerator),
            inherit_parent_memory: config.inherit_parent_memory,
        }
    }

    /// Empty chain whose own id and run ids come from `generator`.
    pub fn with_id_generator(generator: Arc<dyn IdGenerator>) -> Self {
        let mut chain = Self::new(generator.generate());
        chain.id_generator = generator;
        chain
    }

    /// Replace the condition evaluator used for expression conditions.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Replace the run id generator.
    pub fn set_id_generator(&mut self, generator: Arc<dyn IdGenerator>) {
        self.id_generator = generator;
    }

    pub fn set_inherit_parent_memory(&mut self, inherit: bool) {
        self.inherit_parent_memory = inherit;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // -----------------------------------------------------------------------
    // Graph construction
    // -----------------------------------------------------------------------

    /// Append a node. Fails if a node with the same id exists.
    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> Result<(), GraphDefinitionError> {
        self.add_boxed_node(Box::new(node))
    }

    pub fn add_boxed_node(&mut self, node: Box<dyn NodeDyn>) -> Result<(), GraphDefinitionError> {
        if self.index.contains_key(node.id()) {
            return Err(GraphDefinitionError::DuplicateNodeId(node.id().to_string()));
        }
        self.insert_node(node);
        Ok(())
    }

    /// Append a node whose id is known to be free.
    pub(crate) fn insert_node(&mut self, node: Box<dyn NodeDyn>) {
        self.index.insert(node.id().to_string(), self.nodes.len());
        self.nodes.push(node);
    }

    /// Append an edge. Endpoints are checked lazily during traversal.
    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Only invoke `node_id` when `condition` holds at the time it is reached.
    ///
    /// A skipped node publishes no events and keeps its execution count; the
    /// value it received moves on along its first matching edge. Replaces any
    /// earlier condition on the same node.
    pub fn set_node_condition(&mut self, node_id: impl Into<String>, condition: Condition) {
        self.node_conditions.insert(node_id.into(), condition);
    }

    pub fn node_condition(&self, node_id: &str) -> Option<&Condition> {
        self.node_conditions.get(node_id)
    }

    /// Start every run at `node_id` instead of discovering start nodes.
    pub fn set_entry(&mut self, node_id: impl Into<String>) {
        self.entry = Some(node_id.into());
    }

    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn node(&self, node_id: &str) -> Option<&dyn NodeDyn> {
        self.index.get(node_id).map(|&i| self.nodes[i].as_ref())
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id())
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register a listener for every event of every run of this chain.
    pub fn register_event_listener(&self, listener: Arc<dyn ChainEventListener>) -> ListenerId {
        self.bus.register(listener)
    }

    /// Register a listener for one event kind.
    pub fn register_listener_for(
        &self,
        kind: EventKind,
        listener: Arc<dyn ChainEventListener>,
    ) -> ListenerId {
        self.bus.register_for(kind, listener)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.bus.remove(id)
    }

    /// Async tap receiving every event published after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.bus.subscribe()
    }

    /// Publish an event to this chain's listeners on behalf of `run`.
    pub fn notify_event(&self, event: &ChainEvent, run: &RunControl) {
        self.bus.publish(event, run);
    }

    // -----------------------------------------------------------------------
    // Running
    // -----------------------------------------------------------------------

    /// Run with `params` seeded into a fresh memory and return the full report.
    pub async fn run(&self, params: HashMap<String, Value>) -> Result<RunReport, ChainError> {
        let input: Map<String, Value> = params.into_iter().collect();
        self.run_value(Value::Object(input)).await
    }

    /// Run with an arbitrary JSON input. Object inputs are seeded into memory.
    pub async fn run_value(&self, input: Value) -> Result<RunReport, ChainError> {
        self.run_with_token(input, CancellationToken::new()).await
    }

    /// Run under a caller-owned cancellation token.
    ///
    /// Cancelling the token stops the run normally at the next stop check.
    pub async fn run_with_token(
        &self,
        input: Value,
        token: CancellationToken,
    ) -> Result<RunReport, ChainError> {
        let memory = Memory::new();
        if let Value::Object(map) = &input {
            memory.put_all(map.clone());
        }
        let control = RunControl::with_token(&self.id, self.id_generator.generate(), memory, token);
        let started_at = Utc::now();

        let span = tracing::info_span!("chain_run", chain_id = %self.id, run_id = %control.run_id());
        let route = executor::EventRoute::root(&self.bus, &control);
        let result = executor::execute(self, &route, input).instrument(span).await?;

        Ok(RunReport {
            chain_id: self.id.clone(),
            run_id: control.run_id().to_string(),
            status: control.status(),
            message: control.message(),
            result,
            memory: control.memory().clone(),
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Run and return the result as a map.
    ///
    /// An object result is returned as-is; any other value (including a
    /// `Multi`, as an array) is returned under [`RESULT_KEY`].
    pub async fn execute_for_result(
        &self,
        params: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, ChainError> {
        let report = self.run(params).await?;
        Ok(match report.result.into_value() {
            Value::Object(map) => map.into_iter().collect(),
            other => HashMap::from([(RESULT_KEY.to_string(), other)]),
        })
    }

    /// Run and return the result as a single JSON value.
    pub async fn execute(&self, params: HashMap<String, Value>) -> Result<Value, ChainError> {
        Ok(self.run(params).await?.result.into_value())
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("id", &self.id)
            .field("nodes", &self.node_ids().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .field("node_conditions", &self.node_conditions)
            .field("entry", &self.entry)
            .field("bus", &self.bus)
            .finish()
    }
}

/// A chain is a node: it runs as one step of its parent.
///
/// The nested run gets its own run id and a memory that reads through to the
/// parent's (unless inheritance is disabled). Writes stay in the nested scope;
/// the nested result becomes this node's result. Nested events reach this
/// chain's listeners first and then the parent's.
impl Node for Chain {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, input: Value, ctx: &NodeContext<'_>) -> Result<NodeResult, NodeError> {
        let memory = if self.inherit_parent_memory {
            Memory::child(ctx.memory())
        } else {
            Memory::new()
        };
        if let Value::Object(map) = &input {
            memory.put_all(map.clone());
        }

        let control = RunControl::with_token(
            &self.id,
            self.id_generator.generate(),
            memory,
            ctx.control().token().child_token(),
        );
        tracing::debug!(
            chain_id = %self.id,
            parent_run_id = ctx.control().run_id(),
            run_id = control.run_id(),
            "running nested chain"
        );

        let route = executor::EventRoute::nested(&self.bus, &control, ctx.route());
        executor::execute(self, &route, input)
            .await
            .map_err(|e| NodeError::Chain(Box::new(e)))
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Outcome of a successful (or normally stopped) run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub chain_id: String,
    pub run_id: String,
    pub status: ChainStatus,
    /// Reason given to the winning stop request, if any.
    pub message: Option<String>,
    pub result: NodeResult,
    /// The run's memory after the last node.
    pub memory: Memory,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Successful executions of `node_id` during this run.
    pub fn exec_count(&self, node_id: &str) -> u64 {
        self.memory.exec_count(node_id)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
