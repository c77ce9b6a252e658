//! Chain executor: single-task traversal of a chain's graph.
//!
//! # Execution flow
//!
//! 1. Mark the run `Running` and publish `ChainStarted`.
//! 2. Seed a FIFO queue with the start nodes, each receiving the run input.
//! 3. For each queued node: stop check -> node condition (a false condition
//!    passes the incoming value along the node's first matching edge without
//!    invoking it) -> `NodeExecuteBefore` -> stop check -> invoke -> record ->
//!    `InvokeAfter` -> `NodeFinished` -> stop check -> resolve the first
//!    matching outgoing edge (or record a terminal output).
//! 4. On failure publish `Error` once and stop with an error, unless a listener
//!    downgraded the run to a normal stop while handling it.
//! 5. Aggregate terminal outputs, publish `ChainFinished`.
//!
//! A run that stops early keeps the results still waiting in the queue: they
//! join the terminal outputs after the ones already recorded.
//!
//! Events go to the chain's own listeners first, then bubble up through every
//! enclosing chain when the chain runs as a nested node.
//!
//! Nodes of one run never interleave; the only suspension points are inside
//! node invocations.

use std::collections::VecDeque;

use flexchain_types::definition::InputMode;
use flexchain_types::error::{ChainError, GraphDefinitionError};
use flexchain_types::event::ChainEvent;
use flexchain_types::result::NodeResult;
use flexchain_types::status::ChainStatus;
use serde_json::Value;

use super::Chain;
use super::control::RunControl;
use super::node::NodeContext;
use crate::event::EventBus;
use crate::memory::{LAST_RESULT_KEY, Memory};

/// Stop reason recorded when a run's token is cancelled from outside.
pub const CANCELLED_REASON: &str = "run cancelled";

// ---------------------------------------------------------------------------
// Event routing
// ---------------------------------------------------------------------------

/// Where a run's events go: its own chain's listeners, then those of every
/// enclosing run, innermost first. Each bus sees its own run's control.
pub(crate) struct EventRoute<'a> {
    bus: &'a EventBus,
    control: &'a RunControl,
    parent: Option<&'a EventRoute<'a>>,
}

impl<'a> EventRoute<'a> {
    pub(crate) fn root(bus: &'a EventBus, control: &'a RunControl) -> Self {
        Self {
            bus,
            control,
            parent: None,
        }
    }

    pub(crate) fn nested(bus: &'a EventBus, control: &'a RunControl, parent: &'a EventRoute<'a>) -> Self {
        Self {
            bus,
            control,
            parent: Some(parent),
        }
    }

    pub(crate) fn control(&self) -> &'a RunControl {
        self.control
    }

    pub(crate) fn publish(&self, event: &ChainEvent) {
        self.bus.publish(event, self.control);
        if let Some(parent) = self.parent {
            parent.publish(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Event constructors
// ---------------------------------------------------------------------------

pub(crate) fn before_event(control: &RunControl, node_id: &str) -> ChainEvent {
    ChainEvent::NodeExecuteBefore {
        chain_id: control.chain_id().to_string(),
        run_id: control.run_id().to_string(),
        node_id: node_id.to_string(),
    }
}

pub(crate) fn after_event(control: &RunControl, node_id: &str, result: &NodeResult) -> ChainEvent {
    ChainEvent::InvokeAfter {
        chain_id: control.chain_id().to_string(),
        run_id: control.run_id().to_string(),
        node_id: node_id.to_string(),
        result: result.to_value(),
    }
}

pub(crate) fn finished_event(control: &RunControl, node_id: &str, exec_count: u64) -> ChainEvent {
    ChainEvent::NodeFinished {
        chain_id: control.chain_id().to_string(),
        run_id: control.run_id().to_string(),
        node_id: node_id.to_string(),
        exec_count,
    }
}

fn error_event(control: &RunControl, node_id: Option<&str>, error: &ChainError) -> ChainEvent {
    let error = match error {
        // the node id is already carried by the event
        ChainError::NodeInvocation { source, .. } => source.to_string(),
        other => other.to_string(),
    };
    ChainEvent::Error {
        chain_id: control.chain_id().to_string(),
        run_id: control.run_id().to_string(),
        node_id: node_id.map(str::to_string),
        error,
    }
}

// ---------------------------------------------------------------------------
// Bookkeeping
// ---------------------------------------------------------------------------

/// Record a successful invocation: bump `_exec_count`, merge object results
/// into memory and store the last result. Returns the new execution count.
pub(crate) fn record_success(control: &RunControl, node_id: &str, result: &NodeResult) -> u64 {
    let memory = control.memory();
    let exec_count = memory.node_memory(node_id).increment_exec_count();
    if let NodeResult::Single(Value::Object(map)) = result {
        memory.put_all(map.clone());
    }
    memory.set(LAST_RESULT_KEY, result.to_value());
    exec_count
}

fn stop_requested(control: &RunControl) -> bool {
    if control.token().is_cancelled() && !control.is_stopped() {
        control.stop_normal(CANCELLED_REASON);
    }
    control.is_stopped()
}

/// Publish `Error` and stop the run with an error.
///
/// Returns `None` when a listener downgraded the run to a normal stop while
/// handling the event, in which case the run ends with its partial results.
fn fail(route: &EventRoute<'_>, node_id: Option<&str>, error: ChainError) -> Option<ChainError> {
    let control = route.control();
    tracing::debug!(
        chain_id = control.chain_id(),
        run_id = control.run_id(),
        node_id = node_id.unwrap_or("-"),
        error = %error,
        "chain run failed"
    );
    route.publish(&error_event(control, node_id, &error));
    control.stop_error(error.to_string());

    if control.status() == ChainStatus::StoppedNormal {
        tracing::info!(
            chain_id = control.chain_id(),
            run_id = control.run_id(),
            reason = control.message().as_deref().unwrap_or(""),
            "failure downgraded to normal stop by listener"
        );
        None
    } else {
        Some(error)
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Value travelling to a queued node.
#[derive(Debug)]
enum Incoming {
    /// Start nodes receive the run input.
    RunInput,
    /// Output of the node the edge leaves from.
    Predecessor(NodeResult),
}

impl Incoming {
    fn to_value(&self, run_input: &Value) -> Value {
        match self {
            Incoming::RunInput => run_input.clone(),
            Incoming::Predecessor(result) => result.to_value(),
        }
    }

    fn into_result(self) -> Option<NodeResult> {
        match self {
            Incoming::RunInput => None,
            Incoming::Predecessor(result) => Some(result),
        }
    }
}

#[derive(Debug)]
struct Pending {
    index: usize,
    incoming: Incoming,
    /// Skipped nodes passed on the way here since the last invocation.
    skipped: usize,
}

impl Pending {
    fn start(index: usize) -> Self {
        Self {
            index,
            incoming: Incoming::RunInput,
            skipped: 0,
        }
    }

    fn after(index: usize, result: NodeResult) -> Self {
        Self {
            index,
            incoming: Incoming::Predecessor(result),
            skipped: 0,
        }
    }
}

/// Move results that never reached their next node into the terminals:
/// `current` first, then the queue in order.
fn fold_pending(terminals: &mut Vec<NodeResult>, current: Option<Pending>, queue: VecDeque<Pending>) {
    terminals.extend(
        current
            .into_iter()
            .chain(queue)
            .filter_map(|pending| pending.incoming.into_result()),
    );
}

/// Outcome of a run that hit a failure. A downgraded failure keeps every
/// result gathered so far, including the ones still queued.
fn settle(
    failure: Option<ChainError>,
    mut terminals: Vec<NodeResult>,
    current: Option<Pending>,
    queue: VecDeque<Pending>,
) -> Result<Vec<NodeResult>, ChainError> {
    match failure {
        Some(err) => Err(err),
        None => {
            fold_pending(&mut terminals, current, queue);
            Ok(terminals)
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Drive one run of `chain` to completion.
pub(crate) async fn execute(chain: &Chain, route: &EventRoute<'_>, input: Value) -> Result<NodeResult, ChainError> {
    let control = route.control();
    control.begin();
    route.publish(&ChainEvent::ChainStarted {
        chain_id: control.chain_id().to_string(),
        run_id: control.run_id().to_string(),
    });
    tracing::info!(
        chain_id = control.chain_id(),
        run_id = control.run_id(),
        nodes = chain.nodes.len(),
        "chain run started"
    );

    let outcome = match traverse(chain, route, input).await {
        Ok(terminals) => {
            control.finish();
            if control.status() == ChainStatus::StoppedError {
                Err(ChainError::StoppedError {
                    reason: control.message().unwrap_or_default(),
                    node_id: control.stopped_by(),
                })
            } else {
                Ok(aggregate(terminals))
            }
        }
        Err(e) => Err(e),
    };

    let status = control.status();
    let message = control.message();
    route.publish(&ChainEvent::ChainFinished {
        chain_id: control.chain_id().to_string(),
        run_id: control.run_id().to_string(),
        status,
        message: message.clone(),
    });
    tracing::info!(
        chain_id = control.chain_id(),
        run_id = control.run_id(),
        status = %status,
        message = message.as_deref().unwrap_or(""),
        "chain run finished"
    );

    outcome
}

/// One terminal output passes through unchanged; several are merged.
fn aggregate(mut terminals: Vec<NodeResult>) -> NodeResult {
    match terminals.len() {
        0 => NodeResult::default(),
        1 => terminals.remove(0),
        _ => NodeResult::of_results(terminals),
    }
}

async fn traverse(chain: &Chain, route: &EventRoute<'_>, input: Value) -> Result<Vec<NodeResult>, ChainError> {
    let control = route.control();
    let mut terminals = Vec::new();

    let starts = match chain.start_nodes() {
        Ok(starts) => starts,
        Err(e) => return settle(fail(route, None, e.into()), terminals, None, VecDeque::new()),
    };

    let mut queue: VecDeque<Pending> = starts.into_iter().map(Pending::start).collect();

    while let Some(pending) = queue.pop_front() {
        if stop_requested(control) {
            fold_pending(&mut terminals, Some(pending), queue);
            break;
        }

        let node = chain.nodes[pending.index].as_ref();
        let node_id = node.id();

        match chain.node_condition_holds(node_id, control.memory()) {
            Ok(true) => {}
            Ok(false) => {
                let next = match chain.next_node(node_id, control.memory()) {
                    Ok(next) => next,
                    Err(error) => {
                        return settle(fail(route, Some(node_id), error), terminals, Some(pending), queue);
                    }
                };
                skip_node(chain, control, pending, next, &mut queue, &mut terminals);
                continue;
            }
            Err(error) => {
                return settle(fail(route, Some(node_id), error), terminals, Some(pending), queue);
            }
        }

        route.publish(&before_event(control, node_id));
        if stop_requested(control) {
            fold_pending(&mut terminals, Some(pending), queue);
            break;
        }

        let node_input = match node.input_mode() {
            InputMode::Memory => control.memory().snapshot_value(),
            InputMode::Previous => pending.incoming.to_value(&input),
        };

        tracing::debug!(
            chain_id = control.chain_id(),
            run_id = control.run_id(),
            node_id,
            "invoking node"
        );
        let ctx = NodeContext::new(node_id, route);
        let previous = control.enter_node(node_id);
        let outcome = node.invoke_boxed(node_input, &ctx).await;
        control.leave_node(previous);

        let result = match outcome {
            Ok(result) => result,
            Err(source) => {
                let error = ChainError::NodeInvocation {
                    node_id: node_id.to_string(),
                    source,
                };
                return settle(fail(route, Some(node_id), error), terminals, Some(pending), queue);
            }
        };

        let exec_count = record_success(control, node_id, &result);
        route.publish(&after_event(control, node_id, &result));
        route.publish(&finished_event(control, node_id, exec_count));

        if stop_requested(control) {
            terminals.push(result);
            fold_pending(&mut terminals, None, queue);
            break;
        }

        match chain.next_node(node_id, control.memory()) {
            Ok(Some(next)) => {
                tracing::debug!(
                    chain_id = control.chain_id(),
                    run_id = control.run_id(),
                    from = node_id,
                    to = chain.nodes[next].id(),
                    "following edge"
                );
                queue.push_back(Pending::after(next, result));
            }
            Ok(None) => {
                tracing::debug!(
                    chain_id = control.chain_id(),
                    run_id = control.run_id(),
                    node_id,
                    "no matching edge, path halted"
                );
                terminals.push(result);
            }
            Err(error) => {
                terminals.push(result);
                return settle(fail(route, Some(node_id), error), terminals, None, queue);
            }
        }
    }

    Ok(terminals)
}

/// Pass a skipped node's incoming value on to `next`, or record it as a
/// terminal output when the path ends here. A path that keeps landing on
/// skipped nodes, longer than the chain itself, is halted.
fn skip_node(
    chain: &Chain,
    control: &RunControl,
    pending: Pending,
    next: Option<usize>,
    queue: &mut VecDeque<Pending>,
    terminals: &mut Vec<NodeResult>,
) {
    let node_id = chain.nodes[pending.index].id();
    tracing::debug!(
        chain_id = control.chain_id(),
        run_id = control.run_id(),
        node_id,
        "node condition not met, skipping node"
    );

    match next {
        Some(next) if pending.skipped < chain.nodes.len() => queue.push_back(Pending {
            index: next,
            incoming: pending.incoming,
            skipped: pending.skipped + 1,
        }),
        Some(_) => {
            tracing::warn!(
                chain_id = control.chain_id(),
                run_id = control.run_id(),
                node_id,
                "path only reaches skipped nodes, path halted"
            );
            terminals.extend(pending.incoming.into_result());
        }
        None => terminals.extend(pending.incoming.into_result()),
    }
}

impl Chain {
    /// Index of the start nodes for a run.
    ///
    /// An explicit entry wins. Otherwise every node without an inbound edge
    /// starts, in insertion order; a graph where every node has an inbound
    /// edge starts at its first node.
    pub fn start_nodes(&self) -> Result<Vec<usize>, GraphDefinitionError> {
        if self.nodes.is_empty() {
            return Err(GraphDefinitionError::EmptyChain);
        }

        if let Some(entry) = &self.entry {
            return self
                .index
                .get(entry)
                .map(|&i| vec![i])
                .ok_or_else(|| GraphDefinitionError::UnknownEntry(entry.clone()));
        }

        let starts: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !self.edges.iter().any(|e| e.to == n.id()))
            .map(|(i, _)| i)
            .collect();

        if starts.is_empty() { Ok(vec![0]) } else { Ok(starts) }
    }

    /// Whether `node_id` should run. Nodes without a condition always do.
    pub(crate) fn node_condition_holds(&self, node_id: &str, memory: &Memory) -> Result<bool, ChainError> {
        let Some(condition) = self.node_conditions.get(node_id) else {
            return Ok(true);
        };
        condition
            .check(self.evaluator.as_ref(), memory)
            .map_err(|e| ChainError::NodeCondition {
                node_id: node_id.to_string(),
                message: e.to_string(),
            })
    }

    /// First outgoing edge of `node_id` whose condition holds, in registration
    /// order. `None` when the node has no edges or none match.
    pub(crate) fn next_node(&self, node_id: &str, memory: &Memory) -> Result<Option<usize>, ChainError> {
        for edge in self.edges.iter().filter(|e| e.from == node_id) {
            let taken = match &edge.condition {
                None => true,
                Some(condition) => condition
                    .check(self.evaluator.as_ref(), memory)
                    .map_err(|e| ChainError::Condition {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        message: e.to_string(),
                    })?,
            };

            if taken {
                return self
                    .index
                    .get(&edge.to)
                    .map(|&i| Some(i))
                    .ok_or_else(|| {
                        GraphDefinitionError::UnknownNode {
                            referenced_by: edge.from.clone(),
                            node_id: edge.to.clone(),
                        }
                        .into()
                    });
            }
        }
        Ok(None)
    }
}
