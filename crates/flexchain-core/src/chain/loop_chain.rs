//! Looping chains.
//!
//! A `LoopChain` is a sequential chain with an implicit start node in front.
//! [`LoopChain::close`] wires the last node back to the first user node, so the
//! start node runs once and the rest repeats until a node stops the run or the
//! [`LoopGuard`] trips. Nodes added after closing join the loop body: the
//! back-edge moves to leave the new last node.

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use flexchain_types::config::EngineConfig;
use flexchain_types::error::{GraphDefinitionError, NodeError};
use flexchain_types::event::EventKind;
use flexchain_types::result::NodeResult;
use serde_json::Value;

use super::guard::LoopGuard;
use super::{Chain, Condition, Edge, Node, NodeContext, NodeDyn, SequentialChain};
use crate::nodes::StartNode;

/// Id of the implicit start node.
pub const LOOP_START_NODE_ID: &str = "loop-start";

#[derive(Debug)]
pub struct LoopChain {
    inner: SequentialChain,
    guard: LoopGuard,
    /// Index of the back-edge in the chain's edge list, once closed.
    back_edge: Option<usize>,
}

impl LoopChain {
    /// Unbounded loop chain.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, &EngineConfig::default())
    }

    /// Loop chain using `config.max_loop_count` as its initial limit.
    pub fn with_config(id: impl Into<String>, config: &EngineConfig) -> Self {
        let mut inner = SequentialChain::with_config(id, config);
        inner
            .chain_mut()
            .insert_node(Box::new(StartNode::new(LOOP_START_NODE_ID)));

        let guard = LoopGuard::new();
        guard.set_max_loop_count(config.max_loop_count);
        inner.register_listener_for(EventKind::NodeFinished, Arc::new(guard.clone()));

        Self {
            inner,
            guard,
            back_edge: None,
        }
    }

    /// Append a node to the loop body.
    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> Result<(), GraphDefinitionError> {
        self.add_boxed_node(Box::new(node))
    }

    pub fn add_boxed_node(&mut self, node: Box<dyn NodeDyn>) -> Result<(), GraphDefinitionError> {
        let Some(back_edge) = self.back_edge.take() else {
            return self.inner.add_boxed_node(node);
        };

        self.inner.chain_mut().edges.remove(back_edge);
        let added = self.inner.add_boxed_node(node);
        self.close();
        tracing::debug!(
            chain_id = Node::id(&self.inner),
            "loop back-edge moved to the new last node"
        );
        added
    }

    /// See [`Chain::set_node_condition`].
    pub fn set_node_condition(&mut self, node_id: impl Into<String>, condition: Condition) {
        self.inner.set_node_condition(node_id, condition);
    }

    /// Limit for every node's execution count; `None` removes it.
    pub fn set_max_loop_count(&self, max: Option<u64>) {
        self.guard.set_max_loop_count(max);
    }

    pub fn max_loop_count(&self) -> Option<u64> {
        self.guard.max_loop_count()
    }

    /// Add the back-edge from the last node to the first body node.
    ///
    /// No-op with fewer than two nodes (start node included) and on repeated
    /// calls.
    pub fn close(&mut self) {
        if self.back_edge.is_some() || self.inner.len() < 2 {
            return;
        }
        let chain = self.inner.chain_mut();
        let last = chain.nodes[chain.nodes.len() - 1].id().to_string();
        let first_body = chain.nodes[1].id().to_string();
        self.back_edge = Some(chain.edges.len());
        chain.add_edge(Edge::always(last, first_body));
    }

    pub fn is_closed(&self) -> bool {
        self.back_edge.is_some()
    }

    pub fn into_chain(self) -> Chain {
        self.inner.into_chain()
    }
}

impl Deref for LoopChain {
    type Target = Chain;

    fn deref(&self) -> &Chain {
        &self.inner
    }
}

impl Node for LoopChain {
    fn id(&self) -> &str {
        Node::id(&self.inner)
    }

    fn invoke(
        &self,
        input: Value,
        ctx: &NodeContext<'_>,
    ) -> impl Future<Output = Result<NodeResult, NodeError>> + Send {
        Node::invoke(&*self.inner, input, ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use flexchain_types::status::ChainStatus;
    use serde_json::json;

    use super::*;
    use crate::nodes::FnNode;

    fn counter() -> FnNode {
        FnNode::new("counter", |_, ctx| {
            let n = ctx.node_memory().exec_count() + 1;
            Ok(NodeResult::single(json!({ "count": n })))
        })
    }

    #[test]
    fn close_with_only_start_node_is_noop() {
        let mut chain = LoopChain::new("loop");
        chain.close();
        assert!(!chain.is_closed());
        assert!(chain.edges().is_empty());
    }

    #[test]
    fn close_targets_first_body_node_once() {
        let mut chain = LoopChain::new("loop");
        chain.add_node(counter()).unwrap();
        chain
            .add_node(FnNode::new("tail", |input, _| Ok(NodeResult::Single(input))))
            .unwrap();
        chain.close();
        chain.close();

        let edges: Vec<(&str, &str)> = chain
            .edges()
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect();
        assert_eq!(
            edges,
            vec![("loop-start", "counter"), ("counter", "tail"), ("tail", "counter")]
        );
    }

    fn edge_pairs(chain: &LoopChain) -> Vec<(&str, &str)> {
        chain
            .edges()
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn node_added_after_close_joins_the_loop() {
        let mut chain = LoopChain::new("loop");
        chain.add_node(counter()).unwrap();
        chain.close();
        chain
            .add_node(FnNode::new("late", |input, _| Ok(NodeResult::Single(input))))
            .unwrap();

        assert!(chain.is_closed());
        assert_eq!(
            edge_pairs(&chain),
            vec![("loop-start", "counter"), ("counter", "late"), ("late", "counter")]
        );

        chain.set_max_loop_count(Some(2));
        let report = chain.run(HashMap::new()).await.unwrap();
        assert_eq!(report.exec_count("counter"), 3);
        assert_eq!(report.exec_count("late"), 2);
    }

    #[test]
    fn duplicate_after_close_keeps_back_edge() {
        let mut chain = LoopChain::new("loop");
        chain.add_node(counter()).unwrap();
        chain.close();

        let err = chain.add_node(counter()).unwrap_err();
        assert_eq!(err, GraphDefinitionError::DuplicateNodeId("counter".into()));
        assert!(chain.is_closed());
        assert_eq!(
            edge_pairs(&chain),
            vec![("loop-start", "counter"), ("counter", "counter")]
        );
    }

    #[test]
    fn start_node_is_always_first() {
        let chain = LoopChain::new("loop");
        assert_eq!(chain.node_ids().collect::<Vec<_>>(), vec![LOOP_START_NODE_ID]);
        assert!(chain.edges().is_empty());
    }

    #[tokio::test]
    async fn max_loop_count_stops_normally() {
        let mut chain = LoopChain::new("loop");
        chain.add_node(counter()).unwrap();
        chain.set_max_loop_count(Some(3));
        chain.close();

        let report = chain.run(HashMap::new()).await.unwrap();

        assert_eq!(report.status, ChainStatus::StoppedNormal);
        assert_eq!(report.exec_count("counter"), 4);
        assert_eq!(report.exec_count(LOOP_START_NODE_ID), 1);
        assert!(report.message.unwrap().contains("loop limit"));
        assert_eq!(report.result.into_value(), json!({ "count": 4 }));
    }

    #[tokio::test]
    async fn config_limit_applies() {
        let config = EngineConfig {
            max_loop_count: Some(1),
            ..EngineConfig::default()
        };
        let mut chain = LoopChain::with_config("loop", &config);
        assert_eq!(chain.max_loop_count(), Some(1));
        chain.add_node(counter()).unwrap();
        chain
            .add_node(FnNode::new("echo", |input, _| Ok(NodeResult::Single(input))))
            .unwrap();
        chain.close();

        let report = chain.run(HashMap::new()).await.unwrap();
        assert_eq!(report.exec_count("counter"), 2);
        assert_eq!(report.exec_count("echo"), 1);
        assert_eq!(report.status, ChainStatus::StoppedNormal);
    }

    #[tokio::test]
    async fn node_can_end_loop_before_limit() {
        let mut chain = LoopChain::new("loop");
        chain
            .add_node(FnNode::new("until-three", |_, ctx| {
                let n = ctx.node_memory().exec_count() + 1;
                if n == 3 {
                    ctx.control().stop_normal("reached three");
                }
                Ok(NodeResult::single(n))
            }))
            .unwrap();
        chain.close();

        let report = chain.run(HashMap::new()).await.unwrap();
        assert_eq!(report.exec_count("until-three"), 3);
        assert_eq!(report.message.as_deref(), Some("reached three"));
        assert_eq!(report.result, NodeResult::single(3));
    }

    #[tokio::test]
    async fn unclosed_loop_runs_once() {
        let mut chain = LoopChain::new("loop");
        chain.add_node(counter()).unwrap();
        let report = chain.run(HashMap::new()).await.unwrap();
        assert_eq!(report.exec_count("counter"), 1);
        assert_eq!(report.message, None);
    }
}
