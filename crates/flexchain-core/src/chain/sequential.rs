//! Linear chains.

use std::future::Future;
use std::ops::Deref;

use flexchain_types::config::EngineConfig;
use flexchain_types::error::{GraphDefinitionError, NodeError};
use flexchain_types::result::NodeResult;
use serde_json::Value;

use super::{Chain, Condition, Edge, Node, NodeContext, NodeDyn};

/// A chain whose nodes run in the order they were added.
///
/// Each added node is wired to its predecessor with an unconditional edge.
/// Read access to the underlying [`Chain`] (listeners, `run`,
/// `execute_for_result`, ...) goes through `Deref`; arbitrary edges cannot be
/// added.
#[derive(Debug)]
pub struct SequentialChain {
    chain: Chain,
}

impl SequentialChain {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            chain: Chain::new(id),
        }
    }

    pub fn with_config(id: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            chain: Chain::with_config(id, config),
        }
    }

    /// Append a node after the current last node.
    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> Result<(), GraphDefinitionError> {
        self.add_boxed_node(Box::new(node))
    }

    pub fn add_boxed_node(&mut self, node: Box<dyn NodeDyn>) -> Result<(), GraphDefinitionError> {
        let previous = self.chain.nodes.last().map(|n| n.id().to_string());
        let id = node.id().to_string();
        self.chain.add_boxed_node(node)?;
        if let Some(previous) = previous {
            self.chain.add_edge(Edge::always(previous, id));
        }
        Ok(())
    }

    /// See [`Chain::set_node_condition`].
    pub fn set_node_condition(&mut self, node_id: impl Into<String>, condition: Condition) {
        self.chain.set_node_condition(node_id, condition);
    }

    /// Mutable access for settings that don't touch the node order.
    pub(crate) fn chain_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }

    pub fn into_chain(self) -> Chain {
        self.chain
    }
}

impl Deref for SequentialChain {
    type Target = Chain;

    fn deref(&self) -> &Chain {
        &self.chain
    }
}

impl Node for SequentialChain {
    fn id(&self) -> &str {
        self.chain.id()
    }

    fn invoke(
        &self,
        input: Value,
        ctx: &NodeContext<'_>,
    ) -> impl Future<Output = Result<NodeResult, NodeError>> + Send {
        Node::invoke(&self.chain, input, ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::nodes::FnNode;

    fn recording(id: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> FnNode {
        FnNode::new(id, move |input, _| {
            log.lock().unwrap().push(id);
            Ok(NodeResult::Single(input))
        })
    }

    #[test]
    fn add_node_wires_predecessor() {
        let mut chain = SequentialChain::new("seq");
        let log = Arc::new(Mutex::new(Vec::new()));
        chain.add_node(recording("a", log.clone())).unwrap();
        chain.add_node(recording("b", log.clone())).unwrap();
        chain.add_node(recording("c", log)).unwrap();

        let edges: Vec<(&str, &str)> = chain
            .edges()
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect();
        assert_eq!(edges, vec![("a", "b"), ("b", "c")]);
    }

    #[test]
    fn duplicate_id_rejected_without_adding_edge() {
        let mut chain = SequentialChain::new("seq");
        let log = Arc::new(Mutex::new(Vec::new()));
        chain.add_node(recording("a", log.clone())).unwrap();
        let err = chain.add_node(recording("a", log)).unwrap_err();
        assert_eq!(err, GraphDefinitionError::DuplicateNodeId("a".into()));
        assert!(chain.edges().is_empty());
    }

    #[tokio::test]
    async fn runs_in_addition_order() {
        let mut chain = SequentialChain::new("seq");
        let log = Arc::new(Mutex::new(Vec::new()));
        for id in ["first", "second", "third", "fourth"] {
            chain.add_node(recording(id, log.clone())).unwrap();
        }

        let result = chain
            .execute(HashMap::from([("seed".to_string(), json!(1))]))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first", "second", "third", "fourth"]
        );
        assert_eq!(result, json!({ "seed": 1 }));
    }
}
