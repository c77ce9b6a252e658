//! Routing node.
//!
//! A `RouterNode` owns child nodes and a routing function that picks child ids
//! from the input and memory. Selected children run as steps of the current
//! run through [`NodeContext::run_child`], so each publishes its own events and
//! keeps its own execution counter.

use std::collections::HashMap;

use flexchain_types::definition::MultiMatchStrategy;
use flexchain_types::error::{GraphDefinitionError, NodeError};
use flexchain_types::result::NodeResult;
use serde_json::Value;

use crate::chain::{Node, NodeContext, NodeDyn};
use crate::memory::Memory;

type RouteFn = dyn Fn(&Value, &Memory) -> Result<Vec<String>, NodeError> + Send + Sync;

pub struct RouterNode {
    id: String,
    strategy: MultiMatchStrategy,
    children: Vec<Box<dyn NodeDyn>>,
    index: HashMap<String, usize>,
    route: Box<RouteFn>,
}

impl RouterNode {
    /// `route` returns the ids of matching children, in priority order.
    pub fn new<F>(id: impl Into<String>, route: F) -> Self
    where
        F: Fn(&Value, &Memory) -> Result<Vec<String>, NodeError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            strategy: MultiMatchStrategy::First,
            children: Vec::new(),
            index: HashMap::new(),
            route: Box::new(route),
        }
    }

    pub fn with_strategy(mut self, strategy: MultiMatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> MultiMatchStrategy {
        self.strategy
    }

    pub fn add_child<N: Node + 'static>(&mut self, node: N) -> Result<(), GraphDefinitionError> {
        self.add_boxed_child(Box::new(node))
    }

    pub fn add_boxed_child(&mut self, node: Box<dyn NodeDyn>) -> Result<(), GraphDefinitionError> {
        let id = node.id().to_string();
        if self.index.contains_key(&id) {
            return Err(GraphDefinitionError::DuplicateNodeId(id));
        }
        self.index.insert(id, self.children.len());
        self.children.push(node);
        Ok(())
    }

    pub fn child_ids(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|c| c.id())
    }

    fn select(&self, matched: Vec<String>) -> Vec<String> {
        match self.strategy {
            MultiMatchStrategy::First => matched.into_iter().take(1).collect(),
            MultiMatchStrategy::Last => matched.into_iter().last().into_iter().collect(),
            MultiMatchStrategy::All => matched,
        }
    }
}

impl Node for RouterNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, input: Value, ctx: &NodeContext<'_>) -> Result<NodeResult, NodeError> {
        let matched = (self.route)(&input, ctx.memory())?;
        let selected = self.select(matched);

        tracing::debug!(
            node_id = %self.id,
            strategy = ?self.strategy,
            selected = ?selected,
            "router selected children"
        );

        let mut results = Vec::with_capacity(selected.len());
        for child_id in &selected {
            let child = self
                .index
                .get(child_id)
                .map(|&i| self.children[i].as_ref())
                .ok_or_else(|| {
                    NodeError::InvalidInput(format!(
                        "router '{}' selected unknown node '{child_id}'",
                        self.id
                    ))
                })?;
            results.push(ctx.run_child(child, input.clone()).await?);
        }

        Ok(match results.len() {
            0 => NodeResult::default(),
            1 if self.strategy != MultiMatchStrategy::All => results.remove(0),
            _ => NodeResult::of_results(results),
        })
    }
}

impl std::fmt::Debug for RouterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterNode")
            .field("id", &self.id)
            .field("strategy", &self.strategy)
            .field("children", &self.child_ids().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
