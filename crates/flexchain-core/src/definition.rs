//! Declarative chain definitions: parsing, validation and building.
//!
//! Converts YAML (or JSON, which YAML parses as well) files into the
//! `ChainDefinition` IR, validates structural constraints, reports unreachable
//! nodes and builds a runnable [`Chain`].

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use flexchain_types::config::EngineConfig;
use flexchain_types::definition::{ChainDefinition, ChainKind, InputMode, NodeConfig, NodeDefinition};
use flexchain_types::error::{GraphDefinitionError, NodeError};
use flexchain_types::result::NodeResult;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use serde_json::Value;
use thiserror::Error;

use crate::chain::{Chain, Condition, Edge, LoopChain, Node, NodeContext, NodeDyn, SequentialChain};
use crate::expression::{JexlEvaluator, value_to_bool};
use crate::nodes::{EndNode, ExprNode, RouterNode, SetNode, StartNode};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or building a chain definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Graph construction failure.
    #[error(transparent)]
    Graph(#[from] GraphDefinitionError),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `ChainDefinition`.
pub fn parse_chain_yaml(yaml: &str) -> Result<ChainDefinition, DefinitionError> {
    let def: ChainDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `ChainDefinition` to a YAML string.
pub fn serialize_chain_yaml(def: &ChainDefinition) -> Result<String, DefinitionError> {
    serde_yaml_ng::to_string(def).map_err(|e| DefinitionError::ParseError(e.to_string()))
}

/// Load and validate a chain definition file.
pub fn load_chain_file(path: &Path) -> Result<ChainDefinition, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    parse_chain_yaml(&content)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `ChainDefinition`.
///
/// Checks:
/// - Name is non-empty
/// - At least one node exists
/// - All node ids (router children included) are unique within the chain
/// - Edges are only declared on `graph` chains and reference known nodes
/// - The entry node, if set, exists
/// - `max_loop_count` is only set on `loop` chains
/// - Routers have at least one route
/// - Nested chains are valid themselves
pub fn validate_definition(def: &ChainDefinition) -> Result<(), DefinitionError> {
    if def.name.trim().is_empty() {
        return Err(DefinitionError::ValidationError(
            "chain name must not be empty".to_string(),
        ));
    }

    if def.nodes.is_empty() {
        return Err(DefinitionError::ValidationError(format!(
            "chain '{}' must have at least one node",
            def.name
        )));
    }

    let mut seen = HashSet::new();
    for node in &def.nodes {
        collect_ids(node, &mut seen)?;
    }

    let top_level: HashSet<&str> = def.nodes.iter().map(|n| n.id.as_str()).collect();

    if def.kind != ChainKind::Graph && !def.edges.is_empty() {
        return Err(DefinitionError::ValidationError(format!(
            "chain '{}' is {:?}; explicit edges are only allowed on graph chains",
            def.name, def.kind
        )));
    }

    for edge in &def.edges {
        for endpoint in [&edge.from, &edge.to] {
            if !top_level.contains(endpoint.as_str()) {
                return Err(GraphDefinitionError::UnknownNode {
                    referenced_by: edge.from.clone(),
                    node_id: endpoint.clone(),
                }
                .into());
            }
        }
    }

    if let Some(entry) = &def.entry {
        if !top_level.contains(entry.as_str()) {
            return Err(GraphDefinitionError::UnknownEntry(entry.clone()).into());
        }
    }

    if def.max_loop_count.is_some() && def.kind != ChainKind::Loop {
        return Err(DefinitionError::ValidationError(format!(
            "chain '{}': max_loop_count only applies to loop chains",
            def.name
        )));
    }

    for node in &def.nodes {
        validate_node(node)?;
    }

    Ok(())
}

fn collect_ids<'a>(node: &'a NodeDefinition, seen: &mut HashSet<&'a str>) -> Result<(), DefinitionError> {
    if node.id.trim().is_empty() {
        return Err(DefinitionError::ValidationError(
            "node id must not be empty".to_string(),
        ));
    }
    if !seen.insert(node.id.as_str()) {
        return Err(GraphDefinitionError::DuplicateNodeId(node.id.clone()).into());
    }
    if let NodeConfig::Router { routes, .. } = &node.config {
        for route in routes {
            collect_ids(&route.node, seen)?;
        }
    }
    Ok(())
}

fn validate_node(node: &NodeDefinition) -> Result<(), DefinitionError> {
    if node.when.as_deref().is_some_and(|w| w.trim().is_empty()) {
        return Err(DefinitionError::ValidationError(format!(
            "node '{}' has an empty `when`",
            node.id
        )));
    }

    match &node.config {
        NodeConfig::Router { routes, .. } => {
            if routes.is_empty() {
                return Err(DefinitionError::ValidationError(format!(
                    "router '{}' must have at least one route",
                    node.id
                )));
            }
            for route in routes {
                if route.node.when.is_some() {
                    return Err(DefinitionError::ValidationError(format!(
                        "route node '{}' in router '{}' cannot have its own `when`; guard the route instead",
                        route.node.id, node.id
                    )));
                }
                validate_node(&route.node)?;
            }
        }
        NodeConfig::Expr { expression, .. } if expression.trim().is_empty() => {
            return Err(DefinitionError::ValidationError(format!(
                "expr node '{}' has an empty expression",
                node.id
            )));
        }
        NodeConfig::Chain { definition } => validate_definition(definition)?,
        _ => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reachability
// ---------------------------------------------------------------------------

/// Top-level nodes no run can reach from the start nodes, in declaration order.
///
/// Sequential and loop chains reach every node by construction.
pub fn unreachable_nodes(def: &ChainDefinition) -> Vec<String> {
    if def.kind != ChainKind::Graph || def.nodes.is_empty() {
        return Vec::new();
    }

    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let indices: Vec<NodeIndex> = def.nodes.iter().map(|n| graph.add_node(n.id.as_str())).collect();
    let position = |id: &str| def.nodes.iter().position(|n| n.id == id);

    for edge in &def.edges {
        if let (Some(from), Some(to)) = (position(&edge.from), position(&edge.to)) {
            graph.add_edge(indices[from], indices[to], ());
        }
    }

    let starts: Vec<usize> = match def.entry.as_deref().and_then(position) {
        Some(entry) => vec![entry],
        None => {
            let roots: Vec<usize> = (0..def.nodes.len())
                .filter(|&i| !def.edges.iter().any(|e| e.to == def.nodes[i].id))
                .collect();
            if roots.is_empty() { vec![0] } else { roots }
        }
    };

    let mut reached = vec![false; def.nodes.len()];
    for start in starts {
        let mut bfs = Bfs::new(&graph, indices[start]);
        while let Some(visited) = bfs.next(&graph) {
            reached[visited.index()] = true;
        }
    }

    def.nodes
        .iter()
        .zip(reached)
        .filter(|(_, reached)| !reached)
        .map(|(n, _)| n.id.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Build a runnable chain from a validated definition.
pub fn build_chain(def: &ChainDefinition, config: &EngineConfig) -> Result<Chain, DefinitionError> {
    let evaluator = Arc::new(JexlEvaluator::new());
    build_chain_with_id(def, &def.name, config, &evaluator)
}

fn build_chain_with_id(
    def: &ChainDefinition,
    id: &str,
    config: &EngineConfig,
    evaluator: &Arc<JexlEvaluator>,
) -> Result<Chain, DefinitionError> {
    let mut nodes = Vec::with_capacity(def.nodes.len());
    for node in &def.nodes {
        nodes.push(build_node(node, config, evaluator)?);
    }

    let mut chain = match def.kind {
        ChainKind::Graph => {
            let mut chain = Chain::with_config(id, config);
            for node in nodes {
                chain.add_boxed_node(node)?;
            }
            for edge in &def.edges {
                chain.add_edge(match &edge.when {
                    Some(when) => Edge::when(&edge.from, &edge.to, when),
                    None => Edge::always(&edge.from, &edge.to),
                });
            }
            chain
        }
        ChainKind::Sequential => {
            let mut chain = SequentialChain::with_config(id, config);
            for node in nodes {
                chain.add_boxed_node(node)?;
            }
            chain.into_chain()
        }
        ChainKind::Loop => {
            let mut chain = LoopChain::with_config(id, config);
            chain.set_max_loop_count(def.max_loop_count.or(config.max_loop_count));
            for node in nodes {
                chain.add_boxed_node(node)?;
            }
            chain.close();
            chain.into_chain()
        }
    };

    if let Some(entry) = &def.entry {
        chain.set_entry(entry);
    }
    for node in &def.nodes {
        if let Some(when) = &node.when {
            chain.set_node_condition(&node.id, Condition::expression(when));
        }
    }

    let evaluator: Arc<dyn crate::expression::ConditionEvaluator> = evaluator.clone();
    Ok(chain.with_evaluator(evaluator))
}

fn build_node(
    def: &NodeDefinition,
    config: &EngineConfig,
    evaluator: &Arc<JexlEvaluator>,
) -> Result<Box<dyn NodeDyn>, DefinitionError> {
    let node: Box<dyn NodeDyn> = match &def.config {
        NodeConfig::Passthrough => Box::new(StartNode::new(&def.id)),
        NodeConfig::Set { values } => Box::new(SetNode::new(&def.id, values.clone())),
        NodeConfig::Expr { expression, key } => {
            let node = ExprNode::with_evaluator(&def.id, expression, evaluator.clone());
            match key {
                Some(key) => Box::new(node.storing_as(key)),
                None => Box::new(node),
            }
        }
        NodeConfig::End { normal, message } => {
            match (*normal, message.clone()) {
                (true, Some(message)) => Box::new(EndNode::new(&def.id).with_message(message)),
                (true, None) => Box::new(EndNode::new(&def.id)),
                (false, message) => Box::new(EndNode::error(
                    &def.id,
                    message.unwrap_or_else(|| format!("end node '{}' reached", def.id)),
                )),
            }
        }
        NodeConfig::Router { routes, strategy } => {
            let conditions: Vec<(Option<String>, String)> = routes
                .iter()
                .map(|r| (r.when.clone(), r.node.id.clone()))
                .collect();
            let eval = evaluator.clone();
            let mut router = RouterNode::new(&def.id, move |input, memory| {
                let mut matched = Vec::new();
                for (when, node_id) in &conditions {
                    let hit = match when {
                        None => true,
                        Some(expr) => eval
                            .evaluate_with_input(expr, memory, input)
                            .map(|v| value_to_bool(&v))
                            .map_err(|e| NodeError::Failed(format!("route '{node_id}': {e}")))?,
                    };
                    if hit {
                        matched.push(node_id.clone());
                    }
                }
                Ok(matched)
            })
            .with_strategy(*strategy);
            for route in routes {
                router.add_boxed_child(build_node(&route.node, config, evaluator)?)?;
            }
            Box::new(router)
        }
        NodeConfig::Chain { definition } => {
            Box::new(build_chain_with_id(definition, &def.id, config, evaluator)?)
        }
    };

    Ok(match def.input {
        InputMode::Previous => node,
        InputMode::Memory => Box::new(ReadingMemory { inner: node }),
    })
}

/// Gives any node a memory snapshot as input.
struct ReadingMemory {
    inner: Box<dyn NodeDyn>,
}

impl Node for ReadingMemory {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn input_mode(&self) -> InputMode {
        InputMode::Memory
    }

    fn invoke(
        &self,
        input: Value,
        ctx: &NodeContext<'_>,
    ) -> impl Future<Output = Result<NodeResult, NodeError>> + Send {
        async move { self.inner.invoke_boxed(input, ctx).await }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
