//! Declarative chain definitions.
//!
//! A `ChainDefinition` is the on-disk (YAML or JSON) description of a chain.
//! The loader in `flexchain-core` validates it and builds a runnable chain.
//!
//! ```yaml
//! name: double
//! kind: graph
//! nodes:
//!   - id: seed
//!     config:
//!       type: set
//!       values: { x: 1 }
//!   - id: double
//!     config:
//!       type: expr
//!       expression: "x * 2"
//!       key: doubled
//! edges:
//!   - from: seed
//!     to: double
//!     when: "x > 0"
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Chain Definition
// ---------------------------------------------------------------------------

/// Top-level chain definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDefinition {
    /// Chain id; also used as the node id when nested.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub kind: ChainKind,
    /// Explicit start node. Without it, start nodes are discovered from edges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    /// Loop limit for `kind: loop`. Falls back to the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_loop_count: Option<u64>,
    pub nodes: Vec<NodeDefinition>,
    /// Explicit edges; only valid for `kind: graph`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<EdgeDefinition>,
}

/// Shape of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    /// Arbitrary graph wired by explicit edges.
    #[default]
    Graph,
    /// Nodes run in declaration order.
    Sequential,
    /// Sequential with a back-edge to the first declared node.
    Loop,
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// How a node receives its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// The preceding node's result (or the run params for a start node).
    #[default]
    Previous,
    /// A snapshot of the run's memory.
    Memory,
}

/// Which routes a router follows when several match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiMatchStrategy {
    #[default]
    First,
    Last,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique within the enclosing chain.
    pub id: String,
    #[serde(default)]
    pub input: InputMode,
    /// Expression over memory; the node is skipped when it evaluates false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default)]
    pub config: NodeConfig,
}

/// Node-specific configuration, internally tagged by `type`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    /// Returns its input unchanged.
    #[default]
    Passthrough,
    /// Returns a fixed object, which the engine merges into memory.
    Set { values: Map<String, Value> },
    /// Evaluates an expression against memory (input bound as `input`).
    Expr {
        expression: String,
        /// Wrap the value as `{key: value}` so it lands in memory.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    /// Stops the chain, normally unless `normal: false`.
    End {
        #[serde(default = "default_true")]
        normal: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Runs the child nodes whose `when` holds.
    Router {
        routes: Vec<RouteDefinition>,
        #[serde(default)]
        strategy: MultiMatchStrategy,
    },
    /// A nested chain.
    Chain { definition: Box<ChainDefinition> },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    /// JEXL condition; an absent condition always matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    pub node: NodeDefinition,
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    /// JEXL condition evaluated against memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_definition_defaults() {
        let yaml = r#"
name: tiny
nodes:
  - id: a
"#;
        let def: ChainDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(def.name, "tiny");
        assert_eq!(def.kind, ChainKind::Graph);
        assert!(def.entry.is_none());
        assert!(def.edges.is_empty());
        assert_eq!(def.nodes[0].input, InputMode::Previous);
        assert_eq!(def.nodes[0].config, NodeConfig::Passthrough);
    }

    #[test]
    fn test_node_configs_parse() {
        let yaml = r#"
name: all-kinds
kind: graph
nodes:
  - id: seed
    config:
      type: set
      values:
        x: 1
  - id: calc
    input: memory
    config:
      type: expr
      expression: "x * 2"
      key: doubled
  - id: stop
    config:
      type: end
      message: finished
  - id: route
    config:
      type: router
      strategy: all
      routes:
        - when: "x > 0"
          node:
            id: positive
        - node:
            id: always
edges:
  - from: seed
    to: calc
    when: "x == 1"
"#;
        let def: ChainDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(def.nodes.len(), 4);
        assert_eq!(
            def.nodes[0].config,
            NodeConfig::Set {
                values: json!({ "x": 1 }).as_object().unwrap().clone()
            }
        );
        assert_eq!(def.nodes[1].input, InputMode::Memory);
        assert_eq!(
            def.nodes[1].config,
            NodeConfig::Expr {
                expression: "x * 2".into(),
                key: Some("doubled".into())
            }
        );
        assert_eq!(
            def.nodes[2].config,
            NodeConfig::End {
                normal: true,
                message: Some("finished".into())
            }
        );
        match &def.nodes[3].config {
            NodeConfig::Router { routes, strategy } => {
                assert_eq!(*strategy, MultiMatchStrategy::All);
                assert_eq!(routes.len(), 2);
                assert_eq!(routes[0].when.as_deref(), Some("x > 0"));
                assert!(routes[1].when.is_none());
            }
            other => panic!("expected router, got {other:?}"),
        }
        assert_eq!(def.edges[0].when.as_deref(), Some("x == 1"));
    }

    #[test]
    fn test_nested_chain_parses() {
        let yaml = r#"
name: parent
kind: sequential
nodes:
  - id: first
  - id: child
    config:
      type: chain
      definition:
        name: child
        kind: sequential
        nodes:
          - id: inner-a
          - id: inner-b
"#;
        let def: ChainDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        match &def.nodes[1].config {
            NodeConfig::Chain { definition } => {
                assert_eq!(definition.name, "child");
                assert_eq!(definition.nodes.len(), 2);
            }
            other => panic!("expected chain, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let yaml = r#"
name: bad
nodes:
  - id: a
    config:
      type: teleport
"#;
        assert!(serde_yaml_ng::from_str::<ChainDefinition>(yaml).is_err());
    }

    #[test]
    fn test_json_definition_parses() {
        let def: ChainDefinition = serde_json::from_value(json!({
            "name": "j",
            "kind": "loop",
            "max_loop_count": 3,
            "nodes": [{ "id": "counter" }]
        }))
        .unwrap();
        assert_eq!(def.kind, ChainKind::Loop);
        assert_eq!(def.max_loop_count, Some(3));
    }
}
