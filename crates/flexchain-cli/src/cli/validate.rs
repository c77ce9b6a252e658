//! `flexchain validate`: structural checks without running anything.

use std::path::Path;

use anyhow::Result;
use console::style;

use flexchain_core::definition::{DefinitionError, load_chain_file, unreachable_nodes};
use flexchain_types::definition::{ChainDefinition, NodeConfig, NodeDefinition};

/// Handle `flexchain validate`.
pub fn handle_validate(file: &Path, json: bool) -> Result<()> {
    let def = match load_chain_file(file) {
        Ok(def) => def,
        Err(err) => {
            if json {
                let out = serde_json::json!({
                    "valid": false,
                    "file": file.display().to_string(),
                    "error": err.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            return Err(match err {
                DefinitionError::IoError(e) => {
                    anyhow::anyhow!("Failed to read {}: {e}", file.display())
                }
                other => anyhow::anyhow!("{} is invalid: {other}", file.display()),
            });
        }
    };

    let unreachable = unreachable_nodes(&def);
    for id in &unreachable {
        tracing::warn!(chain = %def.name, node_id = %id, "node is unreachable");
    }

    if json {
        let out = serde_json::json!({
            "valid": true,
            "file": file.display().to_string(),
            "name": &def.name,
            "kind": def.kind,
            "nodes": count_nodes(&def),
            "edges": def.edges.len(),
            "unreachable": unreachable,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Chain '{}' is valid",
        style("*").green().bold(),
        style(&def.name).cyan()
    );
    if let Some(description) = &def.description {
        println!("  {}", style(description).dim());
    }
    println!("  Kind: {:?}", def.kind);
    println!("  Nodes: {}", count_nodes(&def));
    println!("  Edges: {}", def.edges.len());
    if let Some(entry) = &def.entry {
        println!("  Entry: {entry}");
    }
    for id in &unreachable {
        println!(
            "  {} node '{}' is unreachable",
            style("!").yellow().bold(),
            style(id).yellow()
        );
    }
    println!();

    Ok(())
}

/// Nodes at every depth, router children and nested chains included.
fn count_nodes(def: &ChainDefinition) -> usize {
    fn count(node: &NodeDefinition) -> usize {
        1 + match &node.config {
            NodeConfig::Router { routes, .. } => routes.iter().map(|r| count(&r.node)).sum(),
            NodeConfig::Chain { definition } => count_nodes(definition),
            _ => 0,
        }
    }
    def.nodes.iter().map(count).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.yaml");
        std::fs::write(
            &path,
            "name: ok\nentry: a\nnodes:\n  - id: a\n  - id: b\nedges:\n  - from: a\n    to: b\n",
        )
        .unwrap();
        assert!(handle_validate(&path, true).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_edge_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(
            &path,
            "name: bad\nnodes:\n  - id: a\nedges:\n  - from: a\n    to: ghost\n",
        )
        .unwrap();

        let err = handle_validate(&path, false).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn count_nodes_includes_nested() {
        let def: ChainDefinition = serde_json::from_str(
            r#"{"name": "n", "nodes": [
                {"id": "r", "config": {"type": "router", "routes": [{"node": {"id": "x"}}]}},
                {"id": "c", "config": {"type": "chain", "definition": {"name": "inner", "nodes": [{"id": "y"}]}}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(count_nodes(&def), 4);
    }
}
