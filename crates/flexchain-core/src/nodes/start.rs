use flexchain_types::error::NodeError;
use flexchain_types::result::NodeResult;
use serde_json::Value;

use crate::chain::{Node, NodeContext};

/// Returns its input unchanged. Used as the implicit head of loop chains and
/// as the `passthrough` node kind.
#[derive(Debug, Clone)]
pub struct StartNode {
    id: String,
}

impl StartNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Node for StartNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, input: Value, _ctx: &NodeContext<'_>) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::Single(input))
    }
}
