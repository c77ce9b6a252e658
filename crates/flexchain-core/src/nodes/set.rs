use flexchain_types::error::NodeError;
use flexchain_types::result::NodeResult;
use serde_json::{Map, Value};

use crate::chain::{Node, NodeContext};

/// Returns a fixed object. The executor merges it into memory like any other
/// object result.
#[derive(Debug, Clone)]
pub struct SetNode {
    id: String,
    values: Map<String, Value>,
}

impl SetNode {
    pub fn new(id: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }
}

impl Node for SetNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, _input: Value, _ctx: &NodeContext<'_>) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::Single(Value::Object(self.values.clone())))
    }
}
