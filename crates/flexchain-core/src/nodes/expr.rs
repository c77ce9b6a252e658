use std::sync::Arc;

use flexchain_types::error::NodeError;
use flexchain_types::result::NodeResult;
use serde_json::{Map, Value};

use crate::chain::{Node, NodeContext};
use crate::expression::JexlEvaluator;

/// Evaluates a JEXL expression against memory, with the node input bound as
/// `input`.
///
/// With a `key`, the value is returned as `{key: value}` so the executor stores
/// it in memory.
#[derive(Debug, Clone)]
pub struct ExprNode {
    id: String,
    expression: String,
    key: Option<String>,
    evaluator: Arc<JexlEvaluator>,
}

impl ExprNode {
    pub fn new(id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::with_evaluator(id, expression, Arc::new(JexlEvaluator::new()))
    }

    /// Share one evaluator between many nodes.
    pub fn with_evaluator(
        id: impl Into<String>,
        expression: impl Into<String>,
        evaluator: Arc<JexlEvaluator>,
    ) -> Self {
        Self {
            id: id.into(),
            expression: expression.into(),
            key: None,
            evaluator,
        }
    }

    pub fn storing_as(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl Node for ExprNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, input: Value, ctx: &NodeContext<'_>) -> Result<NodeResult, NodeError> {
        let value = self
            .evaluator
            .evaluate_with_input(&self.expression, ctx.memory(), &input)
            .map_err(|e| NodeError::Failed(format!("expression '{}': {e}", self.expression)))?;

        Ok(NodeResult::Single(match &self.key {
            Some(key) => {
                let mut map = Map::new();
                map.insert(key.clone(), value);
                Value::Object(map)
            }
            None => value,
        }))
    }
}
