use flexchain_types::error::NodeError;
use flexchain_types::result::NodeResult;
use serde_json::Value;

use crate::chain::{Node, NodeContext};

/// Stops the run and passes its input through as the result.
#[derive(Debug, Clone)]
pub struct EndNode {
    id: String,
    normal: bool,
    message: Option<String>,
}

impl EndNode {
    /// Stop normally.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            normal: true,
            message: None,
        }
    }

    /// Stop with an error; the run fails with `ChainError::StoppedError`.
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            normal: false,
            message: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn reason(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("end node '{}' reached", self.id))
    }
}

impl Node for EndNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, input: Value, ctx: &NodeContext<'_>) -> Result<NodeResult, NodeError> {
        if self.normal {
            ctx.control().stop_normal(self.reason());
        } else {
            ctx.control().stop_error(self.reason());
        }
        Ok(NodeResult::Single(input))
    }
}
