use thiserror::Error;

/// Errors raised by a node's `invoke`.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node failed: {0}")]
    Failed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing memory key '{0}'")]
    MissingKey(String),

    /// A nested chain run ended in error.
    #[error("nested chain failed: {0}")]
    Chain(#[source] Box<ChainError>),

    #[error("node cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn failed(message: impl Into<String>) -> Self {
        NodeError::Failed(message.into())
    }
}

/// Structural problems in a chain's graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphDefinitionError {
    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("edge from '{referenced_by}' references unknown node '{node_id}'")]
    UnknownNode {
        referenced_by: String,
        node_id: String,
    },

    #[error("entry node '{0}' does not exist")]
    UnknownEntry(String),

    #[error("chain has no nodes")]
    EmptyChain,
}

/// Terminal error of a chain run.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Graph(#[from] GraphDefinitionError),

    #[error("node '{node_id}' failed: {source}")]
    NodeInvocation {
        node_id: String,
        #[source]
        source: NodeError,
    },

    /// `stop_error` was requested; `node_id` is the node that was executing.
    #[error("chain stopped with error: {reason}")]
    StoppedError {
        reason: String,
        node_id: Option<String>,
    },

    #[error("condition on edge '{from}' -> '{to}' failed: {message}")]
    Condition {
        from: String,
        to: String,
        message: String,
    },

    #[error("condition on node '{node_id}' failed: {message}")]
    NodeCondition { node_id: String, message: String },
}

impl ChainError {
    /// Id of the node the failure originated from, when there is one.
    pub fn origin_node(&self) -> Option<&str> {
        match self {
            ChainError::NodeInvocation { node_id, .. } => Some(node_id),
            ChainError::Condition { from, .. } => Some(from),
            ChainError::NodeCondition { node_id, .. } => Some(node_id),
            ChainError::StoppedError { node_id, .. } => node_id.as_deref(),
            ChainError::Graph(GraphDefinitionError::UnknownNode { referenced_by, .. }) => {
                Some(referenced_by)
            }
            _ => None,
        }
    }
}
