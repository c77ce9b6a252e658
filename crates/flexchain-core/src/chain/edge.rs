use std::sync::Arc;

use crate::expression::{ConditionEvaluator, ExpressionError};
use crate::memory::Memory;

/// Directed transition between two node ids.
///
/// Endpoints are not validated when the edge is added; an edge that points at
/// an unknown node fails the run when traversal reaches it.
#[derive(Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub condition: Option<Condition>,
}

/// Guard on an edge or a node, evaluated against the run's memory.
#[derive(Clone)]
pub enum Condition {
    /// Expression handed to the chain's condition evaluator.
    Expression(String),
    /// In-process predicate.
    Predicate(Arc<dyn Fn(&Memory) -> bool + Send + Sync>),
}

impl Condition {
    pub fn expression(expression: impl Into<String>) -> Self {
        Self::Expression(expression.into())
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Memory) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    pub fn check(&self, evaluator: &dyn ConditionEvaluator, memory: &Memory) -> Result<bool, ExpressionError> {
        match self {
            Condition::Expression(expression) => evaluator.evaluate(expression, memory),
            Condition::Predicate(predicate) => Ok(predicate(memory)),
        }
    }
}

impl Edge {
    /// Unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    /// Edge guarded by an evaluator expression.
    pub fn when(from: impl Into<String>, to: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(Condition::expression(expression)),
        }
    }

    /// Edge guarded by a closure over memory.
    pub fn when_fn<F>(from: impl Into<String>, to: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Memory) -> bool + Send + Sync + 'static,
    {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(Condition::predicate(predicate)),
        }
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("condition", &self.condition)
            .finish()
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Expression(expr) => f.debug_tuple("Expression").field(expr).finish(),
            Condition::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders() {
        let e = Edge::always("a", "b");
        assert_eq!((e.from.as_str(), e.to.as_str()), ("a", "b"));
        assert!(!e.is_conditional());

        let e = Edge::when("a", "b", "x > 1");
        assert!(matches!(e.condition, Some(Condition::Expression(ref s)) if s == "x > 1"));

        let e = Edge::when_fn("a", "b", |m| m.contains("go"));
        assert!(e.is_conditional());
        assert!(format!("{e:?}").contains("Predicate(..)"));
    }

    #[test]
    fn check_uses_evaluator_or_predicate() {
        let evaluator = crate::expression::JexlEvaluator::new();
        let memory = Memory::new();
        memory.set("x", serde_json::json!(2));

        assert!(Condition::expression("x > 1").check(&evaluator, &memory).unwrap());
        assert!(!Condition::predicate(|m| m.contains("missing")).check(&evaluator, &memory).unwrap());
        assert!(Condition::expression("x ===== ").check(&evaluator, &memory).is_err());
    }
}
