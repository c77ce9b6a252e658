//! Node and chain results.
//!
//! `NodeResult` is the tagged scalar-or-list outcome of a node invocation. The
//! executor folds terminal outputs with [`NodeResult::of_results`], which
//! flattens exactly one level.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one node invocation (or of a whole run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NodeResult {
    /// Exactly one value.
    Single(Value),
    /// An ordered list of values.
    Multi(Vec<Value>),
}

impl NodeResult {
    /// Shorthand for `NodeResult::Single`.
    pub fn single(value: impl Into<Value>) -> Self {
        NodeResult::Single(value.into())
    }

    /// Build a `Multi` result directly from a pre-built list.
    pub fn of_values(values: Vec<Value>) -> Self {
        NodeResult::Multi(values)
    }

    /// Merge prior results into one `Multi`.
    ///
    /// Each `Single` contributes its value, each `Multi` contributes all of its
    /// elements. Values inside a `Multi` are never inspected further, so a JSON
    /// array nested in a `Multi` stays an array.
    pub fn of_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = NodeResult>,
    {
        let mut values = Vec::new();
        for result in results {
            match result {
                NodeResult::Single(v) => values.push(v),
                NodeResult::Multi(vs) => values.extend(vs),
            }
        }
        NodeResult::Multi(values)
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, NodeResult::Multi(_))
    }

    /// The scalar value, if this is a `Single`.
    pub fn as_single(&self) -> Option<&Value> {
        match self {
            NodeResult::Single(v) => Some(v),
            NodeResult::Multi(_) => None,
        }
    }

    /// Borrowing view of the value(s) as a flat list.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            NodeResult::Single(v) => vec![v],
            NodeResult::Multi(vs) => vs.iter().collect(),
        }
    }

    /// Convert to a plain JSON value; `Multi` becomes an array.
    pub fn into_value(self) -> Value {
        match self {
            NodeResult::Single(v) => v,
            NodeResult::Multi(vs) => Value::Array(vs),
        }
    }

    /// Same as [`NodeResult::into_value`] without consuming.
    pub fn to_value(&self) -> Value {
        self.clone().into_value()
    }
}

impl Default for NodeResult {
    fn default() -> Self {
        NodeResult::Single(Value::Null)
    }
}

impl From<Value> for NodeResult {
    fn from(value: Value) -> Self {
        NodeResult::Single(value)
    }
}
