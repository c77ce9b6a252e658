//! Condition evaluation for edges, routers and expression nodes.
//!
//! The engine only depends on the [`ConditionEvaluator`] trait. The default
//! implementation wraps `jexl_eval::Evaluator` with a set of standard
//! transforms and evaluates against a snapshot of the run's memory.
//!
//! Memory values are always passed as context objects, never interpolated into
//! expression strings.

use serde_json::{Map, Number, Value, json};

use crate::memory::Memory;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during expression evaluation.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("Expression evaluation failed: {0}")]
    EvalFailed(String),

    #[error("Expression did not evaluate to a boolean: got {result}")]
    NotBoolean { result: Value },

    #[error("Invalid context: {0}")]
    InvalidContext(String),
}

// ---------------------------------------------------------------------------
// Evaluator trait
// ---------------------------------------------------------------------------

/// Decides whether a conditional edge is taken.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, memory: &Memory) -> Result<bool, ExpressionError>;
}

// ---------------------------------------------------------------------------
// JexlEvaluator
// ---------------------------------------------------------------------------

/// JEXL expression evaluator with standard transforms pre-registered.
///
/// Numbers in the context are widened to `f64` before evaluation so that
/// integer memory values compare equal to JEXL number literals.
pub struct JexlEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl JexlEvaluator {
    /// Create a new evaluator with all standard transforms registered.
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            // String transforms
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_uppercase()))
            })
            .with_transform("trim", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.trim()))
            })
            .with_transform("split", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let delimiter = args.get(1).and_then(|v| v.as_str()).unwrap_or(",");
                let parts: Vec<&str> = s.split(delimiter).collect();
                Ok(json!(parts))
            })
            // Boolean transforms
            .with_transform("not", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                Ok(json!(!value_to_bool(&val)))
            })
            // String search transforms
            .with_transform("contains", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let search = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.contains(search)))
            })
            .with_transform("startsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let prefix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.starts_with(prefix)))
            })
            .with_transform("endsWith", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let suffix = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.ends_with(suffix)))
            })
            // Length transform (strings, arrays and objects)
            .with_transform("length", |args: &[Value]| {
                let len = match args.first() {
                    Some(Value::String(s)) => s.len(),
                    Some(Value::Array(a)) => a.len(),
                    Some(Value::Object(o)) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            });

        Self { evaluator }
    }

    /// Evaluate an expression to a boolean, using JavaScript-like truthiness.
    ///
    /// The `context` must be a JSON object.
    pub fn evaluate_bool(&self, expression: &str, context: &Value) -> Result<bool, ExpressionError> {
        let result = self.evaluate_value(expression, context)?;
        Ok(value_to_bool(&result))
    }

    /// Evaluate an expression that must produce a JSON boolean.
    pub fn evaluate_strict_bool(
        &self,
        expression: &str,
        context: &Value,
    ) -> Result<bool, ExpressionError> {
        match self.evaluate_value(expression, context)? {
            Value::Bool(b) => Ok(b),
            result => Err(ExpressionError::NotBoolean { result }),
        }
    }

    /// Evaluate an expression and return the raw JSON value.
    pub fn evaluate_value(&self, expression: &str, context: &Value) -> Result<Value, ExpressionError> {
        if !context.is_object() {
            return Err(ExpressionError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        }

        let context = widen_numbers(context.clone());
        self.evaluator
            .eval_in_context(expression, &context)
            .map_err(|e| ExpressionError::EvalFailed(e.to_string()))
    }

    /// Evaluate against a memory snapshot with `input` bound as an extra key.
    pub fn evaluate_with_input(
        &self,
        expression: &str,
        memory: &Memory,
        input: &Value,
    ) -> Result<Value, ExpressionError> {
        let mut context: Map<String, Value> = memory.snapshot().into_iter().collect();
        context.insert("input".to_string(), input.clone());
        self.evaluate_value(expression, &Value::Object(context))
    }
}

impl Default for JexlEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JexlEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JexlEvaluator").finish_non_exhaustive()
    }
}

impl ConditionEvaluator for JexlEvaluator {
    fn evaluate(&self, expression: &str, memory: &Memory) -> Result<bool, ExpressionError> {
        self.evaluate_bool(expression, &memory.snapshot_value())
    }
}

/// Coerce a JSON value to boolean using JavaScript-like truthiness.
pub fn value_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn widen_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) if !n.is_f64() => n
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Number(n)),
        Value::Array(items) => Value::Array(items.into_iter().map(widen_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, widen_numbers(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_property_access() {
        let eval = JexlEvaluator::new();
        let ctx = json!({ "user": { "name": "Alice" } });
        let result = eval.evaluate_value("user.name", &ctx).unwrap();
        assert_eq!(result, json!("Alice"));
    }

    #[test]
    fn test_integer_memory_compares_with_literals() {
        let eval = JexlEvaluator::new();
        let ctx = json!({ "x": 1, "n": 4 });
        assert!(eval.evaluate_bool("x == 1", &ctx).unwrap());
        assert!(eval.evaluate_bool("n > 3", &ctx).unwrap());
        assert!(!eval.evaluate_bool("n < 3", &ctx).unwrap());
    }

    #[test]
    fn test_arithmetic_returns_float() {
        let eval = JexlEvaluator::new();
        let result = eval.evaluate_value("x * 2", &json!({ "x": 1 })).unwrap();
        assert_eq!(result.as_f64(), Some(2.0));
    }

    #[test]
    fn test_logical_operators() {
        let eval = JexlEvaluator::new();
        let ctx = json!({ "kind": "push", "branch": "main" });
        assert!(eval
            .evaluate_bool("kind == 'push' && branch == 'main'", &ctx)
            .unwrap());
        assert!(!eval
            .evaluate_bool("kind == 'push' && branch == 'dev'", &ctx)
            .unwrap());
        assert!(eval
            .evaluate_bool("branch == 'main' || branch == 'dev'", &ctx)
            .unwrap());
    }

    #[test]
    fn test_transforms() {
        let eval = JexlEvaluator::new();
        let ctx = json!({ "name": "  HELLO World  ", "csv": "a,b,c", "path": "/api/v1" });
        assert_eq!(
            eval.evaluate_value("name|trim|lower", &ctx).unwrap(),
            json!("hello world")
        );
        assert_eq!(
            eval.evaluate_value("csv|split(',')", &ctx).unwrap(),
            json!(["a", "b", "c"])
        );
        assert!(eval.evaluate_bool("path|startsWith('/api')", &ctx).unwrap());
        assert!(eval.evaluate_bool("csv|contains('b')", &ctx).unwrap());
        assert_eq!(eval.evaluate_value("csv|length", &ctx).unwrap(), json!(5.0));
    }

    #[test]
    fn test_truthiness() {
        assert!(!value_to_bool(&json!(null)));
        assert!(!value_to_bool(&json!(0)));
        assert!(!value_to_bool(&json!("")));
        assert!(value_to_bool(&json!("x")));
        assert!(value_to_bool(&json!([])));
        assert!(value_to_bool(&json!({})));
    }

    #[test]
    fn test_strict_bool_rejects_non_boolean() {
        let eval = JexlEvaluator::new();
        let err = eval
            .evaluate_strict_bool("name", &json!({ "name": "x" }))
            .unwrap_err();
        assert!(matches!(err, ExpressionError::NotBoolean { .. }));
    }

    #[test]
    fn test_non_object_context_rejected() {
        let eval = JexlEvaluator::new();
        let err = eval.evaluate_bool("true", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, ExpressionError::InvalidContext(_)));
    }

    #[test]
    fn test_invalid_expression_fails() {
        let eval = JexlEvaluator::new();
        let err = eval.evaluate_bool("x ===== ", &json!({})).unwrap_err();
        assert!(matches!(err, ExpressionError::EvalFailed(_)));
    }

    #[test]
    fn test_condition_evaluator_reads_memory() {
        let eval = JexlEvaluator::new();
        let mem = Memory::new();
        mem.set("status", json!("ok"));
        assert!(eval.evaluate("status == 'ok'", &mem).unwrap());
        assert!(!eval.evaluate("status == 'failed'", &mem).unwrap());
        assert!(!eval.evaluate("missing", &mem).unwrap());
    }

    #[test]
    fn test_evaluate_with_input() {
        let eval = JexlEvaluator::new();
        let mem = Memory::new();
        mem.set("prefix", json!("done:"));
        let result = eval
            .evaluate_with_input("prefix + input", &mem, &json!("2"))
            .unwrap();
        assert_eq!(result, json!("done:2"));
    }
}
