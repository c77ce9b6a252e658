//! Run-scoped execution memory.
//!
//! `Memory` is a concurrent key-value store backed by `DashMap`, shared by
//! every node of one chain run. Values are cloned on read to avoid holding a
//! `DashMap` `Ref` across `.await` points, which would deadlock.
//!
//! A nested chain gets a child `Memory` that reads through to its parent while
//! keeping its own writes local.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

/// Per-node memory key holding the node's successful execution count.
pub const CTX_EXEC_COUNT: &str = "_exec_count";

/// Run memory key holding the most recent node result.
pub const LAST_RESULT_KEY: &str = "_last_result";

/// Concurrent key-value memory for one chain run.
///
/// Cloning produces a shared view of the same underlying data (backed by `Arc`).
#[derive(Debug, Clone)]
pub struct Memory {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: DashMap<String, Value>,
    nodes: DashMap<String, NodeMemory>,
    parent: Option<Memory>,
}

impl Memory {
    /// Create an empty memory.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner::default()),
        }
    }

    /// Create a memory whose reads fall back to `parent`.
    pub fn child(parent: &Memory) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                parent: Some(parent.clone()),
                ..Default::default()
            }),
        }
    }

    pub fn parent(&self) -> Option<&Memory> {
        self.inner.parent.as_ref()
    }

    /// Cloned value at `key`, looking through to the parent when absent locally.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.inner.values.get(key) {
            Some(r) => Some(r.value().clone()),
            None => self.inner.parent.as_ref().and_then(|p| p.get(key)),
        }
    }

    /// Insert or overwrite a key in this scope. Last write wins.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.values.insert(key.into(), value);
    }

    /// Insert every entry of `values`.
    pub fn put_all(&self, values: Map<String, Value>) {
        for (k, v) in values {
            self.inner.values.insert(k, v);
        }
    }

    /// Remove a key from this scope. The parent is never modified.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.values.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.values.contains_key(key)
            || self.inner.parent.as_ref().is_some_and(|p| p.contains(key))
    }

    /// Snapshot of all visible keys, parent keys included.
    pub fn keys(&self) -> Vec<String> {
        self.snapshot().into_keys().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty() && self.inner.parent.as_ref().is_none_or(|p| p.is_empty())
    }

    /// Point-in-time copy of every visible entry. Local keys shadow the parent.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        let mut out = self
            .inner
            .parent
            .as_ref()
            .map(|p| p.snapshot())
            .unwrap_or_default();
        for r in self.inner.values.iter() {
            out.insert(r.key().clone(), r.value().clone());
        }
        out
    }

    /// [`Memory::snapshot`] as a JSON object.
    pub fn snapshot_value(&self) -> Value {
        Value::Object(self.snapshot().into_iter().collect())
    }

    /// Private memory of `node_id`, created on first access.
    pub fn node_memory(&self, node_id: &str) -> NodeMemory {
        if let Some(existing) = self.inner.nodes.get(node_id) {
            return existing.value().clone();
        }
        self.inner
            .nodes
            .entry(node_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Execution count of `node_id` in this run; zero if it never finished.
    pub fn exec_count(&self, node_id: &str) -> u64 {
        self.inner
            .nodes
            .get(node_id)
            .map(|n| n.exec_count())
            .unwrap_or(0)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

/// Private per-node memory, holding at least the `_exec_count` counter.
#[derive(Debug, Clone, Default)]
pub struct NodeMemory {
    inner: Arc<DashMap<String, Value>>,
}

impl NodeMemory {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.insert(key.into(), value);
    }

    pub fn exec_count(&self) -> u64 {
        self.get(CTX_EXEC_COUNT)
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }

    /// Increment `_exec_count` and return the new value.
    pub fn increment_exec_count(&self) -> u64 {
        let mut entry = self
            .inner
            .entry(CTX_EXEC_COUNT.to_string())
            .or_insert(Value::from(0u64));
        let next = entry.value().as_u64().unwrap_or(0) + 1;
        *entry.value_mut() = Value::from(next);
        next
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_roundtrip() {
        let mem = Memory::new();
        mem.set("key1", json!("hello"));
        assert_eq!(mem.get("key1"), Some(json!("hello")));
        assert_eq!(mem.get("missing"), None);
    }

    #[test]
    fn set_overwrites() {
        let mem = Memory::new();
        mem.set("k", json!(1));
        mem.set("k", json!(2));
        assert_eq!(mem.get("k"), Some(json!(2)));
    }

    #[test]
    fn put_all_and_remove() {
        let mem = Memory::new();
        mem.put_all(json!({ "a": 1, "b": 2 }).as_object().unwrap().clone());
        assert_eq!(mem.len(), 2);
        assert_eq!(mem.remove("a"), Some(json!(1)));
        assert!(!mem.contains("a"));
        assert!(mem.contains("b"));
    }

    #[test]
    fn clone_shares_data() {
        let mem = Memory::new();
        let other = mem.clone();
        other.set("shared", json!(true));
        assert_eq!(mem.get("shared"), Some(json!(true)));
    }

    #[test]
    fn child_reads_through_and_writes_locally() {
        let parent = Memory::new();
        parent.set("x", json!(1));
        parent.set("y", json!("parent"));

        let child = Memory::child(&parent);
        assert_eq!(child.get("x"), Some(json!(1)));
        assert!(child.contains("y"));

        child.set("y", json!("child"));
        child.set("z", json!(3));
        assert_eq!(child.get("y"), Some(json!("child")));
        assert_eq!(parent.get("y"), Some(json!("parent")));
        assert_eq!(parent.get("z"), None);

        let snap = child.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap["y"], json!("child"));

        // removing from the child never touches the parent
        assert_eq!(child.remove("x"), None);
        assert_eq!(child.get("x"), Some(json!(1)));
    }

    #[test]
    fn is_empty_considers_parent() {
        let parent = Memory::new();
        let child = Memory::child(&parent);
        assert!(child.is_empty());
        parent.set("p", json!(0));
        assert!(!child.is_empty());
    }

    #[test]
    fn snapshot_value_is_object() {
        let mem = Memory::new();
        mem.set("a", json!([1, 2]));
        assert_eq!(mem.snapshot_value(), json!({ "a": [1, 2] }));
    }

    #[test]
    fn node_memory_counts_executions() {
        let mem = Memory::new();
        assert_eq!(mem.exec_count("n"), 0);

        let node = mem.node_memory("n");
        assert_eq!(node.increment_exec_count(), 1);
        assert_eq!(mem.node_memory("n").increment_exec_count(), 2);
        assert_eq!(mem.exec_count("n"), 2);
        assert_eq!(node.get(CTX_EXEC_COUNT), Some(json!(2)));

        node.set("custom", json!("v"));
        assert_eq!(node.snapshot().len(), 2);
    }

    #[test]
    fn node_memory_is_private_per_node() {
        let mem = Memory::new();
        mem.node_memory("a").increment_exec_count();
        assert_eq!(mem.exec_count("b"), 0);
        assert!(mem.get(CTX_EXEC_COUNT).is_none());
    }

    #[tokio::test]
    async fn concurrent_access_from_multiple_tasks() {
        let mem = Memory::new();
        let mut handles = Vec::new();

        for i in 0..10 {
            let m = mem.clone();
            handles.push(tokio::spawn(async move {
                m.set(format!("key-{i}"), json!(i));
                m.node_memory("shared").increment_exec_count();
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(mem.len(), 10);
        assert_eq!(mem.exec_count("shared"), 10);
    }
}
