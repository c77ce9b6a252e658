//! Id generation strategies for chains and runs.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Produces identifiers for chains and runs.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Time-sortable UUIDv7 ids. The default generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV7IdGenerator;

impl IdGenerator for UuidV7IdGenerator {
    fn generate(&self) -> String {
        Uuid::now_v7().to_string()
    }
}

/// Deterministic `prefix-N` ids, starting at 1.
#[derive(Debug)]
pub struct SequenceIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequenceIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_unique() {
        let g = UuidV7IdGenerator;
        assert_ne!(g.generate(), g.generate());
        assert!(Uuid::parse_str(&g.generate()).is_ok());
    }

    #[test]
    fn sequence_ids_increment() {
        let g = SequenceIdGenerator::new("run");
        assert_eq!(g.generate(), "run-1");
        assert_eq!(g.generate(), "run-2");
    }
}
