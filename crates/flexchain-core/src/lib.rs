//! Execution engine for flexchain.
//!
//! Builds chains of nodes connected by (optionally conditional) edges and
//! runs them against a shared, per-run memory while publishing lifecycle
//! events to registered listeners. Chains can also be loaded from YAML or
//! JSON definitions, see [`definition`].

pub mod chain;
pub mod definition;
pub mod event;
pub mod expression;
pub mod id;
pub mod memory;
pub mod nodes;

pub use chain::{Chain, LoopChain, Node, NodeContext, RunControl, RunReport, SequentialChain};
pub use memory::Memory;
