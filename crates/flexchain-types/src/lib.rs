//! Shared domain types for flexchain.
//!
//! This crate contains the types exchanged between the engine, its callers and
//! its listeners: run status, node results, lifecycle events, error taxonomy,
//! configuration and declarative chain definitions.
//!
//! Zero runtime dependencies -- only serde, serde_json, thiserror.

pub mod config;
pub mod definition;
pub mod error;
pub mod event;
pub mod result;
pub mod status;
