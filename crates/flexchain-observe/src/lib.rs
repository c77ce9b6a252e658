//! Observability for flexchain: subscriber setup and a listener that turns
//! chain events into tracing events.

pub mod event_log;
pub mod tracing_setup;

pub use event_log::TracingListener;
