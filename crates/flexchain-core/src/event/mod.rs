//! Chain lifecycle event delivery.
//!
//! Each chain owns an `EventBus` that calls registered listeners synchronously
//! and mirrors every event onto a `tokio::sync::broadcast` channel.

pub mod bus;
pub mod listener;
pub mod recorder;

pub use bus::EventBus;
pub use listener::{ChainEventListener, ListenerId, listener_fn};
pub use recorder::EventRecorder;
