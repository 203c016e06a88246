//! # Moye Core
//!
//! Runtime primitives for the Moye game runtime: object pooling, bit-packed
//! id generation, manually resolved tasks, a single-threaded executor,
//! frame-polled timers and keyed coroutine locks.
//!
//! Everything is built for single-threaded cooperative use. Shared state
//! is `Rc`-based and mutated only between suspension points.

pub mod compute;
pub mod error;
pub mod id_generator;
pub mod options;
pub mod pool;
pub mod time;
pub mod timer;

pub use error::{CoreError, CoreResult};
pub use options::Options;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs the library version. Call once after installing a logger.
pub fn init() {
    log::info!("Moye Core v{} initialized", VERSION);
}
