//! Watch mode: debounced filesystem events driving all-or-nothing incremental reloads.

pub mod debounce;
pub mod engine;

pub use debounce::Debouncer;
pub use engine::WatchEngine;
