//! Modelgen: model ingestion and cross-reference resolution for model-driven code generation.
//!
//! Model files are parsed into classes with unresolved relations, ordered by their declared
//! dependencies, resolved file by file, then decorated with reference values. The resulting
//! [`ModelGraph`] is published through [`ModelState`] and handed to [`ModelSubscriber`]s,
//! initially and after every successful change in watch mode.

pub mod case;
pub mod config;
pub mod error;
pub mod model;
pub mod state;
pub mod subscriber;
pub mod watch;

pub use config::ToolConfig;
pub use error::{Diagnostic, ModelError};
pub use model::{ModelGraph, ModelLoader};
pub use state::ModelState;
pub use subscriber::{ChangeSet, ModelSubscriber};
pub use watch::{Debouncer, WatchEngine};
