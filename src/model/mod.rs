//! Model ingestion: parse, order, resolve and attach values.

pub mod document;
pub mod graph;
pub mod loader;
pub mod order;
pub mod parser;
pub mod resolver;
pub mod schema;
pub mod types;
pub mod values;

pub use graph::ModelGraph;
pub use loader::{resolve_in_order, ModelLoader, MODEL_EXTENSION};
pub use parser::SourceFile;
pub use schema::{DocumentKind, SchemaValidator};
pub use types::{Class, ClassRef, Domain, DomainFile, ModelFile, Property, PropertyRef};
