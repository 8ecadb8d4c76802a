//! Consumer interface: emitters subscribe and are called with each published change set.

use crate::model::types::{DomainFile, ModelFile};
use crate::model::ModelGraph;
use std::collections::BTreeSet;

/// Files touched by one publish, with read-only access to the whole graph.
pub struct ChangeSet<'a> {
    pub graph: &'a ModelGraph,
    pub files: &'a BTreeSet<String>,
}

impl<'a> ChangeSet<'a> {
    pub fn contains(&self, id: &str) -> bool {
        self.files.contains(id)
    }

    /// Changed model files still present in the graph.
    pub fn model_files(&self) -> impl Iterator<Item = &'a ModelFile> {
        let (graph, files) = (self.graph, self.files);
        files.iter().filter_map(move |id| graph.file(id))
    }

    pub fn domain_files(&self) -> impl Iterator<Item = &'a DomainFile> {
        let (graph, files) = (self.graph, self.files);
        files.iter().filter_map(move |id| graph.domain_file(id))
    }
}

/// Called synchronously after the initial load and after each successful incremental batch.
/// Implementations must be idempotent and pick the files they care about themselves.
pub trait ModelSubscriber: Send + Sync {
    fn on_files_changed(&self, changes: &ChangeSet<'_>);
}
