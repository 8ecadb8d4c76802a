//! Live reload: filesystem events are debounced per path, then each settled path is applied
//! to a private copy of the published graph. The copy replaces the published graph only if
//! every affected file still resolves; otherwise the failure is logged and the copy dropped.

use crate::error::ModelError;
use crate::model::loader::{resolve_in_order, ModelLoader};
use crate::model::order::order;
use crate::model::parser::SourceFile;
use crate::model::values::attach;
use crate::model::ModelGraph;
use crate::state::ModelState;
use crate::subscriber::{ChangeSet, ModelSubscriber};
use crate::watch::debounce::Debouncer;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct WatchEngine {
    loader: ModelLoader,
    state: ModelState,
    subscribers: Vec<Arc<dyn ModelSubscriber>>,
    debounce: Duration,
}

impl WatchEngine {
    pub fn new(loader: ModelLoader, state: ModelState, debounce: Duration) -> Self {
        WatchEngine {
            loader,
            state,
            subscribers: Vec::new(),
            debounce,
        }
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn ModelSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    /// Notify every subscriber with all loaded files, as after the initial load.
    pub fn publish_all(&self) -> Result<(), ModelError> {
        let graph = self.state.snapshot()?;
        let files: BTreeSet<String> = graph
            .file_ids()
            .cloned()
            .chain(graph.domain_files().map(|d| d.id.clone()))
            .collect();
        self.notify(&graph, &files);
        Ok(())
    }

    fn notify(&self, graph: &ModelGraph, files: &BTreeSet<String>) {
        let changes = ChangeSet { graph, files };
        for subscriber in &self.subscribers {
            subscriber.on_files_changed(&changes);
        }
    }

    /// Apply a change of `path` (created, modified or removed) and publish the result.
    ///
    /// Returns the ids of the files whose content or links changed. On error the published
    /// graph is left exactly as it was.
    pub fn reload(&self, path: &Path) -> Result<BTreeSet<String>, ModelError> {
        let published = self.state.snapshot()?;
        let mut working: ModelGraph = (*published).clone();
        let mut recompute: BTreeSet<String> = BTreeSet::new();
        let mut changed: BTreeSet<String> = BTreeSet::new();

        let reattach = if self.loader.is_reference_data(path) {
            let data = self.loader.read_reference_data()?;
            let source = self.loader.reference_data_path().map(Path::to_path_buf);
            working.set_reference_data(data, source);
            true
        } else {
            let id = self.loader.file_id(path).ok_or_else(|| {
                ModelError::Config(format!("{} is not part of the model", path.display()))
            })?;
            let had_reference = has_reference_class(&working, &id);
            let was_domains = working.domain_file(&id).is_some();

            let now_domains = if path.exists() {
                match self.loader.read_source(path)? {
                    SourceFile::Model(file) => {
                        working.insert_file(file);
                        false
                    }
                    SourceFile::Domains(file) => {
                        working.insert_domain_file(file);
                        true
                    }
                }
            } else {
                working.remove_file(&id);
                working.remove_domain_file(&id);
                false
            };

            let reattach = if was_domains || now_domains {
                // Domains are global: every model file may bind to them.
                recompute.extend(working.file_ids().cloned());
                true
            } else {
                if working.file(&id).is_some() {
                    recompute.insert(id.clone());
                }
                recompute.extend(working.dependents_of(&id));
                had_reference || has_reference_class(&working, &id)
            };
            changed.insert(id);
            reattach
        };

        working.check_unique_names()?;
        let sorted = order(working.files())?;
        let ids: Vec<String> = sorted.into_iter().filter(|id| recompute.contains(id)).collect();
        resolve_in_order(&mut working, &ids)?;
        if reattach {
            attach(&mut working)?;
        }
        changed.extend(recompute);

        let graph = self.state.publish(working)?;
        tracing::info!(
            path = %path.display(),
            files = changed.len(),
            reattached = reattach,
            "model updated"
        );
        self.notify(&graph, &changed);
        Ok(changed)
    }

    /// Reload `path`, logging instead of propagating failures.
    pub fn handle_change(&self, path: &Path) {
        match self.reload(path) {
            Ok(changed) => {
                tracing::debug!(path = %path.display(), changed = ?changed, "reload published");
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "reload failed, keeping previous model"
                );
            }
        }
    }

    /// Watch the model root (and the reference-data file) until the event source closes.
    pub async fn run(&self) -> Result<(), ModelError> {
        let (tx, mut events) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(self.loader.root(), RecursiveMode::Recursive)?;
        if let Some(reference) = self.loader.reference_data_path() {
            if !reference.starts_with(self.loader.root()) {
                if let Some(dir) = reference.parent() {
                    watcher.watch(dir, RecursiveMode::NonRecursive)?;
                }
            }
        }

        let (debouncer, mut fired) = Debouncer::<PathBuf>::new(self.debounce);
        tracing::info!(
            root = %self.loader.root().display(),
            debounce_ms = debouncer.delay().as_millis() as u64,
            "watching model"
        );
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(Ok(event)) if !matches!(event.kind, EventKind::Access(_)) => {
                        for path in event.paths {
                            if self.loader.is_watched(&path) {
                                debouncer.trigger(path)?;
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => tracing::warn!(error = %e, "watch error"),
                    None => break,
                },
                Some(path) = fired.recv() => self.handle_change(&path),
            }
        }
        Ok(())
    }
}

fn has_reference_class(graph: &ModelGraph, id: &str) -> bool {
    graph
        .file(id)
        .map(|f| f.classes.iter().any(|c| c.reference))
        .unwrap_or(false)
}
