//! Full load pipeline: discover files under the model root, parse, order, resolve every file
//! in dependency order, then attach reference values.

use crate::config::ToolConfig;
use crate::error::{Diagnostic, ModelError};
use crate::model::graph::ModelGraph;
use crate::model::order::order;
use crate::model::parser::{parse_source, SourceFile};
use crate::model::resolver::resolve_file;
use crate::model::schema::SchemaValidator;
use crate::model::types::ReferenceData;
use crate::model::values::{attach, load_reference_data};
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of model and domain files.
pub const MODEL_EXTENSION: &str = "model";

pub struct ModelLoader {
    root: PathBuf,
    reference_data: Option<PathBuf>,
    schemas: SchemaValidator,
}

impl ModelLoader {
    pub fn new(config: &ToolConfig) -> Result<Self, ModelError> {
        let root = fs::canonicalize(&config.model_root)
            .map_err(|e| ModelError::from_io(&config.model_root, e))?;
        if !root.is_dir() {
            return Err(ModelError::Config(format!(
                "model root {} is not a directory",
                root.display()
            )));
        }
        Ok(ModelLoader {
            root,
            reference_data: config.reference_data.as_deref().map(absolute),
            schemas: SchemaValidator::new()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reference_data_path(&self) -> Option<&Path> {
        self.reference_data.as_deref()
    }

    pub fn is_reference_data(&self, path: &Path) -> bool {
        self.reference_data
            .as_deref()
            .map(|r| absolute(path) == r)
            .unwrap_or(false)
    }

    /// Id of a model file: path relative to the root, without extension, `/`-separated.
    /// `None` for paths outside the root or with another extension.
    pub fn file_id(&self, path: &Path) -> Option<String> {
        if path.extension().and_then(|e| e.to_str()) != Some(MODEL_EXTENSION) {
            return None;
        }
        let path = absolute(path);
        let relative = path.strip_prefix(&self.root).ok()?.with_extension("");
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    /// Whether a filesystem event on `path` concerns the model.
    pub fn is_watched(&self, path: &Path) -> bool {
        self.is_reference_data(path) || self.file_id(path).is_some()
    }

    /// All model files under the root, sorted.
    pub fn discover(&self) -> Result<Vec<PathBuf>, ModelError> {
        let mut out = Vec::new();
        collect(&self.root, &mut out)?;
        out.sort();
        Ok(out)
    }

    pub fn read_source(&self, path: &Path) -> Result<SourceFile, ModelError> {
        let id = self.file_id(path).ok_or_else(|| {
            ModelError::Config(format!("{} is not a model file under the root", path.display()))
        })?;
        let text = fs::read_to_string(path).map_err(|e| ModelError::from_io(path, e))?;
        parse_source(&id, path, &text, &self.schemas)
    }

    pub fn read_reference_data(&self) -> Result<ReferenceData, ModelError> {
        match &self.reference_data {
            Some(path) => load_reference_data(path),
            None => Ok(ReferenceData::new()),
        }
    }

    /// Load, resolve and attach the whole model. Any failure aborts the load.
    pub fn load(&self) -> Result<ModelGraph, ModelError> {
        let mut graph = ModelGraph::new();
        for path in self.discover()? {
            match self.read_source(&path)? {
                SourceFile::Model(file) => {
                    graph.insert_file(file);
                }
                SourceFile::Domains(file) => {
                    graph.insert_domain_file(file);
                }
            }
        }
        graph.check_unique_names()?;

        let sorted = order(graph.files())?;
        resolve_in_order(&mut graph, &sorted)?;

        graph.set_reference_data(self.read_reference_data()?, self.reference_data.clone());
        attach(&mut graph)?;

        tracing::info!(
            files = graph.files().count(),
            domain_files = graph.domain_files().count(),
            classes = graph.classes().count(),
            "model loaded"
        );
        Ok(graph)
    }
}

/// Resolve `ids` in the given order, collecting every file's diagnostics before failing.
/// Invariant violations fail immediately; diagnostics gathered up to that point are logged.
pub fn resolve_in_order(graph: &mut ModelGraph, ids: &[String]) -> Result<(), ModelError> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    for id in ids {
        match resolve_file(graph, id) {
            Ok(found) => diagnostics.extend(found),
            Err(e) => {
                for d in &diagnostics {
                    tracing::warn!(diagnostic = %d, "unresolved reference");
                }
                return Err(e);
            }
        }
    }
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(ModelError::Relationship { diagnostics })
    }
}

fn collect(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ModelError> {
    for entry in fs::read_dir(dir).map_err(|e| ModelError::from_io(dir, e))? {
        let entry = entry.map_err(|e| ModelError::from_io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| ModelError::from_io(&path, e))?;
        if file_type.is_dir() {
            collect(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(MODEL_EXTENSION) {
            out.push(path);
        }
    }
    Ok(())
}

/// Canonical form of `path`; for a path that no longer exists, its canonical parent joined
/// with the file name.
fn absolute(path: &Path) -> PathBuf {
    if let Ok(p) = fs::canonicalize(path) {
        return p;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}
