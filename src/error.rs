//! Typed errors: structural (per document), relationship (batched), invariant (immediate).

use crate::model::types::Position;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A positioned, non-fatal resolution finding. Rendered as `<path>[<line>,<col>] - <message>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub position: Position,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: &Path, position: Position, message: impl Into<String>) -> Self {
        Diagnostic {
            path: path.to_path_buf(),
            position,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} - {}", self.path.display(), self.position, self.message)
    }
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("{}[{line},{column}] - {message}", path.display())]
    Structural {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },
    #[error("{} - schema validation failed:\n{}", path.display(), violations.join("\n"))]
    Schema { path: PathBuf, violations: Vec<String> },
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dependency cycle between model files: {}", members.join(", "))]
    Cycle { members: Vec<String> },
    #[error("{} unresolved reference(s):\n{}", diagnostics.len(), render(diagnostics))]
    Relationship { diagnostics: Vec<Diagnostic> },
    #[error("{} - {message}", path.display())]
    Invariant { path: PathBuf, message: String },
    #[error("config: {0}")]
    Config(String),
    #[error("state: {0}")]
    State(String),
    #[error("watch: {0}")]
    Watch(#[from] notify::Error),
}

fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl ModelError {
    pub fn structural(path: &Path, position: Position, message: impl Into<String>) -> Self {
        ModelError::Structural {
            path: path.to_path_buf(),
            line: position.line,
            column: position.column,
            message: message.into(),
        }
    }

    pub fn invariant(path: &Path, message: impl Into<String>) -> Self {
        ModelError::Invariant {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ModelError::Io {
            path: path.into(),
            source,
        }
    }

    /// Number of findings carried by this error (1 unless it is a batched relationship failure).
    pub fn diagnostic_count(&self) -> usize {
        match self {
            ModelError::Relationship { diagnostics } => diagnostics.len().max(1),
            ModelError::Schema { violations, .. } => violations.len().max(1),
            _ => 1,
        }
    }

    /// Process exit status for a failed initial load.
    pub fn exit_code(&self) -> i32 {
        self.diagnostic_count().clamp(1, 255) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_renders_path_position_and_message() {
        let d = Diagnostic::new(
            Path::new("model/order.model"),
            Position { line: 12, column: 9 },
            "class 'Customer' not found in file or its dependencies",
        );
        assert_eq!(
            d.to_string(),
            "model/order.model[12,9] - class 'Customer' not found in file or its dependencies"
        );
    }

    #[test]
    fn exit_code_reflects_diagnostic_count() {
        let diagnostics = (0..3)
            .map(|i| Diagnostic::new(Path::new("a.model"), Position { line: i, column: 1 }, "x"))
            .collect();
        assert_eq!(ModelError::Relationship { diagnostics }.exit_code(), 3);
        assert_eq!(ModelError::Cycle { members: vec!["a".into()] }.exit_code(), 1);

        let many = (0..400)
            .map(|_| Diagnostic::new(Path::new("a.model"), Position::default(), "x"))
            .collect();
        assert_eq!(ModelError::Relationship { diagnostics: many }.exit_code(), 255);
    }
}
