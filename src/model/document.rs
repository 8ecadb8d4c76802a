//! Multi-document splitting and position helpers over `marked_yaml` trees.
//!
//! A model file is a stream of YAML documents separated by `---` lines. Each document is
//! parsed on its own so that markers stay cheap; the line offset of the document within the
//! file is carried alongside so every reported position is file-relative.

use crate::error::ModelError;
use crate::model::types::Position;
use marked_yaml::types::{MarkedMappingNode, MarkedScalarNode, Node, Span};
use serde_json::{Map, Number, Value};
use std::path::Path;

/// One YAML document of a file with the data needed to report file-relative positions.
pub struct Document<'a> {
    pub path: &'a Path,
    pub root: Node,
    /// Lines of the file that precede this document.
    line_offset: usize,
    /// Text of this document alone, for scalar style lookups.
    source: String,
}

impl<'a> Document<'a> {
    pub fn position(&self, span: &Span) -> Position {
        match span.start() {
            Some(m) => Position {
                line: m.line() + self.line_offset,
                column: m.column(),
            },
            None => Position {
                line: self.line_offset + 1,
                column: 1,
            },
        }
    }

    /// Position of a node. A mapping is anchored at its first key.
    pub fn node_position(&self, node: &Node) -> Position {
        match node {
            Node::Mapping(map) => match map.iter().next() {
                Some((key, _)) => self.scalar_position(key),
                None => self.position(node.span()),
            },
            _ => self.position(node.span()),
        }
    }

    pub fn scalar_position(&self, node: &MarkedScalarNode) -> Position {
        self.position(node.span())
    }

    pub fn error(&self, position: Position, message: impl Into<String>) -> ModelError {
        ModelError::structural(self.path, position, message)
    }

    /// Top-level mapping of the document.
    pub fn mapping(&self) -> Result<&MarkedMappingNode, ModelError> {
        self.root
            .as_mapping()
            .ok_or_else(|| self.error(self.node_position(&self.root), "document must be a mapping"))
    }

    /// Follow a JSON pointer (as reported by schema validation) through the marked tree and
    /// return the deepest node reached.
    pub fn node_at(&self, pointer: &str) -> &Node {
        let mut current = &self.root;
        for raw in pointer.split('/').skip(1) {
            let segment = raw.replace("~1", "/").replace("~0", "~");
            let next = match current {
                Node::Mapping(m) => m.get_node(&segment),
                Node::Sequence(s) => segment.parse::<usize>().ok().and_then(|i| s.get(i)),
                Node::Scalar(_) => None,
            };
            match next {
                Some(n) => current = n,
                None => break,
            }
        }
        current
    }

    pub fn pointer_position(&self, pointer: &str) -> Position {
        self.node_position(self.node_at(pointer))
    }

    /// Position of `key` itself inside the mapping at `pointer`.
    pub fn key_position(&self, pointer: &str, key: &str) -> Option<Position> {
        let map = self.node_at(pointer).as_mapping()?;
        map.iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(k, _)| self.scalar_position(k))
    }

    /// Quoted and block scalars are text; plain scalars are typed from their content.
    fn is_text_scalar(&self, node: &MarkedScalarNode) -> bool {
        let Some(mark) = node.span().start() else {
            return false;
        };
        let (Some(line), Some(column)) = (mark.line().checked_sub(1), mark.column().checked_sub(1))
        else {
            return false;
        };
        self.source
            .lines()
            .nth(line)
            .and_then(|l| l.chars().nth(column))
            .map(|c| matches!(c, '"' | '\'' | '|' | '>'))
            .unwrap_or(false)
    }

    /// JSON literal of a scalar, keeping quoted scalars as strings.
    pub fn scalar_value(&self, node: &MarkedScalarNode) -> Value {
        if self.is_text_scalar(node) {
            Value::String(node.as_str().to_string())
        } else {
            scalar_literal(node.as_str())
        }
    }

    /// Convert a marked tree into a JSON value (scalars go through [`Document::scalar_value`]).
    pub fn to_json(&self, node: &Node) -> Value {
        match node {
            Node::Scalar(s) => self.scalar_value(s),
            Node::Sequence(seq) => Value::Array(seq.iter().map(|n| self.to_json(n)).collect()),
            Node::Mapping(map) => {
                let mut out = Map::new();
                for (k, v) in map.iter() {
                    out.insert(k.as_str().to_string(), self.to_json(v));
                }
                Value::Object(out)
            }
        }
    }
}

fn is_separator(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed == "---" || trimmed.starts_with("--- ")
}

fn is_blank(chunk: &str) -> bool {
    chunk
        .lines()
        .map(str::trim)
        .all(|l| l.is_empty() || l.starts_with('#'))
}

/// Split `text` into its YAML documents. Blank or comment-only documents are skipped.
pub fn split_documents<'a>(path: &'a Path, text: &str) -> Result<Vec<Document<'a>>, ModelError> {
    let mut chunks: Vec<(usize, String)> = Vec::new();
    let mut current = String::new();
    let mut start = 0usize;
    for (idx, line) in text.lines().enumerate() {
        if is_separator(line) {
            chunks.push((start, std::mem::take(&mut current)));
            start = idx + 1;
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    chunks.push((start, current));

    let mut documents = Vec::new();
    for (line_offset, chunk) in chunks {
        if is_blank(&chunk) {
            continue;
        }
        let root = marked_yaml::parse_yaml(0, &chunk).map_err(|e| {
            ModelError::structural(
                path,
                Position {
                    line: line_offset + 1,
                    column: 1,
                },
                format!("malformed document: {}", e),
            )
        })?;
        documents.push(Document {
            path,
            root,
            line_offset,
            source: chunk,
        });
    }
    Ok(documents)
}

/// Interpret a plain YAML scalar as a JSON literal.
fn scalar_literal(s: &str) -> Value {
    match s {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "~" | "null" => return Value::Null,
        _ => {}
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = s.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            if f.is_finite() && s.chars().any(|c| c.is_ascii_digit()) {
                return Value::Number(n);
            }
        }
    }
    Value::String(s.to_string())
}
