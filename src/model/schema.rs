//! Published document grammar (JSON Schema) and shape validation ahead of the positional parse.

use crate::error::ModelError;
use crate::model::document::Document;
use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde_json::{json, Value};

/// Which grammar a document is checked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    Descriptor,
    Class,
    Domain,
}

/// Free text: labels and comments may look like numbers or booleans to YAML.
fn text() -> Value {
    json!({ "type": ["string", "number", "boolean"] })
}

pub fn descriptor_schema() -> Value {
    json!({
        "type": "object",
        "required": ["app", "module", "kind"],
        "additionalProperties": false,
        "properties": {
            "app": text(),
            "module": text(),
            "kind": { "enum": ["data", "business"] },
            "uses": { "type": "array", "items": { "type": "string" } }
        }
    })
}

pub fn class_schema() -> Value {
    json!({
        "type": "object",
        "required": ["class"],
        "additionalProperties": false,
        "properties": {
            "class": {
                "type": "object",
                "required": ["name", "label", "properties"],
                "additionalProperties": false,
                "properties": {
                    "name": { "type": "string" },
                    "trigram": { "type": "string" },
                    "sqlName": { "type": "string" },
                    "extends": { "type": "string" },
                    "label": text(),
                    "comment": text(),
                    "reference": { "type": "boolean" },
                    "orderProperty": { "type": "string" },
                    "defaultProperty": { "type": "string" },
                    "flagProperty": { "type": "string" },
                    "properties": { "type": "array", "items": { "$ref": "#/$defs/property" } },
                    "values": {
                        "type": "object",
                        "additionalProperties": { "type": "object" }
                    }
                }
            }
        },
        "$defs": {
            "property": {
                "type": "object",
                "minProperties": 1,
                "additionalProperties": false,
                "properties": {
                    "name": { "type": "string" },
                    "label": text(),
                    "comment": text(),
                    "domain": { "type": "string" },
                    "primaryKey": { "type": "boolean" },
                    "required": { "type": "boolean" },
                    "defaultValue": { "type": ["string", "number", "boolean", "null"] },
                    "association": { "type": "string" },
                    "type": { "enum": ["oneToOne", "manyToOne", "manyToMany", "oneToMany"] },
                    "role": text(),
                    "composition": { "type": "string" },
                    "kind": { "enum": ["object", "list", "asyncList"] },
                    "alias": {
                        "type": "object",
                        "required": ["class", "property"],
                        "additionalProperties": false,
                        "properties": {
                            "class": { "type": "string" },
                            "property": { "type": "string" }
                        }
                    },
                    "prefix": { "type": "string" },
                    "suffix": { "type": "string" },
                    "listDomain": { "type": "string" }
                }
            }
        }
    })
}

pub fn domain_schema() -> Value {
    json!({
        "type": "object",
        "required": ["domain"],
        "additionalProperties": false,
        "properties": {
            "domain": {
                "type": "object",
                "required": ["name", "kind"],
                "additionalProperties": false,
                "properties": {
                    "name": { "type": "string" },
                    "label": text(),
                    "code": text(),
                    "kind": {
                        "enum": [
                            "string", "integer", "decimal", "boolean", "date", "datetime",
                            "binary", "list", "object"
                        ]
                    },
                    "types": { "type": "object", "additionalProperties": { "type": "string" } },
                    "length": { "type": "integer", "minimum": 0 },
                    "scale": { "type": "integer", "minimum": 0 },
                    "format": { "type": "string" },
                    "autoGenerated": { "type": "boolean" }
                }
            }
        }
    })
}

/// Compiled validators for the three document grammars.
pub struct SchemaValidator {
    descriptor: Validator,
    class: Validator,
    domain: Validator,
}

impl SchemaValidator {
    pub fn new() -> Result<Self, ModelError> {
        let compile = |schema: Value| {
            jsonschema::validator_for(&schema)
                .map_err(|e| ModelError::Config(format!("invalid schema: {}", e)))
        };
        Ok(SchemaValidator {
            descriptor: compile(descriptor_schema())?,
            class: compile(class_schema())?,
            domain: compile(domain_schema())?,
        })
    }

    /// Check a document's shape. All violations are reported together, each anchored to the
    /// position of the node it concerns.
    pub fn validate(&self, kind: DocumentKind, doc: &Document<'_>) -> Result<(), ModelError> {
        let validator = match kind {
            DocumentKind::Descriptor => &self.descriptor,
            DocumentKind::Class => &self.class,
            DocumentKind::Domain => &self.domain,
        };
        let instance = doc.to_json(&doc.root);
        let path = doc.path.display();
        let mut violations: Vec<String> = Vec::new();
        for e in validator.iter_errors(&instance) {
            let pointer = e.instance_path.to_string();
            match &e.kind {
                // Unknown keys are anchored at the key itself, not at the enclosing mapping.
                ValidationErrorKind::AdditionalProperties { unexpected } => {
                    for key in unexpected {
                        let at = doc
                            .key_position(&pointer, key)
                            .unwrap_or_else(|| doc.pointer_position(&pointer));
                        violations.push(format!("{}{} - unknown key '{}'", path, at, key));
                    }
                }
                _ => violations.push(format!("{}{} - {}", path, doc.pointer_position(&pointer), e)),
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Schema {
                path: doc.path.to_path_buf(),
                violations,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::document::split_documents;
    use std::path::Path;

    #[test]
    fn accepts_well_formed_class() {
        let text = "class:\n  name: Order\n  label: Commande\n  properties:\n    - name: Id\n      domain: DO_ID\n      primaryKey: true\n";
        let docs = split_documents(Path::new("order.model"), text).unwrap();
        let validator = SchemaValidator::new().unwrap();
        validator.validate(DocumentKind::Class, &docs[0]).unwrap();
    }

    #[test]
    fn unknown_key_is_reported_with_position() {
        let text = "class:\n  name: Order\n  label: Commande\n  properties:\n    - name: Id\n      domian: DO_ID\n";
        let docs = split_documents(Path::new("order.model"), text).unwrap();
        let validator = SchemaValidator::new().unwrap();
        match validator.validate(DocumentKind::Class, &docs[0]) {
            Err(ModelError::Schema { violations, .. }) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0], "order.model[6,7] - unknown key 'domian'");
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn descriptor_kind_is_an_enum() {
        let docs = split_documents(Path::new("a.model"), "app: Shop\nmodule: Sales\nkind: other\n").unwrap();
        let validator = SchemaValidator::new().unwrap();
        assert!(validator.validate(DocumentKind::Descriptor, &docs[0]).is_err());
    }

    #[test]
    fn quoted_numeric_trigram_is_a_string() {
        let text = "class:\n  name: Order\n  trigram: \"100\"\n  label: Commande\n  properties: []\n";
        let docs = split_documents(Path::new("order.model"), text).unwrap();
        let validator = SchemaValidator::new().unwrap();
        validator.validate(DocumentKind::Class, &docs[0]).unwrap();
    }

    #[test]
    fn every_unknown_key_gets_its_own_position() {
        let text = "class:\n  name: Order\n  label: Commande\n  colour: red\n  size: 3\n  properties: []\n";
        let docs = split_documents(Path::new("order.model"), text).unwrap();
        let validator = SchemaValidator::new().unwrap();
        match validator.validate(DocumentKind::Class, &docs[0]) {
            Err(ModelError::Schema { mut violations, .. }) => {
                violations.sort();
                assert_eq!(
                    violations,
                    vec![
                        "order.model[4,3] - unknown key 'colour'".to_string(),
                        "order.model[5,3] - unknown key 'size'".to_string(),
                    ]
                );
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }
}
