//! Reference values: loading the external reference-data file and attaching literal
//! instances (inline `values` blocks plus external data) to resolved reference classes.

use crate::error::ModelError;
use crate::model::graph::ModelGraph;
use crate::model::types::*;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Read reference data (`class -> instance -> property -> literal`). A missing file is empty.
pub fn load_reference_data(path: &Path) -> Result<ReferenceData, ModelError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no reference data file");
        return Ok(ReferenceData::new());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| ModelError::from_io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| {
        ModelError::structural(
            path,
            Position {
                line: e.line(),
                column: e.column(),
            },
            format!("invalid reference data: {}", e),
        )
    })
}

/// Attach reference values to every class of the graph. Runs after all files are resolved;
/// any failure is immediate and leaves the graph untouched.
pub fn attach(graph: &mut ModelGraph) -> Result<(), ModelError> {
    let source: PathBuf = graph
        .reference_source()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("<reference data>"));

    let known: HashSet<&str> = graph.classes().map(|(_, c)| c.name.as_str()).collect();
    for class_name in graph.reference_data().keys() {
        if !known.contains(class_name.as_str()) {
            return Err(ModelError::invariant(
                &source,
                format!("reference data given for undeclared class '{}'", class_name),
            ));
        }
    }

    let mut attached: BTreeMap<ClassRef, Vec<ReferenceValue>> = BTreeMap::new();
    for file in graph.files() {
        for class in &file.classes {
            let external = graph.reference_data().get(&class.name);
            if class.inline_values.is_empty() && external.is_none() {
                continue;
            }
            if !class.reference {
                return Err(ModelError::invariant(
                    &source,
                    format!(
                        "reference data given for class '{}' which is not a reference class",
                        class.name
                    ),
                ));
            }
            let mut values: Vec<ReferenceValue> = Vec::new();
            for inline in &class.inline_values {
                let value = check_value(graph, &file.path, class, &inline.name, &inline.values)?;
                values.push(value);
            }
            for (instance, literals) in external.into_iter().flatten() {
                if values.iter().any(|v| &v.name == instance) {
                    return Err(ModelError::invariant(
                        &source,
                        format!(
                            "value '{}' of class '{}' is declared more than once",
                            instance, class.name
                        ),
                    ));
                }
                values.push(check_value(graph, &source, class, instance, literals)?);
            }
            attached.insert(file.class_ref(&class.name), values);
        }
    }

    let mut count = 0usize;
    for file in graph.files_mut() {
        for class in &mut file.classes {
            let key = ClassRef {
                file: file.id.clone(),
                class: class.name.clone(),
            };
            class.reference_values = attached.remove(&key).unwrap_or_default();
            count += class.reference_values.len();
        }
    }
    tracing::debug!(values = count, "attached reference values");
    Ok(())
}

fn check_value(
    graph: &ModelGraph,
    path: &Path,
    class: &Class,
    instance: &str,
    literals: &BTreeMap<String, serde_json::Value>,
) -> Result<ReferenceValue, ModelError> {
    for name in literals.keys() {
        if class.property(name).is_none() {
            return Err(ModelError::invariant(
                path,
                format!(
                    "value '{}' references unknown property '{}' of class '{}'",
                    instance, name, class.name
                ),
            ));
        }
    }
    let generated_key = class
        .primary_key()
        .filter(|pk| is_generated(graph, pk))
        .map(|pk| pk.name.as_str());
    for p in &class.properties {
        let name = p.name();
        if !p.is_required()
            || literals.contains_key(&name)
            || generated_key == Some(name.as_str())
        {
            continue;
        }
        return Err(ModelError::invariant(
            path,
            format!(
                "value '{}' of class '{}' is missing required property '{}'",
                instance, class.name, name
            ),
        ));
    }
    Ok(ReferenceValue {
        name: instance.to_string(),
        values: literals.clone(),
    })
}

fn is_generated(graph: &ModelGraph, key: &RegularProperty) -> bool {
    key.domain
        .get()
        .and_then(|d| graph.domain(d))
        .map(|d| d.auto_generated)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parser::{parse_source, SourceFile};
    use crate::model::resolver::resolve_file;
    use crate::model::schema::SchemaValidator;
    use serde_json::json;

    const DOMAINS: &str = "domain:\n  name: DO_ID\n  kind: integer\n  autoGenerated: true\n---\ndomain:\n  name: DO_CODE\n  kind: string\n---\ndomain:\n  name: DO_LIBELLE\n  kind: string\n";
    const STATUS: &str = "app: Shop\nmodule: Ref\nkind: data\n---\nclass:\n  name: Status\n  label: Statut\n  reference: true\n  properties:\n    - name: Id\n      domain: DO_ID\n      primaryKey: true\n    - name: Label\n      domain: DO_LIBELLE\n      required: true\n  values:\n    Active:\n      Label: Actif\n---\nclass:\n  name: Country\n  label: Pays\n  reference: true\n  properties:\n    - name: Code\n      domain: DO_CODE\n      primaryKey: true\n    - name: Label\n      domain: DO_LIBELLE\n";

    fn resolved(data: serde_json::Value) -> ModelGraph {
        let schemas = SchemaValidator::new().unwrap();
        let mut graph = ModelGraph::new();
        if let SourceFile::Domains(d) = parse_source("domains", Path::new("domains.model"), DOMAINS, &schemas).unwrap() {
            graph.insert_domain_file(d);
        }
        if let SourceFile::Model(m) = parse_source("ref", Path::new("ref.model"), STATUS, &schemas).unwrap() {
            graph.insert_file(m);
        }
        assert!(resolve_file(&mut graph, "ref").unwrap().is_empty());
        graph.set_reference_data(serde_json::from_value(data).unwrap(), Some(PathBuf::from("reference.json")));
        graph
    }

    #[test]
    fn attaches_inline_and_external_values() {
        let mut graph = resolved(json!({
            "Country": { "France": { "Code": "FR", "Label": "France" } },
            "Status": { "Closed": { "Label": "Clos" } }
        }));
        attach(&mut graph).unwrap();
        let status = graph.file("ref").unwrap().class("Status").unwrap();
        let names: Vec<&str> = status.reference_values.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Active", "Closed"]);
        let country = graph.file("ref").unwrap().class("Country").unwrap();
        assert_eq!(country.reference_values[0].values.get("Code"), Some(&json!("FR")));
    }

    #[test]
    fn missing_key_without_generated_domain_fails() {
        let mut graph = resolved(json!({ "Country": { "France": { "Label": "France" } } }));
        let err = attach(&mut graph).unwrap_err();
        assert_eq!(
            err.to_string(),
            "reference.json - value 'France' of class 'Country' is missing required property 'Code'"
        );
    }

    #[test]
    fn unknown_class_fails() {
        let mut graph = resolved(json!({ "Currency": { "Euro": { "Code": "EUR" } } }));
        assert!(attach(&mut graph)
            .unwrap_err()
            .to_string()
            .contains("undeclared class 'Currency'"));
    }

    #[test]
    fn unknown_property_fails() {
        let mut graph = resolved(json!({ "Country": { "France": { "Code": "FR", "Name": "France" } } }));
        assert!(attach(&mut graph)
            .unwrap_err()
            .to_string()
            .contains("unknown property 'Name'"));
    }

    #[test]
    fn missing_file_is_empty_data() {
        let data = load_reference_data(Path::new("/nonexistent/reference.json")).unwrap();
        assert!(data.is_empty());
    }
}
