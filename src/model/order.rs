//! Dependency ordering of model files (Kahn's algorithm, ties broken by file id).

use crate::error::ModelError;
use crate::model::types::ModelFile;
use std::collections::{BTreeMap, BTreeSet};

/// Order files so every file comes after all the files it `uses`.
///
/// Deterministic for a given file set. A `uses` entry naming a file that is not loaded is a
/// structural error; a cycle fails with the ids of the files forming it.
pub fn order<'a, I>(files: I) -> Result<Vec<String>, ModelError>
where
    I: IntoIterator<Item = &'a ModelFile>,
{
    let files: BTreeMap<&str, &ModelFile> = files.into_iter().map(|f| (f.id.as_str(), f)).collect();

    let mut in_degree: BTreeMap<&str, usize> = files.keys().map(|id| (*id, 0)).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for file in files.values() {
        for dep in &file.descriptor.uses {
            if !files.contains_key(dep.file.as_str()) {
                return Err(ModelError::structural(
                    &file.path,
                    dep.position,
                    format!("dependency '{}' is not a loaded model file", dep.file),
                ));
            }
            dependents.entry(dep.file.as_str()).or_default().push(file.id.as_str());
            *in_degree.entry(file.id.as_str()).or_default() += 1;
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut sorted: Vec<String> = Vec::with_capacity(files.len());
    while let Some(id) = ready.pop_first() {
        sorted.push(id.to_string());
        for next in dependents.get(id).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(d) = in_degree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    ready.insert(*next);
                }
            }
        }
    }

    if sorted.len() != files.len() {
        let blocked: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(id, _)| *id)
            .collect();
        let members = find_cycle(&files, &blocked);
        tracing::error!(members = ?members, "dependency cycle");
        return Err(ModelError::Cycle { members });
    }
    Ok(sorted)
}

/// Every blocked file still waits on another blocked file, so walking dependencies from the
/// smallest blocked id must revisit a file; the loop from that file is the cycle.
fn find_cycle(files: &BTreeMap<&str, &ModelFile>, blocked: &BTreeSet<&str>) -> Vec<String> {
    let mut path: Vec<&str> = Vec::new();
    let mut current = match blocked.first() {
        Some(id) => *id,
        None => return Vec::new(),
    };
    loop {
        if let Some(start) = path.iter().position(|id| *id == current) {
            return path[start..].iter().map(|id| id.to_string()).collect();
        }
        path.push(current);
        let next = files.get(current).and_then(|f| {
            f.descriptor
                .uses
                .iter()
                .map(|d| d.file.as_str())
                .filter(|d| blocked.contains(d))
                .min()
        });
        match next {
            Some(n) => current = n,
            None => return blocked.iter().map(|id| id.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn file(id: &str, uses: &[&str]) -> ModelFile {
        ModelFile {
            id: id.to_string(),
            path: PathBuf::from(format!("{}.model", id)),
            descriptor: FileDescriptor {
                namespace: Namespace {
                    app: "Shop".into(),
                    module: id.into(),
                    kind: NamespaceKind::Data,
                },
                uses: uses
                    .iter()
                    .map(|u| FileDependency {
                        file: u.to_string(),
                        position: Position { line: 5, column: 5 },
                    })
                    .collect(),
            },
            classes: Vec::new(),
            relations: Default::default(),
        }
    }

    #[test]
    fn dependencies_come_first_and_ties_break_on_id() {
        let files = vec![
            file("order", &["customer", "product"]),
            file("product", &[]),
            file("customer", &["address"]),
            file("address", &[]),
            file("audit", &[]),
        ];
        let sorted = order(&files).unwrap();
        assert_eq!(sorted, vec!["address", "audit", "customer", "product", "order"]);
        for f in &files {
            let pos = sorted.iter().position(|s| *s == f.id).unwrap();
            for dep in &f.descriptor.uses {
                let dep_pos = sorted.iter().position(|s| *s == dep.file).unwrap();
                assert!(dep_pos < pos, "{} must precede {}", dep.file, f.id);
            }
        }
    }

    #[test]
    fn order_is_independent_of_input_order() {
        let a = vec![file("b", &["a"]), file("a", &[]), file("c", &[])];
        let b = vec![file("c", &[]), file("a", &[]), file("b", &["a"])];
        assert_eq!(order(&a).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(order(&a).unwrap(), order(&b).unwrap());
    }

    #[test]
    fn cycle_is_rejected_with_its_members() {
        let files = vec![file("a", &["b"]), file("b", &["a"]), file("c", &["a"]), file("d", &[])];
        match order(&files) {
            Err(ModelError::Cycle { members }) => assert_eq!(members, vec!["a", "b"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        match order(&[file("a", &["a"])]) {
            Err(ModelError::Cycle { members }) => assert_eq!(members, vec!["a"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn unknown_dependency_is_structural() {
        let err = order(&[file("order", &["customer"])]).unwrap_err();
        assert!(matches!(err, ModelError::Structural { line: 5, column: 5, .. }));
        assert!(err.to_string().contains("'customer' is not a loaded model file"));
    }
}
