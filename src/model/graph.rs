//! The entity graph arena: every loaded model file, every domain file and the external
//! reference data, keyed by stable identities. Mutation is crate-private and funnels through
//! the loader, resolver and attacher; consumers only get read access.

use crate::error::ModelError;
use crate::model::types::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default)]
pub struct ModelGraph {
    files: BTreeMap<String, ModelFile>,
    domain_files: BTreeMap<String, DomainFile>,
    reference_data: ReferenceData,
    reference_source: Option<PathBuf>,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> impl Iterator<Item = &ModelFile> {
        self.files.values()
    }

    pub fn file(&self, id: &str) -> Option<&ModelFile> {
        self.files.get(id)
    }

    pub fn file_ids(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    pub fn domain_files(&self) -> impl Iterator<Item = &DomainFile> {
        self.domain_files.values()
    }

    pub fn domain_file(&self, id: &str) -> Option<&DomainFile> {
        self.domain_files.get(id)
    }

    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.domain_files.values().flat_map(|f| f.domains.iter())
    }

    /// Domains are global: any loaded domain file can provide one.
    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains().find(|d| d.name == name)
    }

    pub fn class(&self, r: &ClassRef) -> Option<&Class> {
        self.files.get(&r.file).and_then(|f| f.class(&r.class))
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassRef, &Class)> {
        self.files
            .values()
            .flat_map(|f| f.classes.iter().map(move |c| (f.class_ref(&c.name), c)))
    }

    pub fn class_by_name(&self, name: &str) -> Option<(ClassRef, &Class)> {
        self.classes().find(|(_, c)| c.name == name)
    }

    pub fn reference_data(&self) -> &ReferenceData {
        &self.reference_data
    }

    pub fn reference_source(&self) -> Option<&Path> {
        self.reference_source.as_deref()
    }

    /// Ids of the files `id` declares, directly or transitively. Unknown ids are skipped.
    pub fn dependency_closure(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(file) = self.files.get(current) {
                for dep in &file.descriptor.uses {
                    if seen.insert(dep.file.clone()) {
                        stack.push(dep.file.as_str());
                    }
                }
            }
        }
        seen.remove(id);
        seen
    }

    /// Ids of the loaded files whose transitive dependencies include `id`.
    pub fn dependents_of(&self, id: &str) -> BTreeSet<String> {
        self.files
            .keys()
            .filter(|other| other.as_str() != id && self.dependency_closure(other).contains(id))
            .cloned()
            .collect()
    }

    /// Resolved `source -> target` pairs across the graph, in a stable order.
    pub fn link_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (owner, class) in self.classes() {
            if let Some(parent) = class.extends.get() {
                pairs.push((format!("{} extends", owner), parent.to_string()));
            }
            for p in &class.properties {
                let source = format!("{}.{}", owner, p.name());
                match p {
                    Property::Regular(r) => {
                        if let Some(d) = r.domain.get() {
                            pairs.push((source, d.clone()));
                        }
                    }
                    Property::Association(a) => {
                        if let Some(t) = a.target.get() {
                            pairs.push((source, t.to_string()));
                        }
                    }
                    Property::Composition(c) => {
                        if let Some(t) = c.target.get() {
                            pairs.push((source, t.to_string()));
                        }
                    }
                    Property::Alias(a) => {
                        if let Some(t) = a.target.get() {
                            pairs.push((source.clone(), format!("{}.{}", t.class, t.property)));
                        }
                        if let Some(d) = a.list_domain.get() {
                            pairs.push((source, d.clone()));
                        }
                    }
                }
            }
        }
        pairs
    }

    pub(crate) fn insert_file(&mut self, file: ModelFile) -> Option<ModelFile> {
        self.domain_files.remove(&file.id);
        self.files.insert(file.id.clone(), file)
    }

    pub(crate) fn remove_file(&mut self, id: &str) -> Option<ModelFile> {
        self.files.remove(id)
    }

    pub(crate) fn insert_domain_file(&mut self, file: DomainFile) -> Option<DomainFile> {
        self.files.remove(&file.id);
        self.domain_files.insert(file.id.clone(), file)
    }

    pub(crate) fn remove_domain_file(&mut self, id: &str) -> Option<DomainFile> {
        self.domain_files.remove(id)
    }

    pub(crate) fn file_mut(&mut self, id: &str) -> Option<&mut ModelFile> {
        self.files.get_mut(id)
    }

    pub(crate) fn files_mut(&mut self) -> impl Iterator<Item = &mut ModelFile> {
        self.files.values_mut()
    }

    pub(crate) fn set_reference_data(&mut self, data: ReferenceData, source: Option<PathBuf>) {
        self.reference_data = data;
        self.reference_source = source;
    }

    /// Class names must be unique across the loaded set, domain names across all domain files.
    pub(crate) fn check_unique_names(&self) -> Result<(), ModelError> {
        let mut classes: HashMap<&str, &ModelFile> = HashMap::new();
        for file in self.files.values() {
            for class in &file.classes {
                if let Some(first) = classes.insert(class.name.as_str(), file) {
                    return Err(ModelError::structural(
                        &file.path,
                        class.position,
                        format!(
                            "class '{}' is already declared in {}",
                            class.name,
                            first.path.display()
                        ),
                    ));
                }
            }
        }
        let mut domains: HashMap<&str, &DomainFile> = HashMap::new();
        for file in self.domain_files.values() {
            for domain in &file.domains {
                if let Some(first) = domains.insert(domain.name.as_str(), file) {
                    return Err(ModelError::structural(
                        &file.path,
                        domain.position,
                        format!(
                            "domain '{}' is already declared in {}",
                            domain.name,
                            first.path.display()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}
