//! Binds the relations of one model file to classes, domains and properties.
//!
//! Unresolved names never abort the pass: each one becomes a positioned [`Diagnostic`] and
//! the walk continues, so one run reports every broken reference of the file. Invariant
//! violations found afterwards are hard failures.

use crate::error::{Diagnostic, ModelError};
use crate::model::graph::ModelGraph;
use crate::model::types::*;
use std::collections::{BTreeSet, HashMap, HashSet};

/// What a relation was bound to.
enum Binding {
    Class(ClassRef),
    Domain(String),
    Property(PropertyRef),
    OwnProperty(String),
}

/// Classes a file may reference: its own plus those of its transitive dependencies.
struct Visible<'g> {
    classes: HashMap<&'g str, (ClassRef, &'g Class)>,
}

impl<'g> Visible<'g> {
    fn new(graph: &'g ModelGraph, file_id: &str) -> Self {
        let mut ids: BTreeSet<String> = graph.dependency_closure(file_id);
        ids.insert(file_id.to_string());
        let mut classes = HashMap::new();
        for id in &ids {
            if let Some(file) = graph.file(id) {
                for class in &file.classes {
                    classes
                        .entry(class.name.as_str())
                        .or_insert_with(|| (file.class_ref(&class.name), class));
                }
            }
        }
        Visible { classes }
    }

    fn class(&self, name: &str) -> Option<&(ClassRef, &'g Class)> {
        self.classes.get(name)
    }
}

/// Resolve every relation of `file_id` against the graph, mutating the file's classes.
///
/// Returns the soft diagnostics (empty on success). Errors only for invariant violations.
pub fn resolve_file(graph: &mut ModelGraph, file_id: &str) -> Result<Vec<Diagnostic>, ModelError> {
    let (bindings, diagnostics) = {
        let file = graph
            .file(file_id)
            .ok_or_else(|| ModelError::Config(format!("model file '{}' is not loaded", file_id)))?;
        bind(graph, file)
    };

    let file = graph
        .file_mut(file_id)
        .ok_or_else(|| ModelError::Config(format!("model file '{}' is not loaded", file_id)))?;
    reset_links(file);
    for (key, binding) in bindings {
        apply(file, key, binding);
    }

    tracing::debug!(file = %file_id, diagnostics = diagnostics.len(), "resolved model file");
    if let Err(e) = check_invariants(graph, file_id) {
        for d in &diagnostics {
            tracing::warn!("{}", d);
        }
        return Err(e);
    }
    Ok(diagnostics)
}

fn bind(graph: &ModelGraph, file: &ModelFile) -> (Vec<(RelationKey, Binding)>, Vec<Diagnostic>) {
    let visible = Visible::new(graph, &file.id);
    let mut bindings = Vec::new();
    let mut diagnostics = Vec::new();
    let class_not_found = |relation: &Relation| {
        Diagnostic::new(
            &file.path,
            relation.position,
            format!("class '{}' not found in file or its dependencies", relation.text),
        )
    };

    for (key, relation) in &file.relations {
        let owner_class = match key.owner {
            RelationOwner::Class { class } | RelationOwner::Property { class, .. } => {
                &file.classes[class]
            }
        };
        match key.slot {
            RelationSlot::Extends | RelationSlot::Target => match visible.class(&relation.text) {
                Some((r, _)) => bindings.push((*key, Binding::Class(r.clone()))),
                None => diagnostics.push(class_not_found(relation)),
            },
            RelationSlot::Domain | RelationSlot::ListDomain => match graph.domain(&relation.text) {
                Some(d) => bindings.push((*key, Binding::Domain(d.name.clone()))),
                None => diagnostics.push(Diagnostic::new(
                    &file.path,
                    relation.position,
                    format!("domain '{}' not found", relation.text),
                )),
            },
            RelationSlot::AliasClass => {
                let Some(peer) = relation.peer.as_deref() else {
                    diagnostics.push(Diagnostic::new(
                        &file.path,
                        relation.position,
                        format!("alias of '{}' does not name a class", relation.text),
                    ));
                    continue;
                };
                match visible.class(&peer.text) {
                    Some((r, class)) => {
                        if class.property(&relation.text).is_some() {
                            bindings.push((
                                *key,
                                Binding::Property(PropertyRef {
                                    class: r.clone(),
                                    property: relation.text.clone(),
                                }),
                            ));
                        } else {
                            diagnostics.push(Diagnostic::new(
                                &file.path,
                                relation.position,
                                format!(
                                    "property '{}' not found on class '{}'",
                                    relation.text, peer.text
                                ),
                            ));
                        }
                    }
                    None => diagnostics.push(class_not_found(peer)),
                }
            }
            RelationSlot::DefaultProperty
            | RelationSlot::OrderProperty
            | RelationSlot::FlagProperty => {
                if owner_class.property(&relation.text).is_some() {
                    bindings.push((*key, Binding::OwnProperty(relation.text.clone())));
                } else {
                    diagnostics.push(Diagnostic::new(
                        &file.path,
                        relation.position,
                        format!(
                            "property '{}' not found on class '{}'",
                            relation.text, owner_class.name
                        ),
                    ));
                }
            }
        }
    }
    (bindings, diagnostics)
}

fn reset_links(file: &mut ModelFile) {
    for class in &mut file.classes {
        class.extends = Link::Unresolved;
        class.default_property = None;
        class.order_property = None;
        class.flag_property = None;
        for p in &mut class.properties {
            match p {
                Property::Regular(r) => r.domain = Link::Unresolved,
                Property::Association(a) => a.target = Link::Unresolved,
                Property::Composition(c) => c.target = Link::Unresolved,
                Property::Alias(a) => {
                    a.target = Link::Unresolved;
                    a.list_domain = Link::Unresolved;
                }
            }
        }
    }
}

fn apply(file: &mut ModelFile, key: RelationKey, binding: Binding) {
    match (key.owner, binding) {
        (RelationOwner::Class { class }, Binding::Class(r)) => {
            file.classes[class].extends = Link::Resolved(r)
        }
        (RelationOwner::Class { class }, Binding::OwnProperty(name)) => {
            let c = &mut file.classes[class];
            match key.slot {
                RelationSlot::DefaultProperty => c.default_property = Some(name),
                RelationSlot::OrderProperty => c.order_property = Some(name),
                _ => c.flag_property = Some(name),
            }
        }
        (RelationOwner::Property { class, property }, binding) => {
            match (&mut file.classes[class].properties[property], binding) {
                (Property::Regular(r), Binding::Domain(d)) => r.domain = Link::Resolved(d),
                (Property::Association(a), Binding::Class(r)) => a.target = Link::Resolved(r),
                (Property::Composition(c), Binding::Class(r)) => c.target = Link::Resolved(r),
                (Property::Alias(a), Binding::Property(r)) => a.target = Link::Resolved(r),
                (Property::Alias(a), Binding::Domain(d)) => a.list_domain = Link::Resolved(d),
                (p, _) => tracing::warn!(
                    property = %p.name(),
                    kind = p.kind_name(),
                    slot = ?key.slot,
                    "binding does not fit property"
                ),
            }
        }
        (owner, _) => {
            tracing::warn!(owner = ?owner, slot = ?key.slot, "binding does not fit class")
        }
    }
}

/// Hard checks run once a file's relations are bound.
fn check_invariants(graph: &ModelGraph, file_id: &str) -> Result<(), ModelError> {
    let Some(file) = graph.file(file_id) else {
        return Ok(());
    };
    for class in &file.classes {
        let keys: Vec<String> = class
            .properties
            .iter()
            .filter(|p| p.is_primary_key())
            .map(Property::name)
            .collect();
        if keys.len() > 1 {
            return Err(ModelError::invariant(
                &file.path,
                format!(
                    "class '{}' declares more than one primary key: {}",
                    class.name,
                    keys.join(", ")
                ),
            ));
        }

        let mut names: HashSet<String> = HashSet::new();
        for p in &class.properties {
            let name = p.name();
            if names.insert(name.clone()) {
                continue;
            }
            let message = match p {
                Property::Association(a) if a.role.is_none() => format!(
                    "class '{}' has several associations to '{}' without a role; \
                     add a role to each to disambiguate",
                    class.name, a.target_name
                ),
                _ => format!("class '{}' declares property '{}' more than once", class.name, name),
            };
            return Err(ModelError::invariant(&file.path, message));
        }

        if class.persistent {
            for p in &class.properties {
                if let Property::Association(a) = p {
                    let Some(target_ref) = a.target.get() else { continue };
                    if let Some(target) = graph.class(target_ref) {
                        if !target.persistent {
                            return Err(ModelError::invariant(
                                &file.path,
                                format!(
                                    "association '{}' of persistent class '{}' \
                                     targets non-persistent class '{}'",
                                    p.name(),
                                    class.name,
                                    target.name
                                ),
                            ));
                        }
                    }
                }
            }
        }

        let mut seen: HashSet<&ClassRef> = HashSet::new();
        let mut parent = class.extends.get();
        while let Some(r) = parent {
            if r.class == class.name && r.file == file.id || !seen.insert(r) {
                return Err(ModelError::invariant(
                    &file.path,
                    format!("class '{}' is part of an inheritance cycle", class.name),
                ));
            }
            parent = graph.class(r).and_then(|c| c.extends.get());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parser::{parse_source, SourceFile};
    use crate::model::schema::SchemaValidator;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    const DOMAINS: &str = "domain:\n  name: DO_ID\n  kind: integer\n  autoGenerated: true\n---\ndomain:\n  name: DO_LIBELLE\n  kind: string\n";

    fn graph(sources: &[(&str, &str)]) -> ModelGraph {
        let schemas = SchemaValidator::new().unwrap();
        let mut graph = ModelGraph::new();
        for (id, text) in sources {
            let path = format!("{}.model", id);
            match parse_source(id, Path::new(&path), text, &schemas).unwrap() {
                SourceFile::Model(f) => {
                    graph.insert_file(f);
                }
                SourceFile::Domains(f) => {
                    graph.insert_domain_file(f);
                }
            }
        }
        graph
    }

    const CUSTOMER: &str = "app: Shop\nmodule: Customer\nkind: data\n---\nclass:\n  name: Customer\n  label: Client\n  defaultProperty: Name\n  properties:\n    - name: Id\n      domain: DO_ID\n      primaryKey: true\n    - name: Name\n      domain: DO_LIBELLE\n    - association: Address\n      type: manyToOne\n---\nclass:\n  name: Address\n  label: Adresse\n  properties:\n    - name: Id\n      domain: DO_ID\n      primaryKey: true\n";

    #[test]
    fn forward_reference_in_same_file_resolves() {
        let mut g = graph(&[("domains", DOMAINS), ("customer", CUSTOMER)]);
        let diagnostics = resolve_file(&mut g, "customer").unwrap();
        assert_eq!(diagnostics, vec![]);

        let customer = g.file("customer").unwrap().class("Customer").unwrap();
        assert_eq!(customer.default_property.as_deref(), Some("Name"));
        match &customer.properties[2] {
            Property::Association(a) => {
                assert_eq!(a.target.get(), Some(&ClassRef { file: "customer".into(), class: "Address".into() }))
            }
            other => panic!("unexpected {:?}", other),
        }
        match &customer.properties[0] {
            Property::Regular(r) => assert_eq!(r.domain.get().map(String::as_str), Some("DO_ID")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn undeclared_dependency_is_not_visible() {
        let order = "app: Shop\nmodule: Order\nkind: data\n---\nclass:\n  name: Order\n  label: Commande\n  properties:\n    - name: Id\n      domain: DO_ID\n      primaryKey: true\n    - association: Customer\n      type: manyToOne\n";
        let mut g = graph(&[("domains", DOMAINS), ("customer", CUSTOMER), ("order", order)]);
        let diagnostics = resolve_file(&mut g, "order").unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].to_string(),
            "order.model[12,20] - class 'Customer' not found in file or its dependencies"
        );
    }

    #[test]
    fn all_broken_references_are_reported_together() {
        let text = "app: Shop\nmodule: Order\nkind: business\nuses:\n  - customer\n---\nclass:\n  name: Order\n  label: Commande\n  extends: Missing\n  properties:\n    - name: Id\n      domain: DO_NOPE\n    - alias:\n        class: Customer\n        property: Email\n    - alias:\n        class: Customer\n        property: Name\n      listDomain: DO_LIST\n";
        let mut g = graph(&[("domains", DOMAINS), ("customer", CUSTOMER), ("order", text)]);
        let messages: Vec<String> = resolve_file(&mut g, "order")
            .unwrap()
            .into_iter()
            .map(|d| d.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "class 'Missing' not found in file or its dependencies".to_string(),
                "domain 'DO_NOPE' not found".to_string(),
                "property 'Email' not found on class 'Customer'".to_string(),
                "domain 'DO_LIST' not found".to_string(),
            ]
        );
        let order = g.file("order").unwrap().class("Order").unwrap();
        match &order.properties[2] {
            Property::Alias(a) => assert_eq!(
                a.target.get().map(|r| r.property.as_str()),
                Some("Name")
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn two_primary_keys_fail_with_one_error_naming_both() {
        let text = "app: Shop\nmodule: Sales\nkind: data\n---\nclass:\n  name: Order\n  label: Commande\n  properties:\n    - name: Id\n      domain: DO_ID\n      primaryKey: true\n    - name: Code\n      domain: DO_LIBELLE\n      primaryKey: true\n";
        let mut g = graph(&[("domains", DOMAINS), ("order", text)]);
        let err = resolve_file(&mut g, "order").unwrap_err();
        assert_eq!(
            err.to_string(),
            "order.model - class 'Order' declares more than one primary key: Id, Code"
        );
    }

    #[test]
    fn roleless_duplicate_associations_are_ambiguous() {
        let text = "app: Shop\nmodule: Sales\nkind: data\n---\nclass:\n  name: Transfer\n  label: Virement\n  properties:\n    - association: Account\n      type: manyToOne\n    - association: Account\n      type: manyToOne\n---\nclass:\n  name: Account\n  label: Compte\n  properties: []\n";
        let mut g = graph(&[("transfer", text)]);
        let err = resolve_file(&mut g, "transfer").unwrap_err();
        assert!(err.to_string().contains("several associations to 'Account' without a role"));
    }

    #[test]
    fn persistent_class_cannot_target_business_class() {
        let business = "app: Shop\nmodule: View\nkind: business\n---\nclass:\n  name: Basket\n  label: Panier\n  properties: []\n";
        let data = "app: Shop\nmodule: Sales\nkind: data\nuses:\n  - view\n---\nclass:\n  name: Order\n  label: Commande\n  properties:\n    - association: Basket\n      type: manyToOne\n";
        let mut g = graph(&[("view", business), ("sales", data)]);
        let err = resolve_file(&mut g, "sales").unwrap_err();
        assert!(matches!(err, ModelError::Invariant { .. }));
        assert!(err.to_string().contains("targets non-persistent class 'Basket'"));
    }

    #[test]
    fn inheritance_cycle_is_an_invariant_failure() {
        let text = "app: Shop\nmodule: Sales\nkind: business\n---\nclass:\n  name: A\n  label: A\n  extends: B\n  properties: []\n---\nclass:\n  name: B\n  label: B\n  extends: A\n  properties: []\n";
        let mut g = graph(&[("cycle", text)]);
        assert!(resolve_file(&mut g, "cycle").unwrap_err().to_string().contains("inheritance cycle"));
    }

    #[test]
    fn re_resolving_yields_identical_links() {
        let mut g = graph(&[("domains", DOMAINS), ("customer", CUSTOMER)]);
        resolve_file(&mut g, "customer").unwrap();
        let first = g.link_pairs();
        resolve_file(&mut g, "customer").unwrap();
        assert_eq!(first, g.link_pairs());
        assert!(first.contains(&("customer::Customer.Address".to_string(), "customer::Address".to_string())));
    }

    const CART: &str = "app: Shop\nmodule: Cart\nkind: business\n---\nclass:\n  name: Cart\n  label: Panier\n  properties:\n    - composition: CartLine\n      name: Lines\n      kind: list\n---\nclass:\n  name: CartLine\n  label: Ligne\n  properties: []\n";

    #[test]
    fn composition_target_resolves_in_same_file() {
        let mut g = graph(&[("cart", CART)]);
        assert_eq!(resolve_file(&mut g, "cart").unwrap(), vec![]);
        let cart = g.file("cart").unwrap().class("Cart").unwrap();
        match &cart.properties[0] {
            Property::Composition(c) => assert_eq!(
                c.target.get(),
                Some(&ClassRef { file: "cart".into(), class: "CartLine".into() })
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn composition_target_outside_dependencies_is_reported() {
        let wishlist = "app: Shop\nmodule: Wishlist\nkind: business\n---\nclass:\n  name: Wishlist\n  label: Envies\n  properties:\n    - composition: CartLine\n      name: Lines\n      kind: list\n";
        let mut g = graph(&[("cart", CART), ("wishlist", wishlist)]);
        let diagnostics = resolve_file(&mut g, "wishlist").unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].to_string(),
            "wishlist.model[9,20] - class 'CartLine' not found in file or its dependencies"
        );
        let wishlist = g.file("wishlist").unwrap().class("Wishlist").unwrap();
        assert!(matches!(&wishlist.properties[0], Property::Composition(c) if c.target.get().is_none()));
    }
}
