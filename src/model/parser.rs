//! Position-aware parser: turns one model file into class skeletons plus the unresolved
//! relations the resolver binds later, and one domain file into domains.
//!
//! Every document is schema-checked first; the walk below then enforces what the grammar
//! cannot express: header keys before `properties`, property variants chosen by their first
//! key, and `values` blocks checked against the class's own properties.

use crate::case::to_upper_snake_case;
use crate::error::ModelError;
use crate::model::document::{split_documents, Document};
use crate::model::schema::{DocumentKind, SchemaValidator};
use crate::model::types::*;
use marked_yaml::types::{MarkedMappingNode, MarkedScalarNode, Node};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

/// A parsed source file: either a model (namespace + classes) or a set of domains.
#[derive(Clone, Debug)]
pub enum SourceFile {
    Model(ModelFile),
    Domains(DomainFile),
}

/// Parse a file, deciding from its first document whether it declares domains or classes.
pub fn parse_source(
    id: &str,
    path: &Path,
    text: &str,
    schemas: &SchemaValidator,
) -> Result<SourceFile, ModelError> {
    let docs = split_documents(path, text)?;
    let first = docs.first().ok_or_else(|| {
        ModelError::structural(path, Position { line: 1, column: 1 }, "empty model file")
    })?;
    let is_domain_file = first
        .root
        .as_mapping()
        .map(|m| m.get_node("domain").is_some())
        .unwrap_or(false);
    if is_domain_file {
        Ok(SourceFile::Domains(parse_domain_documents(id, path, &docs, schemas)?))
    } else {
        Ok(SourceFile::Model(parse_model_documents(id, path, &docs, schemas)?))
    }
}

pub fn parse_model_file(
    id: &str,
    path: &Path,
    text: &str,
    schemas: &SchemaValidator,
) -> Result<ModelFile, ModelError> {
    let docs = split_documents(path, text)?;
    parse_model_documents(id, path, &docs, schemas)
}

pub fn parse_domain_file(
    id: &str,
    path: &Path,
    text: &str,
    schemas: &SchemaValidator,
) -> Result<DomainFile, ModelError> {
    let docs = split_documents(path, text)?;
    parse_domain_documents(id, path, &docs, schemas)
}

fn parse_model_documents(
    id: &str,
    path: &Path,
    docs: &[Document<'_>],
    schemas: &SchemaValidator,
) -> Result<ModelFile, ModelError> {
    let (first, rest) = docs.split_first().ok_or_else(|| {
        ModelError::structural(path, Position { line: 1, column: 1 }, "empty model file")
    })?;
    if first.mapping()?.get_node("class").is_some() {
        return Err(first.error(
            first.node_position(&first.root),
            "model file must start with a file descriptor (app, module, kind, uses)",
        ));
    }
    schemas.validate(DocumentKind::Descriptor, first)?;
    let descriptor = parse_descriptor(first)?;
    let persistent = descriptor.namespace.kind == NamespaceKind::Data;

    let mut builder = FileBuilder {
        classes: Vec::new(),
        relations: BTreeMap::new(),
    };
    for doc in rest {
        schemas.validate(DocumentKind::Class, doc)?;
        builder.parse_class(doc, persistent)?;
    }

    tracing::debug!(
        file = %id,
        classes = builder.classes.len(),
        relations = builder.relations.len(),
        "parsed model file"
    );
    Ok(ModelFile {
        id: id.to_string(),
        path: path.to_path_buf(),
        descriptor,
        classes: builder.classes,
        relations: builder.relations,
    })
}

fn parse_domain_documents(
    id: &str,
    path: &Path,
    docs: &[Document<'_>],
    schemas: &SchemaValidator,
) -> Result<DomainFile, ModelError> {
    let mut domains: Vec<Domain> = Vec::new();
    for doc in docs {
        schemas.validate(DocumentKind::Domain, doc)?;
        let domain = parse_domain(doc)?;
        if domains.iter().any(|d| d.name == domain.name) {
            return Err(doc.error(domain.position, format!("duplicate domain '{}'", domain.name)));
        }
        domains.push(domain);
    }
    tracing::debug!(file = %id, domains = domains.len(), "parsed domain file");
    Ok(DomainFile {
        id: id.to_string(),
        path: path.to_path_buf(),
        domains,
    })
}

fn identifier_re() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"))
}

fn key_text(key: &MarkedScalarNode) -> &str {
    key.as_str()
}

fn scalar<'n>(
    doc: &Document<'_>,
    node: &'n Node,
    key: &str,
) -> Result<&'n MarkedScalarNode, ModelError> {
    node.as_scalar()
        .ok_or_else(|| doc.error(doc.node_position(node), format!("'{}' must be a scalar", key)))
}

fn text(doc: &Document<'_>, node: &Node, key: &str) -> Result<String, ModelError> {
    Ok(scalar(doc, node, key)?.as_str().to_string())
}

fn identifier(doc: &Document<'_>, node: &Node, key: &str) -> Result<String, ModelError> {
    let s = text(doc, node, key)?;
    if !identifier_re().is_match(&s) {
        return Err(doc.error(
            doc.node_position(node),
            format!("'{}' is not a valid identifier for '{}'", s, key),
        ));
    }
    Ok(s)
}

fn flag(doc: &Document<'_>, node: &Node, key: &str) -> Result<bool, ModelError> {
    match scalar(doc, node, key)?.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(doc.error(
            doc.node_position(node),
            format!("'{}' must be true or false, got '{}'", key, other),
        )),
    }
}

fn number(doc: &Document<'_>, node: &Node, key: &str) -> Result<u32, ModelError> {
    let s = scalar(doc, node, key)?.as_str();
    s.parse::<u32>().map_err(|_| {
        doc.error(
            doc.node_position(node),
            format!("'{}' must be a non-negative integer, got '{}'", key, s),
        )
    })
}

fn mapping<'n>(
    doc: &Document<'_>,
    node: &'n Node,
    key: &str,
) -> Result<&'n MarkedMappingNode, ModelError> {
    node.as_mapping()
        .ok_or_else(|| doc.error(doc.node_position(node), format!("'{}' must be a mapping", key)))
}

fn unknown_key(doc: &Document<'_>, key: &MarkedScalarNode, context: &str) -> ModelError {
    doc.error(
        doc.scalar_position(key),
        format!("unknown key '{}' in {}", key_text(key), context),
    )
}

fn missing_key(doc: &Document<'_>, position: Position, key: &str, context: &str) -> ModelError {
    doc.error(position, format!("missing required key '{}' in {}", key, context))
}

fn parse_descriptor(doc: &Document<'_>) -> Result<FileDescriptor, ModelError> {
    let map = doc.mapping()?;
    let mut app = None;
    let mut module = None;
    let mut kind = None;
    let mut uses = Vec::new();
    for (key, value) in map.iter() {
        match key_text(key) {
            "app" => app = Some(text(doc, value, "app")?),
            "module" => module = Some(text(doc, value, "module")?),
            "kind" => {
                let raw = scalar(doc, value, "kind")?;
                kind = Some(NamespaceKind::parse(raw.as_str()).ok_or_else(|| {
                    doc.error(
                        doc.scalar_position(raw),
                        format!("kind must be 'data' or 'business', got '{}'", raw.as_str()),
                    )
                })?);
            }
            "uses" => {
                let seq = value.as_sequence().ok_or_else(|| {
                    doc.error(doc.node_position(value), "'uses' must be a list of file names")
                })?;
                for entry in seq.iter() {
                    let file = text(doc, entry, "uses")?;
                    if uses.iter().any(|d: &FileDependency| d.file == file) {
                        continue;
                    }
                    uses.push(FileDependency {
                        file,
                        position: doc.node_position(entry),
                    });
                }
            }
            _ => return Err(unknown_key(doc, key, "file descriptor")),
        }
    }
    let at = doc.node_position(&doc.root);
    Ok(FileDescriptor {
        namespace: Namespace {
            app: app.ok_or_else(|| missing_key(doc, at, "app", "file descriptor"))?,
            module: module.ok_or_else(|| missing_key(doc, at, "module", "file descriptor"))?,
            kind: kind.ok_or_else(|| missing_key(doc, at, "kind", "file descriptor"))?,
        },
        uses,
    })
}

fn parse_domain(doc: &Document<'_>) -> Result<Domain, ModelError> {
    let top = doc.mapping()?;
    for (key, _) in top.iter() {
        if key_text(key) != "domain" {
            return Err(unknown_key(doc, key, "domain document"));
        }
    }
    let node = top
        .get_node("domain")
        .ok_or_else(|| {
            missing_key(doc, doc.node_position(&doc.root), "domain", "domain document")
        })?;
    let map = mapping(doc, node, "domain")?;
    let position = doc.node_position(node);

    let mut name = None;
    let mut kind = None;
    let mut domain = Domain {
        name: String::new(),
        label: None,
        code: None,
        kind: ScalarKind::String,
        types: BTreeMap::new(),
        length: None,
        scale: None,
        format: None,
        auto_generated: false,
        position,
    };
    for (key, value) in map.iter() {
        match key_text(key) {
            "name" => name = Some(identifier(doc, value, "name")?),
            "label" => domain.label = Some(text(doc, value, "label")?),
            "code" => domain.code = Some(text(doc, value, "code")?),
            "kind" => {
                let raw = scalar(doc, value, "kind")?;
                kind = Some(ScalarKind::parse(raw.as_str()).ok_or_else(|| {
                    doc.error(
                        doc.scalar_position(raw),
                        format!("unknown scalar kind '{}'", raw.as_str()),
                    )
                })?);
            }
            "types" => {
                for (backend, ty) in mapping(doc, value, "types")?.iter() {
                    domain
                        .types
                        .insert(key_text(backend).to_string(), text(doc, ty, key_text(backend))?);
                }
            }
            "length" => domain.length = Some(number(doc, value, "length")?),
            "scale" => domain.scale = Some(number(doc, value, "scale")?),
            "format" => domain.format = Some(text(doc, value, "format")?),
            "autoGenerated" => domain.auto_generated = flag(doc, value, "autoGenerated")?,
            _ => return Err(unknown_key(doc, key, "domain")),
        }
    }
    domain.name = name.ok_or_else(|| missing_key(doc, position, "name", "domain"))?;
    domain.kind = kind.ok_or_else(|| missing_key(doc, position, "kind", "domain"))?;
    Ok(domain)
}

struct FileBuilder {
    classes: Vec<Class>,
    relations: BTreeMap<RelationKey, Relation>,
}

impl FileBuilder {
    fn relate(&mut self, key: RelationKey, relation: Relation) {
        self.relations.insert(key, relation);
    }

    fn parse_class(&mut self, doc: &Document<'_>, persistent: bool) -> Result<(), ModelError> {
        let top = doc.mapping()?;
        for (key, _) in top.iter() {
            if key_text(key) != "class" {
                return Err(unknown_key(doc, key, "class document"));
            }
        }
        let node = top
            .get_node("class")
            .ok_or_else(|| {
                missing_key(doc, doc.node_position(&doc.root), "class", "class document")
            })?;
        let map = mapping(doc, node, "class")?;
        let class_index = self.classes.len();
        let position = doc.node_position(node);

        let mut name: Option<(String, Position)> = None;
        let mut label = None;
        let mut trigram = None;
        let mut sql_name = None;
        let mut comment = None;
        let mut reference = false;
        let mut named_properties: [Option<(RelationSlot, Relation)>; 3] = [None, None, None];
        let mut property_nodes: Option<&Node> = None;
        let mut values_node: Option<&Node> = None;

        for (key, value) in map.iter() {
            let k = key_text(key);
            let is_header = matches!(
                k,
                "name"
                    | "trigram"
                    | "sqlName"
                    | "extends"
                    | "label"
                    | "reference"
                    | "orderProperty"
                    | "defaultProperty"
                    | "flagProperty"
                    | "comment"
            );
            if is_header && property_nodes.is_some() {
                return Err(doc.error(
                    doc.scalar_position(key),
                    format!("header key '{}' must come before 'properties'", k),
                ));
            }
            match k {
                "name" => name = Some((identifier(doc, value, "name")?, doc.node_position(value))),
                "label" => label = Some(text(doc, value, "label")?),
                "trigram" => trigram = Some(text(doc, value, "trigram")?),
                "sqlName" => sql_name = Some(text(doc, value, "sqlName")?),
                "comment" => comment = Some(text(doc, value, "comment")?),
                "reference" => reference = flag(doc, value, "reference")?,
                "extends" => {
                    let target = identifier(doc, value, "extends")?;
                    self.relate(
                        RelationKey::class(class_index, RelationSlot::Extends),
                        Relation::new(target, doc.node_position(value)),
                    );
                }
                "defaultProperty" | "orderProperty" | "flagProperty" => {
                    let (slot, idx) = match k {
                        "defaultProperty" => (RelationSlot::DefaultProperty, 0),
                        "orderProperty" => (RelationSlot::OrderProperty, 1),
                        _ => (RelationSlot::FlagProperty, 2),
                    };
                    let prop = identifier(doc, value, k)?;
                    named_properties[idx] =
                        Some((slot, Relation::new(prop, doc.node_position(value))));
                }
                "properties" => property_nodes = Some(value),
                "values" => {
                    if property_nodes.is_none() {
                        return Err(doc.error(
                            doc.scalar_position(key),
                            "'values' must come after 'properties'",
                        ));
                    }
                    values_node = Some(value);
                }
                _ => return Err(unknown_key(doc, key, "class")),
            }
        }

        let (name, name_position) =
            name.ok_or_else(|| missing_key(doc, position, "name", "class"))?;
        if self.classes.iter().any(|c| c.name == name) {
            return Err(doc.error(name_position, format!("duplicate class '{}' in file", name)));
        }
        let label = label.ok_or_else(|| missing_key(doc, position, "label", "class"))?;
        let property_nodes =
            property_nodes.ok_or_else(|| missing_key(doc, position, "properties", "class"))?;

        for (slot, relation) in named_properties.into_iter().flatten() {
            self.relate(RelationKey::class(class_index, slot), relation);
        }

        let seq = property_nodes
            .as_sequence()
            .ok_or_else(|| {
                doc.error(doc.node_position(property_nodes), "'properties' must be a list")
            })?;
        let mut properties = Vec::with_capacity(seq.len());
        for (property_index, item) in seq.iter().enumerate() {
            let property = self.parse_property(doc, item, class_index, property_index)?;
            properties.push(property);
        }

        let inline_values = match values_node {
            Some(node) => {
                if !reference {
                    return Err(doc.error(
                        doc.node_position(node),
                        format!(
                            "class '{}' declares values but is not marked 'reference: true'",
                            name
                        ),
                    ));
                }
                parse_values(doc, node, &name, &properties)?
            }
            None => Vec::new(),
        };

        self.classes.push(Class {
            sql_name: sql_name.unwrap_or_else(|| to_upper_snake_case(&name)),
            name,
            label,
            trigram,
            comment,
            persistent,
            reference,
            position,
            extends: Link::Unresolved,
            default_property: None,
            order_property: None,
            flag_property: None,
            properties,
            inline_values,
            reference_values: Vec::new(),
        });
        Ok(())
    }

    fn parse_property(
        &mut self,
        doc: &Document<'_>,
        node: &Node,
        class: usize,
        property: usize,
    ) -> Result<Property, ModelError> {
        let map = mapping(doc, node, "property")?;
        let position = doc.node_position(node);
        let (first, _) = map
            .iter()
            .next()
            .ok_or_else(|| doc.error(position, "empty property block"))?;
        match key_text(first) {
            "name" => self.parse_regular(doc, map, position, class, property),
            "association" => self.parse_association(doc, map, position, class, property),
            "composition" => self.parse_composition(doc, map, position, class, property),
            "alias" => self.parse_alias(doc, map, position, class, property),
            other => Err(doc.error(
                doc.scalar_position(first),
                format!(
                    "property block must start with 'name', 'association', 'composition' \
                     or 'alias', got '{}'",
                    other
                ),
            )),
        }
    }

    fn parse_regular(
        &mut self,
        doc: &Document<'_>,
        map: &MarkedMappingNode,
        position: Position,
        class: usize,
        property: usize,
    ) -> Result<Property, ModelError> {
        let mut name = None;
        let mut domain = None;
        let mut p = RegularProperty {
            name: String::new(),
            label: None,
            comment: None,
            primary_key: false,
            required: false,
            default_value: None,
            domain: Link::Unresolved,
        };
        for (key, value) in map.iter() {
            match key_text(key) {
                "name" => name = Some(identifier(doc, value, "name")?),
                "label" => p.label = Some(text(doc, value, "label")?),
                "comment" => p.comment = Some(text(doc, value, "comment")?),
                "primaryKey" => p.primary_key = flag(doc, value, "primaryKey")?,
                "required" => p.required = flag(doc, value, "required")?,
                "defaultValue" => {
                    p.default_value = Some(doc.scalar_value(scalar(doc, value, "defaultValue")?))
                }
                "domain" => {
                    let name = identifier(doc, value, "domain")?;
                    domain = Some(Relation::new(name, doc.node_position(value)))
                }
                _ => return Err(unknown_key(doc, key, "property")),
            }
        }
        p.name = name.ok_or_else(|| missing_key(doc, position, "name", "property"))?;
        let domain = domain.ok_or_else(|| missing_key(doc, position, "domain", "property"))?;
        self.relate(RelationKey::property(class, property, RelationSlot::Domain), domain);
        p.required |= p.primary_key;
        Ok(Property::Regular(p))
    }

    fn parse_association(
        &mut self,
        doc: &Document<'_>,
        map: &MarkedMappingNode,
        position: Position,
        class: usize,
        property: usize,
    ) -> Result<Property, ModelError> {
        let mut target = None;
        let mut cardinality = None;
        let mut a = AssociationProperty {
            target_name: String::new(),
            cardinality: Cardinality::ManyToOne,
            role: None,
            label: None,
            comment: None,
            required: false,
            target: Link::Unresolved,
        };
        for (key, value) in map.iter() {
            match key_text(key) {
                "association" => {
                    let text = identifier(doc, value, "association")?;
                    target = Some(Relation::new(text, doc.node_position(value)));
                }
                "type" => {
                    let raw = scalar(doc, value, "type")?;
                    cardinality = Some(Cardinality::parse(raw.as_str()).ok_or_else(|| {
                        doc.error(
                            doc.scalar_position(raw),
                            format!("unknown association type '{}'", raw.as_str()),
                        )
                    })?);
                }
                "role" => a.role = Some(text(doc, value, "role")?),
                "label" => a.label = Some(text(doc, value, "label")?),
                "comment" => a.comment = Some(text(doc, value, "comment")?),
                "required" => a.required = flag(doc, value, "required")?,
                _ => return Err(unknown_key(doc, key, "association")),
            }
        }
        let target =
            target.ok_or_else(|| missing_key(doc, position, "association", "association"))?;
        a.cardinality =
            cardinality.ok_or_else(|| missing_key(doc, position, "type", "association"))?;
        a.target_name = target.text.clone();
        self.relate(RelationKey::property(class, property, RelationSlot::Target), target);
        Ok(Property::Association(a))
    }

    fn parse_composition(
        &mut self,
        doc: &Document<'_>,
        map: &MarkedMappingNode,
        position: Position,
        class: usize,
        property: usize,
    ) -> Result<Property, ModelError> {
        let mut target = None;
        let mut name = None;
        let mut kind = None;
        let mut c = CompositionProperty {
            name: String::new(),
            kind: CompositionKind::Object,
            label: None,
            comment: None,
            target: Link::Unresolved,
        };
        for (key, value) in map.iter() {
            match key_text(key) {
                "composition" => {
                    let text = identifier(doc, value, "composition")?;
                    target = Some(Relation::new(text, doc.node_position(value)));
                }
                "name" => name = Some(identifier(doc, value, "name")?),
                "kind" => {
                    let raw = scalar(doc, value, "kind")?;
                    kind = Some(CompositionKind::parse(raw.as_str()).ok_or_else(|| {
                        doc.error(
                            doc.scalar_position(raw),
                            format!("unknown composition kind '{}'", raw.as_str()),
                        )
                    })?);
                }
                "label" => c.label = Some(text(doc, value, "label")?),
                "comment" => c.comment = Some(text(doc, value, "comment")?),
                _ => return Err(unknown_key(doc, key, "composition")),
            }
        }
        let target =
            target.ok_or_else(|| missing_key(doc, position, "composition", "composition"))?;
        c.name = name.ok_or_else(|| missing_key(doc, position, "name", "composition"))?;
        c.kind = kind.ok_or_else(|| missing_key(doc, position, "kind", "composition"))?;
        self.relate(RelationKey::property(class, property, RelationSlot::Target), target);
        Ok(Property::Composition(c))
    }

    fn parse_alias(
        &mut self,
        doc: &Document<'_>,
        map: &MarkedMappingNode,
        position: Position,
        class: usize,
        property: usize,
    ) -> Result<Property, ModelError> {
        let mut peer: Option<(Relation, Relation)> = None;
        let mut a = AliasProperty {
            class_name: String::new(),
            property_name: String::new(),
            prefix: None,
            suffix: None,
            label: None,
            comment: None,
            target: Link::Unresolved,
            list_domain: Link::Unresolved,
        };
        for (key, value) in map.iter() {
            match key_text(key) {
                "alias" => {
                    let inner = mapping(doc, value, "alias")?;
                    let at = doc.node_position(value);
                    let mut class_rel = None;
                    let mut prop_rel = None;
                    for (k, v) in inner.iter() {
                        match key_text(k) {
                            "class" => {
                                let text = identifier(doc, v, "class")?;
                                class_rel = Some(Relation::new(text, doc.node_position(v)));
                            }
                            "property" => {
                                let text = identifier(doc, v, "property")?;
                                prop_rel = Some(Relation::new(text, doc.node_position(v)));
                            }
                            _ => return Err(unknown_key(doc, k, "alias")),
                        }
                    }
                    peer = Some((
                        class_rel.ok_or_else(|| missing_key(doc, at, "class", "alias"))?,
                        prop_rel.ok_or_else(|| missing_key(doc, at, "property", "alias"))?,
                    ));
                }
                "prefix" => a.prefix = Some(text(doc, value, "prefix")?),
                "suffix" => a.suffix = Some(text(doc, value, "suffix")?),
                "label" => a.label = Some(text(doc, value, "label")?),
                "comment" => a.comment = Some(text(doc, value, "comment")?),
                "listDomain" => {
                    let text = identifier(doc, value, "listDomain")?;
                    let domain = Relation::new(text, doc.node_position(value));
                    let key = RelationKey::property(class, property, RelationSlot::ListDomain);
                    self.relate(key, domain);
                }
                _ => return Err(unknown_key(doc, key, "alias property")),
            }
        }
        let (class_rel, prop_rel) =
            peer.ok_or_else(|| missing_key(doc, position, "alias", "alias property"))?;
        a.class_name = class_rel.text.clone();
        a.property_name = prop_rel.text.clone();
        self.relate(
            RelationKey::property(class, property, RelationSlot::AliasClass),
            prop_rel.with_peer(class_rel),
        );
        Ok(Property::Alias(a))
    }
}

/// Parse a `values` block. Unknown property names and missing required non-key properties are
/// rejected here; a missing primary key is left to the attacher, which knows whether its
/// domain generates values.
fn parse_values(
    doc: &Document<'_>,
    node: &Node,
    class_name: &str,
    properties: &[Property],
) -> Result<Vec<InlineValue>, ModelError> {
    let names: HashSet<String> = properties.iter().map(Property::name).collect();
    let mut out = Vec::new();
    for (instance, body) in mapping(doc, node, "values")?.iter() {
        let instance_position = doc.scalar_position(instance);
        let mut values = BTreeMap::new();
        for (prop, literal) in mapping(doc, body, key_text(instance))?.iter() {
            let prop_name = key_text(prop);
            if !names.contains(prop_name) {
                return Err(doc.error(
                    doc.scalar_position(prop),
                    format!(
                        "value '{}' references unknown property '{}' of class '{}'",
                        key_text(instance),
                        prop_name,
                        class_name
                    ),
                ));
            }
            let raw = scalar(doc, literal, prop_name)?;
            values.insert(prop_name.to_string(), doc.scalar_value(raw));
        }
        for p in properties {
            let pname = p.name();
            if p.is_required() && !p.is_primary_key() && !values.contains_key(&pname) {
                return Err(doc.error(
                    instance_position,
                    format!(
                        "value '{}' of class '{}' is missing required property '{}'",
                        key_text(instance),
                        class_name,
                        pname
                    ),
                ));
            }
        }
        out.push(InlineValue {
            name: key_text(instance).to_string(),
            position: instance_position,
            values,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CUSTOMER: &str = r#"app: Shop
module: Sales
kind: data
---
class:
  name: Customer
  trigram: CUS
  label: Client
  properties:
    - name: Id
      domain: DO_ID
      primaryKey: true
    - association: Address
      type: manyToOne
      role: billing
      label: Adresse de facturation
---
class:
  name: Address
  label: Adresse
  properties:
    - name: Id
      domain: DO_ID
      primaryKey: true
    - name: City
      domain: DO_LIBELLE
      required: true
"#;

    fn parse(text: &str) -> Result<ModelFile, ModelError> {
        let schemas = SchemaValidator::new().unwrap();
        parse_model_file("customer", Path::new("customer.model"), text, &schemas)
    }

    #[test]
    fn parses_classes_and_records_relations() {
        let file = parse(CUSTOMER).unwrap();
        assert_eq!(file.descriptor.namespace.app, "Shop");
        assert_eq!(file.descriptor.namespace.kind, NamespaceKind::Data);
        assert_eq!(file.classes.len(), 2);

        let customer = &file.classes[0];
        assert_eq!(customer.sql_name, "CUSTOMER");
        assert!(customer.persistent);
        assert_eq!(customer.properties[1].name(), "AddressBilling");

        let target = &file.relations[&RelationKey::property(0, 1, RelationSlot::Target)];
        assert_eq!(target.text, "Address");
        assert_eq!(target.position, Position { line: 13, column: 20 });

        let domain = &file.relations[&RelationKey::property(1, 1, RelationSlot::Domain)];
        assert_eq!(domain.text, "DO_LIBELLE");
        assert!(matches!(&customer.properties[0], Property::Regular(p) if p.required && p.primary_key));
    }

    #[test]
    fn header_after_properties_is_rejected() {
        let text = "app: Shop\nmodule: Sales\nkind: data\n---\nclass:\n  name: Order\n  properties:\n    - name: Id\n      domain: DO_ID\n  label: Commande\n";
        let err = parse(text).unwrap_err();
        match err {
            ModelError::Structural { line, message, .. } => {
                assert_eq!(line, 10);
                assert!(message.contains("must come before 'properties'"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn property_variant_is_chosen_by_first_key() {
        let text = "app: Shop\nmodule: Sales\nkind: business\n---\nclass:\n  name: Cart\n  label: Panier\n  properties:\n    - composition: Line\n      name: Lines\n      kind: list\n    - alias:\n        class: Customer\n        property: Name\n      prefix: Customer\n";
        let file = parse(text).unwrap();
        let cart = &file.classes[0];
        assert!(!cart.persistent);
        assert!(matches!(&cart.properties[0], Property::Composition(c) if c.kind == CompositionKind::List));
        assert_eq!(cart.properties[1].name(), "CustomerName");
        let alias = &file.relations[&RelationKey::property(0, 1, RelationSlot::AliasClass)];
        assert_eq!(alias.text, "Name");
        assert_eq!(alias.peer.as_ref().map(|p| p.text.as_str()), Some("Customer"));
    }

    #[test]
    fn composition_requires_name() {
        let text = "app: Shop\nmodule: Sales\nkind: business\n---\nclass:\n  name: Cart\n  label: Panier\n  properties:\n    - composition: Line\n      kind: list\n";
        let err = parse(text).unwrap_err();
        assert!(err.to_string().contains("missing required key 'name' in composition"), "{}", err);
    }

    #[test]
    fn values_reject_unknown_property_and_missing_required() {
        let base = "app: Shop\nmodule: Ref\nkind: data\n---\nclass:\n  name: Status\n  label: Statut\n  reference: true\n  properties:\n    - name: Code\n      domain: DO_CODE\n      primaryKey: true\n    - name: Label\n      domain: DO_LIBELLE\n      required: true\n  values:\n";
        let ok = format!("{}    Active:\n      Code: ACT\n      Label: Actif\n", base);
        let file = parse(&ok).unwrap();
        assert_eq!(file.classes[0].inline_values[0].name, "Active");

        let unknown = format!("{}    Active:\n      Code: ACT\n      Libelle: Actif\n", base);
        assert!(parse(&unknown).unwrap_err().to_string().contains("unknown property 'Libelle'"));

        let missing = format!("{}    Active:\n      Code: ACT\n", base);
        assert!(parse(&missing).unwrap_err().to_string().contains("missing required property 'Label'"));

        let missing_pk = format!("{}    Active:\n      Label: Actif\n", base);
        assert!(parse(&missing_pk).is_ok());
    }

    #[test]
    fn values_require_reference_class() {
        let text = "app: Shop\nmodule: Ref\nkind: data\n---\nclass:\n  name: Status\n  label: Statut\n  properties:\n    - name: Code\n      domain: DO_CODE\n  values:\n    Active:\n      Code: ACT\n";
        assert!(parse(text).unwrap_err().to_string().contains("reference: true"));
    }

    #[test]
    fn duplicate_class_in_file_is_structural() {
        let text = "app: Shop\nmodule: Sales\nkind: data\n---\nclass:\n  name: A\n  label: A\n  properties: []\n---\nclass:\n  name: A\n  label: A\n  properties: []\n";
        assert!(matches!(parse(text), Err(ModelError::Structural { line: 11, .. })));
    }

    #[test]
    fn file_must_start_with_descriptor() {
        let text = "class:\n  name: A\n  label: A\n  properties: []\n";
        assert!(parse(text).unwrap_err().to_string().contains("file descriptor"));
    }

    #[test]
    fn parses_domain_file() {
        let text = "domain:\n  name: DO_ID\n  label: Identifiant\n  kind: integer\n  autoGenerated: true\n  types:\n    sql: int\n    ts: number\n---\ndomain:\n  name: DO_LIBELLE\n  kind: string\n  length: 100\n";
        let schemas = SchemaValidator::new().unwrap();
        match parse_source("domains", Path::new("domains.model"), text, &schemas).unwrap() {
            SourceFile::Domains(file) => {
                assert_eq!(file.domains.len(), 2);
                assert!(file.domains[0].auto_generated);
                assert_eq!(file.domains[0].types.get("sql").map(String::as_str), Some("int"));
                assert_eq!(file.domains[1].length, Some(100));
                assert_eq!(file.domains[1].kind, ScalarKind::String);
            }
            SourceFile::Model(_) => unreachable!(),
        }
    }

    #[test]
    fn duplicate_domain_in_file_is_structural() {
        let text = "domain:\n  name: DO_ID\n  kind: integer\n---\ndomain:\n  name: DO_ID\n  kind: string\n";
        let schemas = SchemaValidator::new().unwrap();
        let err = parse_domain_file("domains", Path::new("domains.model"), text, &schemas).unwrap_err();
        assert!(err.to_string().contains("duplicate domain 'DO_ID'"), "{}", err);
    }
}
