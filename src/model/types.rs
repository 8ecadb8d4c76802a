//! Entity graph types: domains, namespaces, classes, properties, reference values and the
//! unresolved relations recorded by the parser.

use crate::case::to_pascal_case;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// 1-based line/column of a node in its source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.line, self.column)
    }
}

/// Scalar kind of a domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalarKind {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    Datetime,
    Binary,
    List,
    Object,
}

impl ScalarKind {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "string" => ScalarKind::String,
            "integer" => ScalarKind::Integer,
            "decimal" => ScalarKind::Decimal,
            "boolean" => ScalarKind::Boolean,
            "date" => ScalarKind::Date,
            "datetime" => ScalarKind::Datetime,
            "binary" => ScalarKind::Binary,
            "list" => ScalarKind::List,
            "object" => ScalarKind::Object,
            _ => return None,
        })
    }
}

/// Reusable scalar type definition. Identity is `name`; domains are visible from every file.
#[derive(Clone, Debug, Serialize)]
pub struct Domain {
    pub name: String,
    pub label: Option<String>,
    pub code: Option<String>,
    pub kind: ScalarKind,
    /// Backend tag (e.g. "sql", "csharp", "ts") to the type that backend uses.
    pub types: BTreeMap<String, String>,
    pub length: Option<u32>,
    pub scale: Option<u32>,
    /// Persistence-format tag.
    pub format: Option<String>,
    /// Primary keys bound to this domain get their values from storage.
    pub auto_generated: bool,
    pub position: Position,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NamespaceKind {
    Data,
    Business,
}

impl NamespaceKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "data" => Some(NamespaceKind::Data),
            "business" => Some(NamespaceKind::Business),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Namespace {
    pub app: String,
    pub module: String,
    pub kind: NamespaceKind,
}

/// A declared file dependency (`uses` entry) with its position for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileDependency {
    pub file: String,
    pub position: Position,
}

/// First document of a model file.
#[derive(Clone, Debug, Serialize)]
pub struct FileDescriptor {
    pub namespace: Namespace,
    pub uses: Vec<FileDependency>,
}

/// Stable identity of a class: owning file id plus class name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClassRef {
    pub file: String,
    pub class: String,
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.file, self.class)
    }
}

/// Stable identity of a property: owning class plus the property's effective name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PropertyRef {
    pub class: ClassRef,
    pub property: String,
}

/// A cross-reference field. Starts `Unresolved` after parsing and is bound by the resolver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Link<T> {
    Unresolved,
    Resolved(T),
}

impl<T> Default for Link<T> {
    fn default() -> Self {
        Link::Unresolved
    }
}

impl<T> Link<T> {
    pub fn get(&self) -> Option<&T> {
        match self {
            Link::Resolved(t) => Some(t),
            Link::Unresolved => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    ManyToMany,
    OneToMany,
}

impl Cardinality {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "oneToOne" => Some(Cardinality::OneToOne),
            "manyToOne" => Some(Cardinality::ManyToOne),
            "manyToMany" => Some(Cardinality::ManyToMany),
            "oneToMany" => Some(Cardinality::OneToMany),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CompositionKind {
    Object,
    List,
    AsyncList,
}

impl CompositionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "object" => Some(CompositionKind::Object),
            "list" => Some(CompositionKind::List),
            "asyncList" => Some(CompositionKind::AsyncList),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RegularProperty {
    pub name: String,
    pub label: Option<String>,
    pub comment: Option<String>,
    pub primary_key: bool,
    pub required: bool,
    pub default_value: Option<serde_json::Value>,
    pub domain: Link<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AssociationProperty {
    pub target_name: String,
    pub cardinality: Cardinality,
    pub role: Option<String>,
    pub label: Option<String>,
    pub comment: Option<String>,
    pub required: bool,
    pub target: Link<ClassRef>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CompositionProperty {
    pub name: String,
    pub kind: CompositionKind,
    pub label: Option<String>,
    pub comment: Option<String>,
    pub target: Link<ClassRef>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AliasProperty {
    pub class_name: String,
    pub property_name: String,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub label: Option<String>,
    pub comment: Option<String>,
    pub target: Link<PropertyRef>,
    /// Overriding list domain, bound when the alias declares `listDomain`.
    pub list_domain: Link<String>,
}

/// The four property shapes a class may declare.
#[derive(Clone, Debug, Serialize)]
pub enum Property {
    Regular(RegularProperty),
    Association(AssociationProperty),
    Composition(CompositionProperty),
    Alias(AliasProperty),
}

impl Property {
    /// Effective property name. Associations derive theirs from target + role, aliases
    /// from prefix + aliased name + suffix.
    pub fn name(&self) -> String {
        match self {
            Property::Regular(p) => p.name.clone(),
            Property::Association(a) => association_name(&a.target_name, a.role.as_deref()),
            Property::Composition(c) => c.name.clone(),
            Property::Alias(a) => format!(
                "{}{}{}",
                a.prefix.as_deref().unwrap_or(""),
                a.property_name,
                a.suffix.as_deref().unwrap_or("")
            ),
        }
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(self, Property::Regular(p) if p.primary_key)
    }

    pub fn is_required(&self) -> bool {
        match self {
            Property::Regular(p) => p.required,
            Property::Association(a) => a.required,
            _ => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Property::Regular(_) => "regular",
            Property::Association(_) => "association",
            Property::Composition(_) => "composition",
            Property::Alias(_) => "alias",
        }
    }
}

/// Name an association is exposed under (and looked up by in reference values).
pub fn association_name(target: &str, role: Option<&str>) -> String {
    match role {
        Some(r) => format!("{}{}", target, to_pascal_case(r)),
        None => target.to_string(),
    }
}

/// Named literal instance of a reference class.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReferenceValue {
    pub name: String,
    pub values: BTreeMap<String, serde_json::Value>,
}

/// `values` block as written in a model file, kept until the attacher binds it.
#[derive(Clone, Debug, PartialEq)]
pub struct InlineValue {
    pub name: String,
    pub position: Position,
    pub values: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Class {
    pub name: String,
    pub label: String,
    pub trigram: Option<String>,
    pub sql_name: String,
    pub comment: Option<String>,
    pub persistent: bool,
    pub reference: bool,
    pub position: Position,
    pub extends: Link<ClassRef>,
    pub default_property: Option<String>,
    pub order_property: Option<String>,
    pub flag_property: Option<String>,
    pub properties: Vec<Property>,
    #[serde(skip)]
    pub inline_values: Vec<InlineValue>,
    pub reference_values: Vec<ReferenceValue>,
}

impl Class {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn primary_key(&self) -> Option<&RegularProperty> {
        self.properties.iter().find_map(|p| match p {
            Property::Regular(r) if r.primary_key => Some(r),
            _ => None,
        })
    }
}

/// What part of the graph a relation belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelationOwner {
    Class { class: usize },
    Property { class: usize, property: usize },
}

/// Which field of the owner a relation fills in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelationSlot {
    Extends,
    DefaultProperty,
    OrderProperty,
    FlagProperty,
    Domain,
    Target,
    /// Aliased property; its peer relation names the class.
    AliasClass,
    ListDomain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationKey {
    pub owner: RelationOwner,
    pub slot: RelationSlot,
}

impl RelationKey {
    pub fn class(class: usize, slot: RelationSlot) -> Self {
        RelationKey {
            owner: RelationOwner::Class { class },
            slot,
        }
    }

    pub fn property(class: usize, property: usize, slot: RelationSlot) -> Self {
        RelationKey {
            owner: RelationOwner::Property { class, property },
            slot,
        }
    }
}

/// Unresolved textual cross-reference captured at parse time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    pub text: String,
    pub position: Position,
    pub peer: Option<Box<Relation>>,
}

impl Relation {
    pub fn new(text: impl Into<String>, position: Position) -> Self {
        Relation {
            text: text.into(),
            position,
            peer: None,
        }
    }

    pub fn with_peer(mut self, peer: Relation) -> Self {
        self.peer = Some(Box::new(peer));
        self
    }
}

/// One parsed model file: a namespace's classes and its declared dependencies.
#[derive(Clone, Debug)]
pub struct ModelFile {
    /// Path relative to the model root, without extension, `/`-separated.
    pub id: String,
    pub path: PathBuf,
    pub descriptor: FileDescriptor,
    pub classes: Vec<Class>,
    pub relations: BTreeMap<RelationKey, Relation>,
}

impl ModelFile {
    pub fn class(&self, name: &str) -> Option<&Class> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn class_ref(&self, name: &str) -> ClassRef {
        ClassRef {
            file: self.id.clone(),
            class: name.to_string(),
        }
    }
}

/// One parsed domain-definition file.
#[derive(Clone, Debug)]
pub struct DomainFile {
    pub id: String,
    pub path: PathBuf,
    pub domains: Vec<Domain>,
}

/// External reference data: class name -> instance name -> property name -> literal.
pub type ReferenceData = BTreeMap<String, BTreeMap<String, BTreeMap<String, serde_json::Value>>>;
