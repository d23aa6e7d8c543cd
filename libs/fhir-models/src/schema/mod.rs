//! Schema model
//!
//! Static description of every type in one FHIR release. The codec never
//! consults anything but this table and the runtime value it is handed:
//! - which kind a type is (primitive, element, resource)
//! - the ordered field list of every complex type
//! - per field: wire name, possible types, cardinality and XML representation
//!
//! A registry is immutable once built and can be shared freely between threads.

mod loader;
mod primitive;

pub use loader::{SchemaDocument, SchemaField, SchemaType};
pub use primitive::PrimitiveKind;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

/// Name of the abstract type used for fields that hold any resource.
pub const RESOURCE_TYPE: &str = "Resource";

/// Registry of all types of one release
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    /// Release identifier (e.g. "4.0.1")
    release: String,
    /// All types indexed by name
    types: HashMap<String, TypeDefinition>,
}

impl TypeRegistry {
    pub fn new(release: impl Into<String>) -> Self {
        Self {
            release: release.into(),
            types: HashMap::new(),
        }
    }

    /// Release this registry describes
    pub fn release(&self) -> &str {
        &self.release
    }

    /// Add a type to the registry, replacing any previous type of the same name
    pub fn add_type(&mut self, type_def: TypeDefinition) {
        self.types.insert(type_def.name.clone(), type_def);
    }

    /// Get a type by its name
    pub fn get_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    /// Get a type by its name, failing with [`Error::UnknownType`]
    pub fn require_type(&self, name: &str) -> Result<&TypeDefinition> {
        self.get_type(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// Look up a concrete resource type by its discriminator.
    ///
    /// Abstract resources (`Resource`, `DomainResource`) never match: they
    /// cannot appear as a `resourceType` on the wire.
    pub fn resource_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.types
            .get(name)
            .filter(|t| t.kind == TypeKind::Resource && !t.is_abstract)
    }

    /// Iterate over all types
    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    /// Get all concrete resource types
    pub fn resource_types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types
            .values()
            .filter(|t| t.kind == TypeKind::Resource && !t.is_abstract)
    }

    /// Get all complex (element) types, including backbone elements
    pub fn complex_types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values().filter(|t| t.kind == TypeKind::Element)
    }

    /// Get all primitive types
    pub fn primitive_types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values().filter(|t| t.kind == TypeKind::Primitive)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Check that every field references a type known to this registry.
    pub fn validate(&self) -> Result<()> {
        for type_def in self.types.values() {
            for field in type_def.fields() {
                for referenced in &field.possible_types {
                    if !self.types.contains_key(referenced) {
                        return Err(Error::UnresolvedType {
                            type_name: type_def.name.clone(),
                            field: field.name.clone(),
                            referenced: referenced.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Kind of FHIR type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Primitive type (e.g., string, integer, boolean)
    Primitive,
    /// Complex datatype or backbone element (e.g., HumanName, Patient.contact)
    Element,
    /// FHIR Resource (e.g., Patient, Observation)
    Resource,
}

/// A single type of the release
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    /// The type name (e.g., "Patient", "HumanName", "string", "Patient.contact")
    pub name: String,
    /// Kind of type
    pub kind: TypeKind,
    /// Whether this is an abstract type
    pub is_abstract: bool,
    /// Base type this extends (if any)
    pub base_type: Option<String>,
    /// Value representation, for primitives only
    pub primitive: Option<PrimitiveKind>,
    /// Fields in declaration order; read-only so `key_index` stays in step
    fields: Vec<FieldDefinition>,
    /// Wire key -> (field index, type index)
    key_index: HashMap<String, (usize, usize)>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, kind: TypeKind, fields: Vec<FieldDefinition>) -> Self {
        let name = name.into();
        let primitive = match kind {
            TypeKind::Primitive => Some(PrimitiveKind::from_type_name(&name).unwrap_or_default()),
            _ => None,
        };
        let mut type_def = Self {
            name,
            kind,
            is_abstract: false,
            base_type: None,
            primitive,
            fields,
            key_index: HashMap::new(),
        };
        type_def.rebuild_index();
        type_def
    }

    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    pub fn with_base(mut self, base_type: Option<String>) -> Self {
        self.base_type = base_type;
        self
    }

    pub fn with_primitive(mut self, primitive: PrimitiveKind) -> Self {
        self.primitive = Some(primitive);
        self
    }

    fn rebuild_index(&mut self) {
        self.key_index.clear();
        for (field_idx, field) in self.fields.iter().enumerate() {
            for (type_idx, type_name) in field.possible_types.iter().enumerate() {
                let key = field.wire_key(type_name).into_owned();
                self.key_index.entry(key).or_insert((field_idx, type_idx));
            }
        }
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn is_primitive(&self) -> bool {
        self.kind == TypeKind::Primitive
    }

    pub fn is_resource(&self) -> bool {
        self.kind == TypeKind::Resource
    }

    /// Get a field by its wire name
    pub fn field(&self, wire_name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.wire_name == wire_name)
    }

    /// Resolve a wire key (`birthDate`, `valueQuantity`, ...) to its field.
    ///
    /// Keys are matched exactly; the `_` sidecar prefix must be stripped by
    /// the caller.
    pub fn resolve_key(&self, key: &str) -> Option<FieldKey<'_>> {
        let (field_idx, type_idx) = *self.key_index.get(key)?;
        let field = &self.fields[field_idx];
        Some(FieldKey {
            index: field_idx,
            field,
            type_name: &field.possible_types[type_idx],
        })
    }
}

/// A resolved wire key: the field it belongs to and the concrete type it selects
#[derive(Debug, Clone, Copy)]
pub struct FieldKey<'a> {
    /// Position of the field in declaration order
    pub index: usize,
    pub field: &'a FieldDefinition,
    pub type_name: &'a str,
}

/// How a field is carried in XML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Representation {
    /// Child element (the default)
    #[default]
    Element,
    /// Attribute on the owning element (`Element.id`, `Extension.url`)
    XmlAttr,
    /// Verbatim XHTML markup (`Narrative.div`)
    Xhtml,
}

/// A field within a complex type
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Definition name (e.g., "name", "value[x]")
    pub name: String,
    /// Name on the wire; for choice fields the key prefix (e.g., "value")
    pub wire_name: String,
    /// The type(s) this field can have
    pub possible_types: Vec<String>,
    pub cardinality: Cardinality,
    /// Whether this is a choice field
    pub polymorphic: bool,
    pub representation: Representation,
}

impl FieldDefinition {
    /// Build a field from its definition name; a `[x]` suffix marks a choice field.
    pub fn new(name: impl Into<String>, possible_types: Vec<String>, cardinality: Cardinality) -> Self {
        let name = name.into();
        let (wire_name, polymorphic) = match name.strip_suffix("[x]") {
            Some(prefix) => (prefix.to_string(), true),
            None => (name.clone(), false),
        };
        Self {
            name,
            wire_name,
            possible_types,
            cardinality,
            polymorphic,
            representation: Representation::Element,
        }
    }

    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    pub fn multiple(&self) -> bool {
        self.cardinality.is_array()
    }

    pub fn optional(&self) -> bool {
        self.cardinality.is_optional()
    }

    /// Whether this field holds any resource (the contained-resource union)
    pub fn is_resource(&self) -> bool {
        matches!(self.possible_types.as_slice(), [only] if only == RESOURCE_TYPE)
    }

    pub fn accepts(&self, type_name: &str) -> bool {
        self.possible_types.iter().any(|t| t == type_name)
    }

    /// Wire key for a value of the given type.
    ///
    /// Choice fields append the type name with its first letter upper-cased
    /// (`value` + `dateTime` -> `valueDateTime`); other fields use the wire name.
    pub fn wire_key<'a>(&'a self, type_name: &str) -> Cow<'a, str> {
        if self.polymorphic {
            Cow::Owned(format!("{}{}", self.wire_name, upper_first(type_name)))
        } else {
            Cow::Borrowed(&self.wire_name)
        }
    }
}

fn upper_first(s: &str) -> Cow<'_, str> {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_lowercase() => Cow::Owned(c.to_uppercase().chain(chars).collect()),
        _ => Cow::Borrowed(s),
    }
}

/// Cardinality of a field (min..max)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cardinality {
    /// Minimum occurrences
    pub min: u32,
    /// Maximum occurrences (None means unbounded/*)
    pub max: Option<u32>,
}

impl Cardinality {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Parse the `min`/`max` pair as found in definitions (`max` is "*" or a number)
    pub fn parse(min: u32, max: &str) -> Option<Self> {
        match max {
            "*" => Some(Self::new(min, None)),
            n => n.parse().ok().map(|max| Self::new(min, Some(max))),
        }
    }

    /// Check if this field is a list/array
    pub fn is_array(&self) -> bool {
        self.max.map(|m| m > 1).unwrap_or(true)
    }

    /// Check if this field is optional
    pub fn is_optional(&self) -> bool {
        self.min == 0
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::new(0, Some(1))
    }
}
