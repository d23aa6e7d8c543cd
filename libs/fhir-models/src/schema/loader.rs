//! Building a [`TypeRegistry`] from definitions
//!
//! Two sources are supported:
//! - a compact schema document (the embedded core schema uses this layout)
//! - FHIR StructureDefinitions with snapshots, as published in the
//!   `profiles-types.json` / `profiles-resources.json` bundles

use super::{
    Cardinality, FieldDefinition, PrimitiveKind, Representation, TypeDefinition, TypeKind,
    TypeRegistry,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Inheritance chains longer than this are treated as cycles
const MAX_BASE_DEPTH: usize = 16;

/// Compact schema document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub release: String,
    pub types: Vec<SchemaType>,
}

/// A type entry of a [`SchemaDocument`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaType {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// Type whose fields are inherited in front of this type's own fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SchemaField>,
}

/// A field entry of a [`SchemaType`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub types: Vec<String>,
    #[serde(default)]
    pub min: u32,
    #[serde(default = "default_max")]
    pub max: String,
    #[serde(default)]
    pub representation: Representation,
}

fn default_max() -> String {
    "1".to_string()
}

impl TypeRegistry {
    /// Parse a compact schema document from JSON text
    pub fn from_schema_json(json: &str) -> Result<Self> {
        let document: SchemaDocument = serde_json::from_str(json)?;
        Self::from_schema_document(document)
    }

    /// Build a registry from a compact schema document, expanding `base` types.
    pub fn from_schema_document(document: SchemaDocument) -> Result<Self> {
        let entries: HashMap<&str, &SchemaType> = document
            .types
            .iter()
            .map(|t| (t.name.as_str(), t))
            .collect();

        let mut registry = TypeRegistry::new(document.release.clone());
        for entry in &document.types {
            let mut fields = Vec::new();
            collect_inherited_fields(entry, &entries, &mut fields, 0)?;

            let type_def = TypeDefinition::new(entry.name.clone(), entry.kind, fields)
                .with_abstract(entry.is_abstract)
                .with_base(entry.base.clone());
            registry.add_type(type_def);
        }

        registry.validate()?;
        tracing::info!(
            release = %registry.release(),
            types = registry.len(),
            resources = registry.resource_types().count(),
            "Loaded schema document"
        );
        Ok(registry)
    }

    /// Build a registry from StructureDefinitions.
    ///
    /// Constraint profiles and logical models are skipped; only the base
    /// specializations describe the wire format.
    pub fn from_structure_definitions<'a, I>(release: &str, definitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut registry = TypeRegistry::new(release);
        let mut skipped = 0usize;

        for sd in definitions {
            if sd.get("resourceType").and_then(Value::as_str) != Some("StructureDefinition") {
                continue;
            }
            match parse_structure_definition(sd)? {
                Some(types) => {
                    for type_def in types {
                        registry.add_type(type_def);
                    }
                }
                None => skipped += 1,
            }
        }

        registry.validate()?;
        tracing::info!(
            release = %registry.release(),
            types = registry.len(),
            resources = registry.resource_types().count(),
            skipped,
            "Loaded StructureDefinitions"
        );
        Ok(registry)
    }

    /// Build a registry from one or more Bundles of StructureDefinitions.
    ///
    /// The release is taken from the first definition carrying `fhirVersion`.
    pub fn from_definitions_bundles(bundles: &[Value]) -> Result<Self> {
        let resources: Vec<&Value> = bundles
            .iter()
            .flat_map(|bundle| {
                bundle
                    .get("entry")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
            })
            .filter_map(|entry| entry.get("resource"))
            .collect();

        let release = resources
            .iter()
            .find_map(|r| r.get("fhirVersion").and_then(Value::as_str))
            .unwrap_or("unknown")
            .to_string();

        Self::from_structure_definitions(&release, resources)
    }

    /// Build a registry from a single Bundle of StructureDefinitions
    pub fn from_definitions_bundle(bundle: &Value) -> Result<Self> {
        Self::from_definitions_bundles(std::slice::from_ref(bundle))
    }
}

fn collect_inherited_fields(
    entry: &SchemaType,
    entries: &HashMap<&str, &SchemaType>,
    fields: &mut Vec<FieldDefinition>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_BASE_DEPTH {
        return Err(Error::InvalidDefinition {
            type_name: entry.name.clone(),
            message: "base type chain is cyclic".to_string(),
        });
    }

    if let Some(base) = &entry.base {
        let base_entry = entries.get(base.as_str()).ok_or_else(|| Error::InvalidDefinition {
            type_name: entry.name.clone(),
            message: format!("unknown base type {}", base),
        })?;
        collect_inherited_fields(base_entry, entries, fields, depth + 1)?;
    }

    for field in &entry.fields {
        let cardinality =
            Cardinality::parse(field.min, &field.max).ok_or_else(|| Error::InvalidDefinition {
                type_name: entry.name.clone(),
                message: format!("invalid max '{}' on field {}", field.max, field.name),
            })?;
        let field_def = FieldDefinition::new(field.name.clone(), field.types.clone(), cardinality)
            .with_representation(field.representation);
        fields.push(field_def);
    }
    Ok(())
}

/// Parse a single StructureDefinition into its type and the backbone types it declares.
///
/// Returns `None` for definitions that do not introduce a wire type.
fn parse_structure_definition(sd: &Value) -> Result<Option<Vec<TypeDefinition>>> {
    let derivation = sd.get("derivation").and_then(Value::as_str);
    if derivation == Some("constraint") {
        return Ok(None);
    }

    let name = sd
        .get("type")
        .or_else(|| sd.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidDefinition {
            type_name: "<unnamed>".to_string(),
            message: "StructureDefinition missing 'type'".to_string(),
        })?
        .to_string();

    let kind = match sd.get("kind").and_then(Value::as_str) {
        Some("primitive-type") => TypeKind::Primitive,
        Some("complex-type") => TypeKind::Element,
        Some("resource") => TypeKind::Resource,
        _ => return Ok(None),
    };

    let is_abstract = sd.get("abstract").and_then(Value::as_bool).unwrap_or(false);
    let base_type = sd
        .get("baseDefinition")
        .and_then(Value::as_str)
        .map(extract_type_name_from_url);

    if kind == TypeKind::Primitive {
        let primitive = PrimitiveKind::from_type_name(&name).unwrap_or_else(|| {
            tracing::warn!(type_name = %name, "Unknown primitive type, treating as string");
            PrimitiveKind::String
        });
        let type_def = TypeDefinition::new(name, kind, Vec::new())
            .with_abstract(is_abstract)
            .with_base(base_type)
            .with_primitive(primitive);
        return Ok(Some(vec![type_def]));
    }

    let elements = sd
        .get("snapshot")
        .and_then(|s| s.get("element"))
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidDefinition {
            type_name: name.clone(),
            message: "snapshot missing 'element' array".to_string(),
        })?;

    // Element paths that have children become backbone types named by their path
    let mut owners: BTreeMap<String, Vec<FieldDefinition>> = BTreeMap::new();
    owners.insert(name.clone(), Vec::new());
    let parents: Vec<&str> = elements
        .iter()
        .filter_map(|e| e.get("path").and_then(Value::as_str))
        .filter_map(|p| p.rsplit_once('.').map(|(parent, _)| parent))
        .collect();

    for element in elements.iter().skip(1) {
        let path = element.get("path").and_then(Value::as_str).unwrap_or("");
        let Some((parent, field_name)) = path.rsplit_once('.') else {
            continue;
        };
        if !path.starts_with(&name) || element.get("sliceName").is_some() {
            continue;
        }

        let has_children = parents.contains(&path);
        let field = parse_element(element, field_name, path, has_children, &name)?;
        owners.entry(parent.to_string()).or_default().push(field);
    }

    let mut types = Vec::with_capacity(owners.len());
    for (owner, fields) in owners {
        if owner == name {
            types.push(
                TypeDefinition::new(owner, kind, fields)
                    .with_abstract(is_abstract)
                    .with_base(base_type.clone()),
            );
        } else {
            types.push(
                TypeDefinition::new(owner, TypeKind::Element, fields)
                    .with_base(Some("BackboneElement".to_string())),
            );
        }
    }
    Ok(Some(types))
}

/// Parse one snapshot element into a field of its parent
fn parse_element(
    element: &Value,
    field_name: &str,
    path: &str,
    has_children: bool,
    type_name: &str,
) -> Result<FieldDefinition> {
    let min = element.get("min").and_then(Value::as_u64).unwrap_or(0) as u32;
    let max = element.get("max").and_then(Value::as_str).unwrap_or("1");
    let cardinality = Cardinality::parse(min, max).ok_or_else(|| Error::InvalidDefinition {
        type_name: type_name.to_string(),
        message: format!("invalid max '{}' on {}", max, path),
    })?;

    let possible_types: Vec<String> = if let Some(reference) =
        element.get("contentReference").and_then(Value::as_str)
    {
        // "#Observation.referenceRange" or "http://...#Observation.referenceRange"
        let target = reference.rsplit('#').next().unwrap_or(reference);
        vec![target.to_string()]
    } else if has_children {
        vec![path.to_string()]
    } else {
        element
            .get("type")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(type_code)
            .collect()
    };

    if possible_types.is_empty() {
        return Err(Error::InvalidDefinition {
            type_name: type_name.to_string(),
            message: format!("element {} declares no type", path),
        });
    }

    let representations: Vec<&str> = element
        .get("representation")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    let representation = if representations.contains(&"xmlAttr") {
        Representation::XmlAttr
    } else if representations.contains(&"xhtml") || possible_types == ["xhtml"] {
        Representation::Xhtml
    } else {
        Representation::Element
    };

    Ok(FieldDefinition::new(field_name, possible_types, cardinality)
        .with_representation(representation))
}

const FHIR_TYPE_EXTENSION: &str =
    "http://hl7.org/fhir/StructureDefinition/structuredefinition-fhir-type";

/// Type code of an `ElementDefinition.type` entry.
///
/// FHIRPath system types (used by `Element.id`, `Extension.url`, primitive
/// values) are mapped back to the FHIR primitive named by the fhir-type
/// extension, or to `string` when there is none.
fn type_code(type_ref: &Value) -> Option<String> {
    let code = type_ref.get("code").and_then(Value::as_str)?;
    if !code.starts_with("http://hl7.org/fhirpath/System.") {
        return Some(code.to_string());
    }

    let declared = type_ref
        .get("extension")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|ext| ext.get("url").and_then(Value::as_str) == Some(FHIR_TYPE_EXTENSION))
        .find_map(|ext| {
            ext.get("valueUrl")
                .or_else(|| ext.get("valueUri"))
                .and_then(Value::as_str)
        });
    Some(declared.unwrap_or("string").to_string())
}

/// Extract type name from a canonical URL
fn extract_type_name_from_url(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_fields_come_first() {
        let registry = TypeRegistry::from_schema_json(
            r#"{
                "release": "test",
                "types": [
                    {"name": "string", "kind": "primitive"},
                    {"name": "Extension", "kind": "element", "fields": [
                        {"name": "url", "types": ["string"], "min": 1, "representation": "xmlAttr"}
                    ]},
                    {"name": "Element", "kind": "element", "abstract": true, "fields": [
                        {"name": "id", "types": ["string"], "representation": "xmlAttr"},
                        {"name": "extension", "types": ["Extension"], "max": "*"}
                    ]},
                    {"name": "HumanName", "kind": "element", "base": "Element", "fields": [
                        {"name": "family", "types": ["string"]},
                        {"name": "given", "types": ["string"], "max": "*"}
                    ]}
                ]
            }"#,
        )
        .unwrap();

        let name = registry.get_type("HumanName").unwrap();
        let wire: Vec<&str> = name.fields().iter().map(|f| f.wire_name.as_str()).collect();
        assert_eq!(wire, vec!["id", "extension", "family", "given"]);
        assert_eq!(name.fields()[0].representation, Representation::XmlAttr);
        assert!(name.field("given").unwrap().multiple());
    }

    #[test]
    fn unresolved_field_type_is_rejected() {
        let err = TypeRegistry::from_schema_json(
            r#"{"release": "test", "types": [
                {"name": "Thing", "kind": "element", "fields": [{"name": "x", "types": ["Missing"]}]}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnresolvedType { ref referenced, .. } if referenced == "Missing"));
    }

    #[test]
    fn cyclic_base_is_rejected() {
        let err = TypeRegistry::from_schema_json(
            r#"{"release": "test", "types": [
                {"name": "A", "kind": "element", "base": "B"},
                {"name": "B", "kind": "element", "base": "A"}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition { .. }));
    }

    #[test]
    fn structure_definition_backbones_and_choices() {
        let definitions = vec![
            json!({"resourceType": "StructureDefinition", "type": "string", "kind": "primitive-type", "derivation": "specialization"}),
            json!({"resourceType": "StructureDefinition", "type": "boolean", "kind": "primitive-type", "derivation": "specialization"}),
            json!({"resourceType": "StructureDefinition", "type": "id", "kind": "primitive-type", "derivation": "specialization"}),
            json!({"resourceType": "StructureDefinition", "type": "Resource", "kind": "resource", "abstract": true,
                "snapshot": {"element": [
                    {"path": "Resource", "min": 0, "max": "*"},
                    {"path": "Resource.id", "min": 0, "max": "1", "type": [{"code": "http://hl7.org/fhirpath/System.String"}]}
                ]}}),
            json!({"resourceType": "StructureDefinition", "type": "Thing", "kind": "resource",
                "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Resource",
                "snapshot": {"element": [
                    {"path": "Thing", "min": 0, "max": "*"},
                    {"path": "Thing.id", "min": 0, "max": "1", "type": [{"code": "http://hl7.org/fhirpath/System.String",
                        "extension": [{"url": "http://hl7.org/fhir/StructureDefinition/structuredefinition-fhir-type", "valueUrl": "id"}]}]},
                    {"path": "Thing.flag[x]", "min": 0, "max": "1", "type": [{"code": "boolean"}, {"code": "string"}]},
                    {"path": "Thing.part", "min": 0, "max": "*", "type": [{"code": "BackboneElement"}]},
                    {"path": "Thing.part.label", "min": 1, "max": "1", "type": [{"code": "string"}]},
                    {"path": "Thing.part.part", "min": 0, "max": "*", "contentReference": "#Thing.part"},
                    {"path": "Thing.inner", "min": 0, "max": "1", "type": [{"code": "Resource"}]}
                ]}}),
            json!({"resourceType": "StructureDefinition", "type": "Thing", "kind": "resource", "derivation": "constraint"}),
        ];

        let registry = TypeRegistry::from_structure_definitions("test", &definitions).unwrap();
        let thing = registry.resource_type("Thing").unwrap();
        assert_eq!(thing.base_type.as_deref(), Some("Resource"));
        assert!(thing.resolve_key("flagBoolean").is_some());
        assert!(thing.field("inner").unwrap().is_resource());
        assert_eq!(thing.field("id").unwrap().possible_types, vec!["id"]);

        let part = registry.get_type("Thing.part").unwrap();
        assert_eq!(part.kind, TypeKind::Element);
        assert_eq!(part.field("part").unwrap().possible_types, vec!["Thing.part"]);
        assert!(!part.field("label").unwrap().optional());
        assert!(registry.resource_type("Resource").is_none());
    }
}
