//! Schema-ordered, checked view of an element's stored fields
//!
//! Both encoders walk this view so they agree on field order, choice type
//! selection and the checks made before any byte is written.

use crate::error::{FormatError, Result};
use crate::primitive;
use fhirkit_models::{
    Element, FieldDefinition, Primitive, PrimitiveMeta, Resource, TypeDefinition, TypeKind,
    TypeRegistry, Value,
};
use std::borrow::Cow;

/// Values of one present field, grouped by kind
pub(crate) enum FieldValues<'a> {
    Primitive(Vec<&'a Primitive>),
    Element(Vec<&'a Element>),
    Resource(Vec<&'a Resource>),
}

pub(crate) struct FieldEntry<'a> {
    pub field: &'a FieldDefinition,
    /// Concrete type selected for this field (the choice variant for choice fields)
    pub type_name: &'a str,
    pub values: FieldValues<'a>,
}

impl<'a> FieldEntry<'a> {
    /// Wire key (JSON) or tag name (XML)
    pub fn key(&self) -> Cow<'a, str> {
        self.field.wire_key(self.type_name)
    }
}

/// Collect the present fields of `element` in declaration order.
///
/// Fails on stored fields the type does not declare, several values in a
/// single-valued field, and values whose type the field does not accept.
pub(crate) fn ordered_fields<'a>(
    registry: &'a TypeRegistry,
    type_def: &'a TypeDefinition,
    element: &'a Element,
) -> Result<Vec<FieldEntry<'a>>> {
    if let Some((name, _)) = element.fields().find(|(name, _)| type_def.field(name).is_none()) {
        return Err(FormatError::unknown_field(name, &type_def.name));
    }

    let mut entries = Vec::new();
    for field in type_def.fields() {
        let values = element.get_all(&field.wire_name);
        if values.is_empty() {
            continue;
        }
        if !field.multiple() && values.len() > 1 {
            return Err(FormatError::Cardinality {
                field: field.wire_name.clone(),
                type_name: type_def.name.clone(),
                count: values.len(),
            });
        }

        let type_name = select_type(field, values)?;
        let values = if field.is_resource() {
            FieldValues::Resource(collect(field, values, Value::as_resource, "Resource")?)
        } else {
            let value_type = registry.require_type(type_name)?;
            match value_type.kind {
                TypeKind::Primitive => {
                    let kind = value_type.primitive.unwrap_or_default();
                    let primitives = collect(field, values, Value::as_primitive, type_name)?;
                    for p in &primitives {
                        if let Some(value) = &p.value {
                            primitive::check_value(kind, value).map_err(|found| {
                                mismatch(field, type_name, found)
                            })?;
                        }
                    }
                    FieldValues::Primitive(primitives)
                }
                TypeKind::Element => {
                    let elements = collect(field, values, Value::as_element, type_name)?;
                    if let Some(e) = elements.iter().find(|e| e.type_name() != type_name) {
                        return Err(mismatch(field, type_name, e.type_name()));
                    }
                    FieldValues::Element(elements)
                }
                TypeKind::Resource => {
                    let resources = collect(field, values, Value::as_resource, type_name)?;
                    if let Some(r) = resources.iter().find(|r| r.resource_type() != type_name) {
                        return Err(mismatch(field, type_name, r.resource_type()));
                    }
                    FieldValues::Resource(resources)
                }
            }
        };

        entries.push(FieldEntry {
            field,
            type_name,
            values,
        });
    }
    Ok(entries)
}

/// Pick the concrete type of a field; a choice field takes its runtime value type,
/// shared by every value it holds.
fn select_type<'a>(field: &'a FieldDefinition, values: &'a [Value]) -> Result<&'a str> {
    if !field.polymorphic {
        return field
            .possible_types
            .first()
            .map(String::as_str)
            .ok_or_else(|| mismatch(field, "a declared type", "none"));
    }

    let first = values[0].type_name();
    if let Some(other) = values.iter().map(Value::type_name).find(|t| *t != first) {
        return Err(mismatch(field, first, other));
    }
    if !field.accepts(first) {
        return Err(mismatch(field, &field.possible_types.join("|"), first));
    }
    Ok(first)
}

fn collect<'a, T: 'a>(
    field: &FieldDefinition,
    values: &'a [Value],
    project: impl Fn(&'a Value) -> Option<&'a T>,
    expected: &str,
) -> Result<Vec<&'a T>> {
    values
        .iter()
        .map(|v| project(v).ok_or_else(|| mismatch(field, expected, v.type_name())))
        .collect()
}

/// The `Extension` type, once every extension on a primitive is checked to be one
pub(crate) fn meta_extensions<'r>(
    registry: &'r TypeRegistry,
    meta: &PrimitiveMeta,
) -> Result<&'r TypeDefinition> {
    let extension = registry.require_type("Extension")?;
    if let Some(other) = meta.extension.iter().find(|e| e.type_name() != extension.name) {
        return Err(FormatError::TypeMismatch {
            field: "extension".to_string(),
            expected: extension.name.clone(),
            found: other.type_name().to_string(),
        });
    }
    Ok(extension)
}

fn mismatch(field: &FieldDefinition, expected: &str, found: &str) -> FormatError {
    FormatError::TypeMismatch {
        field: field.wire_name.clone(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}
