use super::{FHIR_NS, XHTML_NS};
use crate::contained;
use crate::error::{FormatError, Result};
use crate::primitive::from_text;
use crate::MAX_DEPTH;
use fhirkit_models::{
    Element, Primitive, Representation, Resource, TypeDefinition, TypeKind, TypeRegistry, Value,
};
use roxmltree::Node;
use std::collections::BTreeMap;

pub(crate) struct Decoder<'r, 's> {
    registry: &'r TypeRegistry,
    /// Document text, for verbatim XHTML capture
    source: &'s str,
}

impl<'r, 's> Decoder<'r, 's> {
    pub fn new(registry: &'r TypeRegistry, source: &'s str) -> Self {
        Self { registry, source }
    }

    /// Decode a resource, selecting its type from the element name
    pub fn any_resource(&self, node: Node<'_, '_>) -> Result<Resource> {
        check_namespace(node, FHIR_NS)?;
        let type_def = contained::resolve(self.registry, node.tag_name().name())?;
        self.resource_as(node, type_def)
    }

    /// Decode a resource of a known type; the element name is not compared
    pub fn resource_as(&self, node: Node<'_, '_>, type_def: &TypeDefinition) -> Result<Resource> {
        self.element_as(node, type_def).map(Resource::from_element)
    }

    pub fn element_as(&self, node: Node<'_, '_>, type_def: &TypeDefinition) -> Result<Element> {
        check_depth(node)?;
        check_namespace(node, FHIR_NS)?;
        check_text(node)?;
        let mut element = Element::new(type_def.name.clone());

        for attr in node.attributes().filter(|a| a.namespace().is_none()) {
            let field = type_def
                .field(attr.name())
                .filter(|f| f.representation == Representation::XmlAttr)
                .ok_or_else(|| FormatError::unknown_field(attr.name(), &type_def.name))?;
            let type_name = &field.possible_types[0];
            let kind = self
                .registry
                .require_type(type_name)?
                .primitive
                .unwrap_or_default();
            let primitive = Primitive::new(type_name.clone(), from_text(kind, attr.value())?);
            element.set(field.wire_name.clone(), primitive);
        }

        let mut pending: BTreeMap<usize, (&str, Vec<Value>)> = BTreeMap::new();
        for child in node.children().filter(Node::is_element) {
            let name = child.tag_name().name();
            let resolved = type_def
                .resolve_key(name)
                .filter(|k| k.field.representation != Representation::XmlAttr)
                .ok_or_else(|| FormatError::unknown_field(name, &type_def.name))?;
            let field = resolved.field;

            let (type_name, values) = pending
                .entry(resolved.index)
                .or_insert_with(|| (resolved.type_name, Vec::new()));
            if *type_name != resolved.type_name {
                return Err(FormatError::duplicate_field(&field.wire_name, &type_def.name));
            }
            if !field.multiple() && !values.is_empty() {
                return Err(FormatError::duplicate_field(name, &type_def.name));
            }

            let value: Value = if field.representation == Representation::Xhtml {
                check_namespace(child, XHTML_NS)?;
                Primitive::text(resolved.type_name, &self.source[child.range()]).into()
            } else {
                check_namespace(child, FHIR_NS)?;
                let value_type = self.registry.require_type(resolved.type_name)?;
                match value_type.kind {
                    TypeKind::Primitive => self.primitive(child, value_type)?.into(),
                    TypeKind::Element => self.element_as(child, value_type)?.into(),
                    TypeKind::Resource => self.contained(child, &type_def.name)?.into(),
                }
            };
            values.push(value);
        }

        for (index, (_, values)) in pending {
            element.set_all(type_def.fields()[index].wire_name.clone(), values);
        }
        Ok(element)
    }

    /// `<tag id=".." value="..">` with optional extension children
    fn primitive(&self, node: Node<'_, '_>, type_def: &TypeDefinition) -> Result<Primitive> {
        check_text(node)?;
        let kind = type_def.primitive.unwrap_or_default();
        let mut primitive = Primitive::empty(type_def.name.clone());

        for attr in node.attributes().filter(|a| a.namespace().is_none()) {
            match attr.name() {
                "value" => primitive.value = Some(from_text(kind, attr.value())?),
                "id" => primitive.meta.id = Some(attr.value().to_string()),
                other => return Err(FormatError::unknown_field(other, &type_def.name)),
            }
        }

        let extension = self.registry.require_type("Extension")?;
        for child in node.children().filter(Node::is_element) {
            check_namespace(child, FHIR_NS)?;
            if child.tag_name().name() != "extension" {
                return Err(FormatError::unknown_field(child.tag_name().name(), &type_def.name));
            }
            primitive.meta.extension.push(self.element_as(child, extension)?);
        }
        Ok(primitive)
    }

    /// The single resource inside a field wrapper.
    ///
    /// Lowercase-named elements are field wrappers and are descended through;
    /// anything else names the resource type. Wrappers carry no attributes
    /// or text of their own.
    fn contained(&self, wrapper: Node<'_, '_>, owner: &str) -> Result<Resource> {
        check_depth(wrapper)?;
        check_text(wrapper)?;
        if let Some(attr) = wrapper.attributes().find(|a| a.namespace().is_none()) {
            let field = format!("{}/@{}", wrapper.tag_name().name(), attr.name());
            return Err(FormatError::unknown_field(field, owner));
        }

        let mut resource = None;
        for child in wrapper.children().filter(Node::is_element) {
            let name = child.tag_name().name();
            let decoded = if name.starts_with(|c: char| c.is_ascii_lowercase()) {
                check_namespace(child, FHIR_NS)?;
                self.contained(child, owner)?
            } else {
                self.any_resource(child)?
            };
            if resource.replace(decoded).is_some() {
                return Err(FormatError::UnexpectedToken {
                    expected: "a single resource".to_string(),
                    found: format!("<{}>", name),
                    offset: child.range().start,
                });
            }
        }
        resource.ok_or(FormatError::MissingResourceType {
            offset: wrapper.range().start,
        })
    }
}

/// Fail once `node` is nested deeper than [`MAX_DEPTH`] elements
fn check_depth(node: Node<'_, '_>) -> Result<()> {
    // ancestors() yields the node itself and the document root as well
    if node.ancestors().nth(MAX_DEPTH + 1).is_some() {
        return Err(FormatError::DepthLimit {
            limit: MAX_DEPTH,
            offset: node.range().start,
        });
    }
    Ok(())
}

/// Character data between child elements must be whitespace
fn check_text(node: Node<'_, '_>) -> Result<()> {
    for text in node.children().filter(Node::is_text) {
        let content = text.text().unwrap_or_default().trim();
        if !content.is_empty() {
            let mut found: String = content.chars().take(20).collect();
            if found.len() < content.len() {
                found.push_str("...");
            }
            return Err(FormatError::UnexpectedToken {
                expected: format!("child element of <{}>", node.tag_name().name()),
                found: format!("text '{found}'"),
                offset: text.range().start,
            });
        }
    }
    Ok(())
}

fn check_namespace(node: Node<'_, '_>, expected: &str) -> Result<()> {
    match node.tag_name().namespace() {
        Some(ns) if ns == expected => Ok(()),
        found => Err(FormatError::NamespaceMismatch {
            element: node.tag_name().name().to_string(),
            expected: expected.to_string(),
            found: found.unwrap_or_default().to_string(),
        }),
    }
}
