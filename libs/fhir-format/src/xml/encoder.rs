use super::FHIR_NS;
use crate::contained;
use crate::error::{FormatError, Result};
use crate::fields::{meta_extensions, ordered_fields, FieldEntry, FieldValues};
use crate::primitive::to_text;
use fhirkit_models::{
    Element, Primitive, PrimitiveValue, Representation, Resource, TypeDefinition, TypeRegistry,
};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

pub(crate) struct Encoder<'r, W: Write> {
    registry: &'r TypeRegistry,
    writer: Writer<W>,
}

impl<'r, W: Write> Encoder<'r, W> {
    pub fn new(registry: &'r TypeRegistry, inner: W, pretty: bool) -> Self {
        let writer = if pretty {
            Writer::new_with_indent(inner, b' ', 2)
        } else {
            Writer::new(inner)
        };
        Self { registry, writer }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    /// Root resource element, declaring the FHIR namespace
    pub fn document(&mut self, resource: &Resource) -> Result<()> {
        self.resource(resource, true)
    }

    /// Root element of a non-resource type, declaring the FHIR namespace
    pub fn element_document(&mut self, tag: &str, type_def: &TypeDefinition, element: &Element) -> Result<()> {
        self.element(tag, type_def, element, true)
    }

    fn resource(&mut self, resource: &Resource, declare_ns: bool) -> Result<()> {
        let type_def = contained::definition_of(self.registry, resource)?;
        self.element(resource.resource_type(), type_def, resource, declare_ns)
    }

    fn element(&mut self, tag: &str, type_def: &TypeDefinition, element: &Element, declare_ns: bool) -> Result<()> {
        let registry = self.registry;
        let mut start = BytesStart::new(tag);
        if declare_ns {
            start.push_attribute(("xmlns", FHIR_NS));
        }

        let mut children = Vec::new();
        for entry in ordered_fields(registry, type_def, element)? {
            if entry.field.representation == Representation::XmlAttr {
                if let FieldValues::Primitive(values) = &entry.values {
                    let primitive = values[0];
                    if primitive.has_meta() {
                        return Err(FormatError::TypeMismatch {
                            field: entry.field.wire_name.clone(),
                            expected: "a plain attribute value".to_string(),
                            found: "primitive with id or extension".to_string(),
                        });
                    }
                    if let Some(value) = &primitive.value {
                        start.push_attribute((entry.field.wire_name.as_str(), &*to_text(value)));
                    }
                    continue;
                }
            }
            children.push(entry);
        }

        if children.is_empty() {
            self.writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        self.writer.write_event(Event::Start(start))?;
        for entry in &children {
            self.child(entry)?;
        }
        self.writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }

    fn child(&mut self, entry: &FieldEntry<'_>) -> Result<()> {
        let tag = entry.key();
        match &entry.values {
            FieldValues::Primitive(values) if entry.field.representation == Representation::Xhtml => {
                for markup in values.iter().filter_map(|p| match &p.value {
                    Some(PrimitiveValue::String(s)) => Some(s),
                    _ => None,
                }) {
                    self.writer
                        .write_event(Event::Text(BytesText::from_escaped(markup.as_str())))?;
                }
            }
            FieldValues::Primitive(values) => {
                for primitive in values.iter().filter(|p| !p.is_absent()) {
                    self.primitive(&tag, primitive)?;
                }
            }
            FieldValues::Element(values) => {
                let value_type = self.registry.require_type(entry.type_name)?;
                for element in values {
                    self.element(&tag, value_type, element, false)?;
                }
            }
            FieldValues::Resource(values) => {
                // The field element wraps the resource element
                for resource in values {
                    self.writer
                        .write_event(Event::Start(BytesStart::new(&*tag)))?;
                    self.resource(resource, false)?;
                    self.writer.write_event(Event::End(BytesEnd::new(&*tag)))?;
                }
            }
        }
        Ok(())
    }

    /// `<tag id=".." value="..">` with extensions as children
    fn primitive(&mut self, tag: &str, primitive: &Primitive) -> Result<()> {
        let mut start = BytesStart::new(tag);
        if let Some(id) = &primitive.meta.id {
            start.push_attribute(("id", id.as_str()));
        }
        if let Some(value) = &primitive.value {
            start.push_attribute(("value", &*to_text(value)));
        }

        if primitive.meta.extension.is_empty() {
            self.writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        let extension = meta_extensions(self.registry, &primitive.meta)?;
        self.writer.write_event(Event::Start(start))?;
        for ext in &primitive.meta.extension {
            self.element("extension", extension, ext, false)?;
        }
        self.writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }
}
