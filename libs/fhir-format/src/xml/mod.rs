//! FHIR XML
//!
//! Rules that differ from JSON:
//! - every FHIR element must be in the `http://hl7.org/fhir` namespace
//! - `Element.id` and `Extension.url` are attributes; resource ids are elements
//! - primitive values sit in a `value` attribute, next to the `id` attribute,
//!   with extensions as child elements
//! - choice fields are elements named `<name><Type>`
//! - a resource held by a field is a child element named by its type inside
//!   the field element, e.g. `<contained><Observation>...</Observation></contained>`
//! - narrative `div` content is kept as verbatim XHTML markup

mod decoder;
mod encoder;

use crate::error::Result;
use crate::FormatOptions;
use decoder::Decoder;
use encoder::Encoder;
use fhirkit_models::{Element, Resource, TypeRegistry};
use roxmltree::Document;
use std::io::Write;

pub const FHIR_NS: &str = "http://hl7.org/fhir";
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Encode a resource into a new buffer
pub fn to_vec(registry: &TypeRegistry, resource: &Resource, options: FormatOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    to_writer(registry, &mut out, resource, options)?;
    Ok(out)
}

/// Encode a resource into `writer`.
///
/// On error the writer may hold a partial document.
pub fn to_writer<W: Write>(
    registry: &TypeRegistry,
    writer: W,
    resource: &Resource,
    options: FormatOptions,
) -> Result<()> {
    let mut encoder = Encoder::new(registry, writer, options.pretty);
    encoder.document(resource)?;
    let mut writer = encoder.into_inner();
    if options.pretty {
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    tracing::debug!(resource_type = %resource.resource_type(), "Encoded XML resource");
    Ok(())
}

/// Encode a non-resource element of the named type as a root element `tag`
pub fn element_to_vec(
    registry: &TypeRegistry,
    tag: &str,
    type_name: &str,
    element: &Element,
    options: FormatOptions,
) -> Result<Vec<u8>> {
    let type_def = registry.require_type(type_name)?;
    let mut encoder = Encoder::new(registry, Vec::new(), options.pretty);
    encoder.element_document(tag, type_def, element)?;
    Ok(encoder.into_inner())
}

/// Decode a resource, selecting its type from the root element name
pub fn from_str(registry: &TypeRegistry, input: &str) -> Result<Resource> {
    let doc = Document::parse(input)?;
    let resource = Decoder::new(registry, input).any_resource(doc.root_element())?;
    tracing::debug!(
        resource_type = %resource.resource_type(),
        bytes = input.len(),
        "Decoded XML resource"
    );
    Ok(resource)
}

/// Decode a resource from UTF-8 bytes
pub fn from_slice(registry: &TypeRegistry, input: &[u8]) -> Result<Resource> {
    from_str(registry, std::str::from_utf8(input)?)
}

/// Decode a resource of a type chosen by the caller.
///
/// The root element name is not compared with `resource_type`.
pub fn from_slice_as(registry: &TypeRegistry, resource_type: &str, input: &[u8]) -> Result<Resource> {
    let input = std::str::from_utf8(input)?;
    let type_def = crate::contained::resolve(registry, resource_type)?;
    let doc = Document::parse(input)?;
    let resource = Decoder::new(registry, input).resource_as(doc.root_element(), type_def)?;
    tracing::debug!(resource_type, bytes = input.len(), "Decoded XML resource");
    Ok(resource)
}

/// Decode a non-resource element of the named type from the root element
pub fn element_from_slice(registry: &TypeRegistry, type_name: &str, input: &[u8]) -> Result<Element> {
    let input = std::str::from_utf8(input)?;
    let type_def = registry.require_type(type_name)?;
    let doc = Document::parse(input)?;
    Decoder::new(registry, input).element_as(doc.root_element(), type_def)
}
