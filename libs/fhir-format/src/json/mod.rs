//! FHIR JSON
//!
//! - `resourceType` is the first member of every resource object
//! - primitive `id`/`extension` travel in a `_`-prefixed sidecar member
//! - repeating primitives keep value and sidecar arrays index-aligned,
//!   with `null` at positions that have nothing to carry
//! - choice fields are keyed `<name><Type>` (`valueQuantity`)
//! - decimals are written from their stored text
//!
//! Decoding is closed-world: a member the schema does not declare fails the
//! whole document.

mod decoder;
mod encoder;
mod reader;

use crate::error::Result;
use crate::FormatOptions;
use decoder::Decoder;
use encoder::Encoder;
use fhirkit_models::{Element, Resource, TypeRegistry};
use std::io::Write;

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
    encoder.resource(resource)?;
    let mut writer = encoder.into_inner();
    if options.pretty {
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    tracing::debug!(resource_type = %resource.resource_type(), "Encoded JSON resource");
    Ok(())
}

/// Encode a non-resource element of the named type
pub fn element_to_vec(
    registry: &TypeRegistry,
    type_name: &str,
    element: &Element,
    options: FormatOptions,
) -> Result<Vec<u8>> {
    let type_def = registry.require_type(type_name)?;
    let mut encoder = Encoder::new(registry, Vec::new(), options.pretty);
    encoder.element(type_def, element)?;
    Ok(encoder.into_inner())
}

/// Decode a resource, selecting its type from `resourceType`
pub fn from_slice(registry: &TypeRegistry, input: &[u8]) -> Result<Resource> {
    let resource = decoder::any_resource(registry, input, 0, 0)?;
    tracing::debug!(
        resource_type = %resource.resource_type(),
        bytes = input.len(),
        "Decoded JSON resource"
    );
    Ok(resource)
}

/// Decode a resource of a type chosen by the caller.
///
/// The document's own `resourceType` member is skipped, not compared.
pub fn from_slice_as(registry: &TypeRegistry, resource_type: &str, input: &[u8]) -> Result<Resource> {
    let type_def = crate::contained::resolve(registry, resource_type)?;
    let mut decoder = Decoder::new(registry, input);
    let resource = decoder.resource_as(type_def)?;
    decoder.finish()?;
    tracing::debug!(resource_type, bytes = input.len(), "Decoded JSON resource");
    Ok(resource)
}

/// Decode a non-resource element of the named type
pub fn element_from_slice(registry: &TypeRegistry, type_name: &str, input: &[u8]) -> Result<Element> {
    let type_def = registry.require_type(type_name)?;
    let mut decoder = Decoder::new(registry, input);
    let element = decoder.element_as(type_def)?;
    decoder.finish()?;
    Ok(element)
}
