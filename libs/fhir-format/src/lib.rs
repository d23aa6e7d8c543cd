//! FHIR resource serialization (JSON and XML).
//!
//! Both codecs are driven entirely by a [`TypeRegistry`]: field order, choice
//! keys, cardinality and XML representation all come from the schema, and the
//! values are the schema-agnostic [`Resource`]/[`Element`] model.
//!
//! ```rust
//! use fhirkit_format::{Codec, Format};
//! use fhirkit_models::core_registry;
//!
//! let codec = Codec::new(core_registry());
//! let patient = codec
//!     .decode(Format::Json, br#"{"resourceType":"Patient","birthDate":"1974-12-25"}"#)
//!     .unwrap();
//! let xml = codec.encode(Format::Xml, &patient).unwrap();
//! assert_eq!(
//!     String::from_utf8(xml).unwrap(),
//!     r#"<Patient xmlns="http://hl7.org/fhir"><birthDate value="1974-12-25"/></Patient>"#
//! );
//! ```

mod contained;
mod error;
mod fields;
mod format;
mod primitive;

pub mod json;
pub mod xml;

pub use error::{FormatError, Result};
pub use format::Format;

use fhirkit_models::{Resource, TypeRegistry};
use std::io::Write;

/// Deepest nesting the decoders accept: JSON objects and arrays, or XML
/// elements. Deeper documents fail with [`FormatError::DepthLimit`].
pub const MAX_DEPTH: usize = 128;

/// Output options shared by both encoders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// Indent nested members/elements by two spaces
    pub pretty: bool,
}

impl FormatOptions {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

/// A registry paired with output options.
///
/// Cheap to copy; the registry is only ever read.
#[derive(Debug, Clone, Copy)]
pub struct Codec<'r> {
    registry: &'r TypeRegistry,
    options: FormatOptions,
}

impl<'r> Codec<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            options: FormatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FormatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    pub fn options(&self) -> FormatOptions {
        self.options
    }

    pub fn encode(&self, format: Format, resource: &Resource) -> Result<Vec<u8>> {
        match format {
            Format::Json => json::to_vec(self.registry, resource, self.options),
            Format::Xml => xml::to_vec(self.registry, resource, self.options),
        }
    }

    pub fn encode_to<W: Write>(&self, format: Format, writer: W, resource: &Resource) -> Result<()> {
        match format {
            Format::Json => json::to_writer(self.registry, writer, resource, self.options),
            Format::Xml => xml::to_writer(self.registry, writer, resource, self.options),
        }
    }

    /// Decode a resource, selecting its type from the document
    pub fn decode(&self, format: Format, input: &[u8]) -> Result<Resource> {
        match format {
            Format::Json => json::from_slice(self.registry, input),
            Format::Xml => xml::from_slice(self.registry, input),
        }
    }

    /// Decode a resource of a type chosen by the caller
    pub fn decode_as(&self, format: Format, resource_type: &str, input: &[u8]) -> Result<Resource> {
        match format {
            Format::Json => json::from_slice_as(self.registry, resource_type, input),
            Format::Xml => xml::from_slice_as(self.registry, resource_type, input),
        }
    }

    /// Decode in one format and re-encode in another
    pub fn convert(&self, input: &[u8], from: Format, to: Format) -> Result<Vec<u8>> {
        let resource = self.decode(from, input)?;
        self.encode(to, &resource)
    }
}

/// Decode in one format and re-encode in another, through the schema
pub fn convert(
    registry: &TypeRegistry,
    input: &[u8],
    from: Format,
    to: Format,
    options: FormatOptions,
) -> Result<Vec<u8>> {
    Codec::new(registry).with_options(options).convert(input, from, to)
}

/// Convert a FHIR JSON document into its pretty-printed XML representation
pub fn json_to_xml(registry: &TypeRegistry, input: &str) -> Result<String> {
    let bytes = convert(registry, input.as_bytes(), Format::Json, Format::Xml, FormatOptions::pretty())?;
    Ok(String::from_utf8(bytes).map_err(|e| e.utf8_error())?)
}

/// Convert a FHIR XML document into its pretty-printed JSON representation
pub fn xml_to_json(registry: &TypeRegistry, input: &str) -> Result<String> {
    let bytes = convert(registry, input.as_bytes(), Format::Xml, Format::Json, FormatOptions::pretty())?;
    Ok(String::from_utf8(bytes).map_err(|e| e.utf8_error())?)
}
