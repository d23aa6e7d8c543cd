//! Contained-resource union
//!
//! A field typed `Resource` holds any concrete resource of the release. The
//! discriminator (`resourceType` in JSON, the element name in XML) is read
//! before anything is allocated and selects the schema entry to decode with.

use crate::error::{FormatError, Result};
use fhirkit_models::{Resource, TypeDefinition, TypeRegistry};

/// Schema entry for a discriminator read off the wire
pub(crate) fn resolve<'r>(registry: &'r TypeRegistry, discriminator: &str) -> Result<&'r TypeDefinition> {
    let type_def = registry
        .resource_type(discriminator)
        .ok_or_else(|| FormatError::UnknownResourceType(discriminator.to_string()))?;
    tracing::trace!(resource_type = %discriminator, "Dispatching contained resource");
    Ok(type_def)
}

/// Schema entry for a resource value about to be encoded
pub(crate) fn definition_of<'r>(registry: &'r TypeRegistry, resource: &Resource) -> Result<&'r TypeDefinition> {
    registry
        .resource_type(resource.resource_type())
        .ok_or_else(|| FormatError::UnknownResourceType(resource.resource_type().to_string()))
}
