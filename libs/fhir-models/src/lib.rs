//! FHIR schema model and resource values
//!
//! This crate holds the two halves the codecs work from:
//!
//! - `schema`: a [`TypeRegistry`] describing every type of a release, its
//!   fields, their cardinality, choice types and XML representation
//! - `value`: schema-agnostic [`Resource`], [`Element`] and [`Primitive`]
//!   values, where every primitive carries its own id/extension sidecar
//!
//! A registry for the R4 core types most documents touch is bundled and
//! available through [`core_registry`]. Larger registries can be built from
//! StructureDefinitions with [`TypeRegistry::from_definitions_bundle`].
//!
//! # Example
//!
//! ```rust
//! use fhirkit_models::{core_registry, Element, Primitive, Resource};
//!
//! let registry = core_registry();
//! let patient = registry.resource_type("Patient").unwrap();
//! assert!(patient.field("birthDate").is_some());
//!
//! let resource = Resource::new("Patient")
//!     .with("id", Primitive::text("id", "example"))
//!     .with("name", Element::new("HumanName").with("family", Primitive::string("Chalmers")));
//! assert_eq!(resource.id(), Some("example"));
//! ```

pub mod error;
pub mod schema;
pub mod value;

mod core;

pub use crate::core::core_registry;
pub use error::{Error, Result};
pub use schema::{
    Cardinality, FieldDefinition, FieldKey, PrimitiveKind, Representation, TypeDefinition,
    TypeKind, TypeRegistry, RESOURCE_TYPE,
};
pub use value::{DecimalValue, Element, Primitive, PrimitiveMeta, PrimitiveValue, Resource, Value};
