//! Codec errors
//!
//! Every error aborts the current document; nothing is recovered.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("expected {expected}, found {found} at offset {offset}")]
    UnexpectedToken {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("unknown field '{field}' on {type_name}")]
    UnknownField { field: String, type_name: String },

    #[error("unknown resource type '{0}'")]
    UnknownResourceType(String),

    #[error("missing resourceType in resource starting at offset {offset}")]
    MissingResourceType { offset: usize },

    #[error("cannot convert '{text}' to {kind}: {reason}")]
    TypeConversion {
        text: String,
        kind: String,
        reason: String,
    },

    #[error("element <{element}> is in namespace '{found}', expected '{expected}'")]
    NamespaceMismatch {
        element: String,
        expected: String,
        found: String,
    },

    #[error("field '{field}' on {type_name} appears more than once")]
    DuplicateField { field: String, type_name: String },

    #[error("field '{field}' on {type_name} allows a single value, got {count}")]
    Cardinality {
        field: String,
        type_name: String,
        count: usize,
    },

    #[error("field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("nesting deeper than {limit} levels at offset {offset}")]
    DepthLimit { limit: usize, offset: usize },

    #[error("schema error: {0}")]
    Schema(#[from] fhirkit_models::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, FormatError>;

impl FormatError {
    pub(crate) fn unknown_field(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
            type_name: type_name.into(),
        }
    }

    pub(crate) fn duplicate_field(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::DuplicateField {
            field: field.into(),
            type_name: type_name.into(),
        }
    }

    pub(crate) fn conversion(text: &str, kind: impl ToString, reason: impl Into<String>) -> Self {
        Self::TypeConversion {
            text: text.to_string(),
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }
}
