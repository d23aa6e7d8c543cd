//! Error types for the schema model

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Invalid definition for {type_name}: {message}")]
    InvalidDefinition { type_name: String, message: String },

    #[error("Field {type_name}.{field} references unknown type {referenced}")]
    UnresolvedType {
        type_name: String,
        field: String,
        referenced: String,
    },

    #[error("Invalid decimal literal: {0}")]
    InvalidDecimal(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
