//! Error types for payload construction, parsing and export.

use thiserror::Error;

/// Errors surfaced by the payload engine.
///
/// Unsupported inputs pushed through [`crate::Payload::set`] never reach the
/// caller as an `Err`: they are recorded as payload-level error objects so the
/// remaining members of a bulk set are still processed.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// `export` was asked for an id that is not part of the primary data.
    #[error("Unexisting data entry for id `{id}` in the JSON-API payload.")]
    UnknownEntry { id: String },

    /// A pushed value is not a recognized entity.
    #[error("The JSON-API serializer only supports Chaos entities.")]
    UnsupportedInput,

    /// Raw text could not be decoded as JSON.
    #[error("Failed to parse JSON-API document: {0}")]
    Parse(String),

    /// The decoded top-level value is not a JSON object.
    #[error("Invalid JSON-API document: {0}")]
    InvalidDocument(String),

    /// A decoded structure does not match the JSON-API wire shape.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = PayloadError> = std::result::Result<T, E>;
