//! # jsonapi-payload - JSON-API Payload Engine
//!
//! Converts between graphs of model entities and the normalized JSON-API wire
//! format: primary `data`, a deduplicated `included` side table, and typed
//! relationship pointers.
//!
//! ## Modules
//!
//! - **model**: the `Entity`/`Collection` interfaces the engine reads, plus an
//!   in-memory `Record` implementation
//! - **payload**: flattening, the store index, export and serialization
//! - **query**: query shaping for resource requests
//! - **source**: async glue to a JSON-API transport
//!
//! ## Quick Start
//!
//! ### Building a document
//!
//! ```rust
//! use jsonapi_payload::{Payload, Record};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let image = Record::new("Image")
//!     .with_id(1)
//!     .persisted()
//!     .with_field("title", "Amiga 1200")
//!     .with_one("gallery", Record::new("Gallery").with_field("name", "Foo"));
//!
//! let mut payload = Payload::new();
//! payload.set(&image);
//!
//! let document = payload.to_json()?;
//! assert_eq!(document["data"]["attributes"]["gallery"], json!({"name": "Foo"}));
//! # Ok(())
//! # }
//! ```
//!
//! ### Reading a document
//!
//! ```rust
//! use jsonapi_payload::Payload;
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let payload = Payload::parse(r#"{
//!     "data": {"type": "articles", "id": "1", "attributes": {"title": "JSON:API"},
//!              "relationships": {"author": {"data": {"type": "people", "id": "9"}}}},
//!     "included": [{"type": "people", "id": "9", "attributes": {"name": "Dan"}}]
//! }"#)?;
//!
//! let rows = payload.export(None)?;
//! assert_eq!(rows[0]["author"], json!({"id": "9", "name": "Dan"}));
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::io::{BufRead, Write};

pub mod error;
pub mod logging;
pub mod model;
pub mod payload;
pub mod query;
pub mod source;
pub mod types;

// Re-export commonly used types for convenience
pub use error::PayloadError;
pub use model::{Collection, Entity, Record, RecordDef, RecordSet, Resource};
pub use payload::{DocumentWriter, Payload, PrimaryRef, RawPayload};
pub use query::Query;
pub use source::{Source, Transport, TransportError};
pub use types::{Document, ErrorObject, PayloadConfig, Pointer, ResourceId, ResourceObject};

/// Main entry point: export a stream of JSON-API documents, one per line,
/// into nested rows.
pub fn export_json<R: BufRead, W: Write>(
    reader: R,
    writer: &mut DocumentWriter<W>,
    config: &PayloadConfig,
) -> Result<()> {
    for (number, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }
        let payload = Payload::parse_with(line.as_str(), config.clone())
            .with_context(|| format!("Failed to parse document on line {}", number + 1))?;
        writer.write_rows(payload.export(None)?, true)?;
    }
    Ok(())
}
