//! JSON-API payload engine
//!
//! Converts between a graph of model entities and the normalized JSON-API
//! wire format. The write path flattens entities into resource objects,
//! indexing persisted related entities into a side table that becomes
//! `included`. The read path indexes a parsed document's `included` array
//! and resolves relationship pointers back into nested plain objects.
//!
//! ## Example
//!
//! ```rust
//! use jsonapi_payload::payload::Payload;
//! use jsonapi_payload::model::Record;
//!
//! let tag = Record::new("Tag").with_id(1).persisted().with_field("name", "Science");
//! let image = Record::new("Image")
//!     .with_id(7)
//!     .persisted()
//!     .with_field("title", "Amiga 1200")
//!     .with_many("tags", "Tag", vec![tag]);
//!
//! let mut payload = Payload::new();
//! payload.set(&image);
//!
//! let document = payload.serialize();
//! assert_eq!(document.included.map(|included| included.len()), Some(1));
//! ```

pub mod document;
pub mod flattener;
pub mod rehydrate;
pub mod store;
pub mod writer;

pub use document::{Payload, PrimaryRef, RawPayload};
pub use flattener::Flattener;
pub use rehydrate::Rehydrator;
pub use store::{Store, StoreKey};
pub use writer::DocumentWriter;
