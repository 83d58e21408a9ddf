//! Builds a JSON-API document from a small record graph, reads it back and
//! prints the nested export.
//!
//!   cargo run --example quickstart

use anyhow::Result;
use jsonapi_payload::logging::setup_tracing;
use jsonapi_payload::model::{RelationKind, Related};
use jsonapi_payload::{Payload, Record, RecordSet};
use serde_json::{json, Value};

fn main() -> Result<()> {
    setup_tracing();

    let science = Record::new("Tag").with_id(2).persisted().with_field("name", "Science");
    let gallery = Record::new("Gallery").with_id(1).persisted().with_field("name", "Retro");

    let images = RecordSet::new(vec![
        Record::new("Image")
            .with_id(1)
            .persisted()
            .with_field("title", "Amiga 1200")
            .with_one("gallery", gallery.clone())
            .with_relation(
                "tags",
                RelationKind::new("Tag", "images").through("images_tags"),
                Related::Many(vec![science.clone()]),
            ),
        Record::new("Image")
            .with_id(2)
            .persisted()
            .with_field("title", "Atari 520ST")
            .with_one("gallery", gallery)
            .with_many(
                "tags",
                "Tag",
                vec![science, Record::new("Tag").with_field("name", "Unsaved")],
            ),
    ])
    .with_meta(serde_json::from_value(json!({"count": 2}))?);

    let mut payload = Payload::new();
    payload.set(&images);

    let document = payload.to_json()?;
    println!("Document:\n{}", serde_json::to_string_pretty(&document)?);

    let parsed = Payload::parse(document)?;
    let rows: Vec<Value> = parsed.export(None)?.into_iter().map(Value::Object).collect();
    println!("\nExport:\n{}", serde_json::to_string_pretty(&rows)?);

    Ok(())
}
