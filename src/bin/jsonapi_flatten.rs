//! jsonapi-flatten: Build JSON-API documents from record graphs
//!
//! Input is a record definition, or an array of them for a collection:
//!
//!   {"type": "Image", "exists": true, "attributes": {"id": 1, "title": "Amiga 1200"},
//!    "relations": [{"name": "tags", "value": [
//!      {"type": "Tag", "exists": true, "attributes": {"id": 2, "name": "Science"}}]}]}
//!
//! Usage:
//!   jsonapi-flatten image.json
//!
//!   # Build a delete-by-identity body
//!   jsonapi-flatten images.json --delete
//!
//!   # One definition per line, one document per line
//!   cat records.jsonl | jsonapi-flatten --ndjson

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use jsonapi_payload::logging::setup_tracing;
use jsonapi_payload::{DocumentWriter, Payload, Record, RecordDef, RecordSet};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};

#[derive(Parser, Debug)]
#[command(name = "jsonapi-flatten")]
#[command(about = "Build JSON-API documents from record graphs", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Process newline-delimited JSON (one definition per line)
    #[arg(long)]
    ndjson: bool,

    /// Write compact JSON instead of pretty-printing
    #[arg(long)]
    compact: bool,

    /// Build a delete payload (type and id only)
    #[arg(long)]
    delete: bool,
}

fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();

    let reader = if let Some(file_path) = &args.input {
        Box::new(BufReader::new(
            File::open(file_path).with_context(|| format!("Failed to open {}", file_path))?,
        )) as Box<dyn BufRead>
    } else {
        Box::new(BufReader::new(std::io::stdin())) as Box<dyn BufRead>
    };

    let stdout = std::io::stdout();
    let mut writer = DocumentWriter::new(stdout.lock(), args.compact || args.ndjson);

    if args.ndjson {
        for (number, line) in reader.lines().enumerate() {
            let line = line.context("Failed to read line")?;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse JSON on line {}", number + 1))?;
            flatten_value(value, args.delete, &mut writer)?;
        }
    } else {
        let mut content = Vec::new();
        let mut reader = reader;
        reader.read_to_end(&mut content).context("Failed to read input")?;
        let value: Value = simd_json::serde::from_slice(&mut content).context("Failed to parse JSON")?;
        flatten_value(value, args.delete, &mut writer)?;
    }

    writer.flush()?;
    Ok(())
}

fn flatten_value<W: Write>(value: Value, delete: bool, writer: &mut DocumentWriter<W>) -> Result<()> {
    let mut payload = Payload::new();

    match value {
        Value::Array(items) => {
            let mut set = RecordSet::default();
            for item in items {
                match serde_json::from_value::<RecordDef>(item.clone()) {
                    Ok(def) => set.push(Record::from(def)),
                    // Kept so the document reports it as an unsupported member
                    Err(_) => set.push_foreign(item),
                }
            }
            if delete {
                payload.delete(&set);
            } else {
                payload.set(&set);
            }
        }
        other => {
            let def: RecordDef = serde_json::from_value(other).context("Invalid record definition")?;
            let record = Record::from(def);
            if delete {
                payload.delete(&record);
            } else {
                payload.set(&record);
            }
        }
    }

    writer.write_document(&payload.serialize())
}
