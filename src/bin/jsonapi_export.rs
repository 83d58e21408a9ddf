//! jsonapi-export: Rebuild nested objects from JSON-API documents
//!
//! Usage:
//!   # Export every primary resource with its relationships resolved
//!   jsonapi-export response.json
//!
//!   # Export a single entry by id
//!   jsonapi-export response.json --id 1
//!
//!   # One document per line, one exported row per line
//!   cat responses.jsonl | jsonapi-export --ndjson
//!
//!   # Re-serialize the parsed document instead of exporting it
//!   jsonapi-export response.json --normalize

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use jsonapi_payload::logging::setup_tracing;
use jsonapi_payload::{DocumentWriter, Payload, PayloadConfig, ResourceId};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};

#[derive(Parser, Debug)]
#[command(name = "jsonapi-export")]
#[command(about = "Rebuild nested objects from JSON-API documents", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Process newline-delimited JSON (one document per line)
    #[arg(long)]
    ndjson: bool,

    /// Export only the primary entry with this id
    #[arg(long)]
    id: Option<String>,

    /// Default primary key name in exported rows (default: "id")
    #[arg(long)]
    key: Option<String>,

    /// Primary key name for one type, as TYPE=FIELD (repeatable)
    #[arg(long = "type-key", value_name = "TYPE=FIELD")]
    type_keys: Vec<String>,

    /// Print the parsed document in normalized form instead of exporting it
    #[arg(long)]
    normalize: bool,

    /// Write compact JSON instead of pretty-printing
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();

    // Build config
    let mut config = PayloadConfig::default();
    if let Some(key) = &args.key {
        config = config.with_key(key.as_str());
    }
    for pair in &args.type_keys {
        let Some((resource_type, field)) = pair.split_once('=') else {
            bail!("Invalid --type-key `{}`, expected TYPE=FIELD", pair);
        };
        config = config.with_type_key(resource_type.trim(), field.trim());
    }

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
            let payload = Payload::parse_with(line.as_str(), config.clone())
                .with_context(|| format!("Failed to parse document on line {}", number + 1))?;
            write_payload(&payload, &args, &mut writer, true)?;
        }
    } else {
        let value = read_document(reader)?;
        let payload = Payload::parse_with(value, config).context("Failed to read JSON-API document")?;
        write_payload(&payload, &args, &mut writer, false)?;
    }

    writer.flush()?;
    Ok(())
}

/// Decode a whole input with simd-json, which is faster on large documents
fn read_document(mut reader: Box<dyn BufRead>) -> Result<Value> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content).context("Failed to read input")?;
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    simd_json::serde::from_slice(&mut content).context("Failed to parse JSON")
}

fn write_payload<W: Write>(
    payload: &Payload,
    args: &Args,
    writer: &mut DocumentWriter<W>,
    per_line: bool,
) -> Result<()> {
    if args.normalize {
        return writer.write_document(&payload.serialize());
    }
    let id = args.id.as_deref().map(ResourceId::from);
    let rows = payload.export(id.as_ref())?;
    writer.write_rows(rows, per_line)
}
