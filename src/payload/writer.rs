use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;

use crate::types::Document;

/// Writes documents and exported rows as JSON, one value per line unless
/// pretty-printing is enabled.
pub struct DocumentWriter<W: Write> {
    writer: W,
    compact: bool,
}

impl<W: Write> DocumentWriter<W> {
    pub fn new(writer: W, compact: bool) -> Self {
        DocumentWriter { writer, compact }
    }

    pub fn write_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let json = if self.compact {
            serde_json::to_string(value)
        } else {
            serde_json::to_string_pretty(value)
        }
        .context("Failed to serialize output")?;
        writeln!(self.writer, "{}", json).context("Failed to write output")?;
        Ok(())
    }

    pub fn write_document(&mut self, document: &Document) -> Result<()> {
        self.write_value(document)
    }

    /// Writes exported rows as a single array, or one row per line with
    /// `per_line`.
    pub fn write_rows(&mut self, rows: Vec<Map<String, Value>>, per_line: bool) -> Result<()> {
        if !per_line {
            let rows: Vec<Value> = rows.into_iter().map(Value::Object).collect();
            return self.write_value(&rows);
        }
        for row in rows {
            let json = serde_json::to_string(&row).context("Failed to serialize row")?;
            writeln!(self.writer, "{}", json).context("Failed to write row")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }
}
