//! Tab-delimited flat-file conversion (page path).
//!
//! Records are JSON objects projected onto a configured header list. Field
//! values are normalized so the tab-delimited format stays well-formed:
//! embedded CR/LF/tab collapse to single spaces, quote characters are
//! stripped.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde_json::{Map, Value};

/// Collapse control characters that would break the tab-delimited layout.
pub fn normalize_field(value: &str) -> String {
    value
        .replace("\r\n", " ")
        .replace(['\n', '\r', '\t'], " ")
        .replace(['"', '\''], "")
}

fn value_to_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        // Nested structures are not expected in flat query rows; keep them
        // readable rather than dropping the field
        other => other.to_string(),
    }
}

/// Project one record onto the header list, case-insensitively. Missing
/// fields become empty strings.
pub fn record_to_line(record: &Map<String, Value>, lower_headers: &[String]) -> String {
    let fields: Vec<String> = lower_headers
        .iter()
        .map(|header| {
            record
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(header))
                .map(|(_, value)| normalize_field(&value_to_field(value)))
                .unwrap_or_default()
        })
        .collect();
    let mut line = fields.join("\t");
    line.push('\n');
    line
}

/// Append one page of records to the entity's text temp file, writing the
/// header row when the file is new. Returns the number of records written;
/// an empty page writes nothing and counts as exactly 0 records.
pub fn append_page(path: &Path, headers: &[String], records: &[Value]) -> io::Result<usize> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let write_header = file.metadata()?.len() == 0;
    let mut out = BufWriter::new(file);

    if write_header {
        writeln!(out, "{}", headers.join("\t"))?;
    }

    let lower_headers: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let mut written = 0usize;
    for record in records {
        match record.as_object() {
            Some(map) => {
                out.write_all(record_to_line(map, &lower_headers).as_bytes())?;
                written += 1;
            }
            None => log::warn!("skipping non-object record: {record}"),
        }
    }
    out.flush()?;
    Ok(written)
}
