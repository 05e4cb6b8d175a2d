// Semantic content hashing for lock integrity checks.
//
// Only what a reader would call "the notebook's content" is hashed: each
// cell's source and outputs. Execution counters, transient display data,
// output metadata, notebook metadata (including the lock record itself) and
// cell metadata are all outside the hashed view.

use gitseal_common::notebook::Notebook;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Hex-encoded SHA-256 hash of notebook content.
pub type ContentHash = String;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    #[error("notebook has no `cells` array to hash")]
    MissingCells,
    #[error("cell {0} is not a JSON object")]
    MalformedCell(usize),
}

/// Hash of the notebook's semantic content, independent of key order,
/// whitespace, and volatile output fields.
pub fn content_hash(notebook: &Notebook) -> Result<ContentHash, HashError> {
    let projection = projection(notebook)?;
    Ok(sha256_hex(canonical_json(&projection).as_bytes()))
}

/// `[{source, outputs}, ...]` with sources joined and outputs normalized.
pub fn projection(notebook: &Notebook) -> Result<Value, HashError> {
    let cells = notebook.cells().ok_or(HashError::MissingCells)?;
    let projected = cells
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            let cell = cell.as_object().ok_or(HashError::MalformedCell(index))?;
            let mut entry = Map::new();
            entry.insert("source".to_string(), joined_source(cell.get("source")));
            entry.insert("outputs".to_string(), normalized_outputs(cell.get("outputs")));
            Ok(Value::Object(entry))
        })
        .collect::<Result<Vec<_>, HashError>>()?;
    Ok(Value::Array(projected))
}

/// nbformat allows a source to be one string or a list of line strings.
fn joined_source(source: Option<&Value>) -> Value {
    match source {
        None | Some(Value::Null) => Value::String(String::new()),
        Some(Value::Array(lines)) if lines.iter().all(Value::is_string) => {
            Value::String(lines.iter().filter_map(Value::as_str).collect())
        }
        Some(other) => other.clone(),
    }
}

fn normalized_outputs(outputs: Option<&Value>) -> Value {
    let Some(Value::Array(outputs)) = outputs else {
        return match outputs {
            None | Some(Value::Null) => Value::Array(Vec::new()),
            Some(other) => other.clone(),
        };
    };
    Value::Array(outputs.iter().map(normalized_output).collect())
}

fn normalized_output(output: &Value) -> Value {
    let Value::Object(fields) = output else {
        return output.clone();
    };
    let mut fields = fields.clone();
    if fields.contains_key("execution_count") {
        fields.insert("execution_count".to_string(), Value::Null);
    }
    fields.remove("transient");
    if fields.contains_key("metadata") {
        fields.insert("metadata".to_string(), Value::Object(Map::new()));
    }
    Value::Object(fields)
}

/// Compact JSON with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            out.push('{');
            for (position, key) in keys.into_iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&fields[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Compute the SHA-256 hash of the given bytes, returned as a lowercase hex string.
pub fn sha256_hex(content: &[u8]) -> ContentHash {
    let digest = Sha256::digest(content);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
