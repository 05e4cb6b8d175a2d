// Notebook document model.
//
// A notebook is a JSON object with an ordered `cells` array and a `metadata`
// map. `Notebook` is an immutable value: every edit returns a new notebook,
// so callers never observe their own document changing underneath them.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::SignatureMetadata;

/// Reserved metadata key holding the lock record.
pub const SIGNATURE_METADATA_KEY: &str = "lock-signature";

#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("notebook must be a JSON object")]
    NotAnObject,
    #[error("notebook is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("notebook has no `cells` array")]
    MissingCells,
    #[error("notebook has no `metadata` object")]
    MissingMetadata,
    #[error("notebook field `{0}` must be an integer")]
    InvalidFormatVersion(&'static str),
    #[error("`{SIGNATURE_METADATA_KEY}` metadata is malformed: {0}")]
    MalformedSignature(#[source] serde_json::Error),
    #[error("failed to serialize notebook: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notebook {
    root: Map<String, Value>,
}

impl Notebook {
    pub fn from_value(value: Value) -> Result<Self, NotebookError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            _ => Err(NotebookError::NotAnObject),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, NotebookError> {
        let value = serde_json::from_str(raw).map_err(NotebookError::InvalidJson)?;
        Self::from_value(value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    pub fn cells(&self) -> Option<&Vec<Value>> {
        self.root.get("cells").and_then(Value::as_array)
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.root.get("metadata").and_then(Value::as_object)
    }

    /// Structural check: `cells` must be an array and `metadata` an object.
    /// `nbformat` / `nbformat_minor`, when present, must be integers.
    pub fn validate(&self) -> Result<(), NotebookError> {
        if self.cells().is_none() {
            return Err(NotebookError::MissingCells);
        }
        if self.metadata().is_none() {
            return Err(NotebookError::MissingMetadata);
        }
        for field in ["nbformat", "nbformat_minor"] {
            if let Some(value) = self.root.get(field) {
                if !value.is_u64() {
                    return Err(NotebookError::InvalidFormatVersion(field));
                }
            }
        }
        Ok(())
    }

    pub fn has_signature(&self) -> bool {
        self.metadata().is_some_and(|metadata| metadata.contains_key(SIGNATURE_METADATA_KEY))
    }

    /// Parse the lock record. `Ok(None)` when absent; an error when present
    /// but not a complete, well-formed record.
    pub fn signature(&self) -> Result<Option<SignatureMetadata>, NotebookError> {
        let Some(raw) = self.metadata().and_then(|m| m.get(SIGNATURE_METADATA_KEY)) else {
            return Ok(None);
        };
        serde_json::from_value(raw.clone()).map(Some).map_err(NotebookError::MalformedSignature)
    }

    /// Copy of this notebook with `signature` stored under the reserved key.
    /// Creates `metadata` if the notebook has none.
    pub fn with_signature(&self, signature: &SignatureMetadata) -> Result<Self, NotebookError> {
        let encoded = serde_json::to_value(signature).map_err(NotebookError::Serialize)?;
        let mut root = self.root.clone();
        let metadata = root.entry("metadata").or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Value::Object(metadata) = metadata {
            metadata.insert(SIGNATURE_METADATA_KEY.to_string(), encoded);
        }
        Ok(Self { root })
    }

    /// Copy of this notebook with the reserved key removed.
    pub fn without_signature(&self) -> Self {
        let mut root = self.root.clone();
        if let Some(Value::Object(metadata)) = root.get_mut("metadata") {
            metadata.shift_remove(SIGNATURE_METADATA_KEY);
        }
        Self { root }
    }

    /// Pretty JSON (two-space indent) with a trailing newline.
    pub fn to_pretty_json(&self) -> Result<String, NotebookError> {
        let mut out = serde_json::to_string_pretty(&self.root).map_err(NotebookError::Serialize)?;
        out.push('\n');
        Ok(out)
    }
}
