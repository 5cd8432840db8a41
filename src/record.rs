//! Record model and field conventions
//!
//! A record is an arbitrary JSON object plus engine-managed fields:
//! `id` (caller-supplied, required), `hash` (fingerprint of the id),
//! `_insertedAt` (epoch milliseconds), `_date` (shard date string).
//!
//! Two naming conventions carry semantics:
//! - index keys render a field value in its canonical string form
//! - `image_*` / `video_*` fields holding a `data:<mime>;base64,<payload>`
//!   string are media-bearing and get detached from the synchronous write path

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One stored record: a JSON object keyed by field name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

/// A media payload detached from a record before the primary write
#[derive(Debug, Clone)]
pub struct DetachedMedia {
    /// Field the payload was embedded in
    pub field: String,
    /// Declared media type from the data URL
    pub mime: String,
    /// Base64 payload from the data URL
    pub data_b64: String,
}

impl Record {
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Build a record from a JSON value; fails unless it is an object
    pub fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(crate::VaultError::Validation(format!(
                "record must be a JSON object, got {other}"
            ))),
        }
    }

    /// The caller-supplied record id, if present and a non-empty string
    pub fn id(&self) -> Option<&str> {
        match self.fields.get("id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterate over (field, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Fill in fields from `other` that this record lacks.
    ///
    /// Existing fields win; used by the media patch path to merge the
    /// pre-offload snapshot underneath the current persisted record.
    pub fn merge_missing_from(&mut self, other: &Record) {
        for (field, value) in other.iter() {
            if !self.fields.contains_key(field) {
                self.fields.insert(field.clone(), value.clone());
            }
        }
    }

    /// Detach every media-bearing field: the embedded payload is returned and
    /// the field is nulled in place.
    pub fn detach_media(&mut self) -> Vec<DetachedMedia> {
        let mut detached = Vec::new();
        for (field, value) in self.fields.iter_mut() {
            if !is_media_field(field) {
                continue;
            }
            if let Some((mime, data_b64)) = parse_data_url(value) {
                detached.push(DetachedMedia {
                    field: field.clone(),
                    mime,
                    data_b64,
                });
                *value = Value::Null;
            }
        }
        detached
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical string form of a field value for index keys.
///
/// Strings render raw, numbers and bools via their display form, and an
/// explicit null renders as the literal string `null` (the media offload
/// cycle depends on finding and replacing that placeholder entry). Arrays
/// and objects are not indexable; returns `None` for them.
pub fn index_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Whether a field name follows the media-bearing convention
pub fn is_media_field(name: &str) -> bool {
    name.starts_with("image_") || name.starts_with("video_")
}

/// Parse a `data:<mime>;base64,<payload>` string value
fn parse_data_url(value: &Value) -> Option<(String, String)> {
    let s = value.as_str()?;
    let rest = s.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    Some((mime.to_string(), payload.to_string()))
}

/// File extension for a declared media type, `bin` when unrecognizable.
///
/// `image/png` -> `png`, `image/svg+xml` -> `svg`.
pub fn extension_for_mime(mime: &str) -> String {
    mime.split('/')
        .nth(1)
        .and_then(|subtype| subtype.split('+').next())
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "bin".to_string())
}
