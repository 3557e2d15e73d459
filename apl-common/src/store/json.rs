//! JSON document store
//!
//! The canonical set as one JSON array of objects keyed by storage name.

use super::{coerce, write_replacing, RecordStore};
use crate::record::Record;
use crate::schema::SchemaRegistry;
use crate::{Error, Result};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct JsonStore<'r> {
    path: PathBuf,
    registry: &'r SchemaRegistry,
    backup: bool,
}

impl<'r> JsonStore<'r> {
    pub fn new(path: impl Into<PathBuf>, registry: &'r SchemaRegistry) -> Self {
        Self {
            path: path.into(),
            registry,
            backup: true,
        }
    }

    /// Enable or disable the `.bak` copy taken before each save
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse a JSON document holding one object or an array of objects
pub(crate) fn parse_records(
    registry: &SchemaRegistry,
    content: &str,
    origin: &Path,
) -> Result<Vec<Record>> {
    let document: JsonValue = serde_json::from_str(content)?;
    let objects = match document {
        JsonValue::Array(items) => items,
        object @ JsonValue::Object(_) => vec![object],
        other => {
            return Err(Error::InvalidInput(format!(
                "{}: expected object or array, found {}",
                origin.display(),
                json_kind(&other)
            )))
        }
    };

    objects
        .iter()
        .enumerate()
        .map(|(index, item)| match item.as_object() {
            Some(object) => Ok(coerce::record_from_json(registry, object)),
            None => Err(Error::InvalidInput(format!(
                "{}: entry {} is {}, expected object",
                origin.display(),
                index,
                json_kind(item)
            ))),
        })
        .collect()
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

impl RecordStore for JsonStore<'_> {
    async fn load(&self) -> Result<Vec<Record>> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!(path = %self.path.display(), "JSON store missing; starting empty");
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_records(self.registry, &content, &self.path)
    }

    async fn save(&self, records: &[Record]) -> Result<()> {
        let document = JsonValue::Array(
            records
                .iter()
                .map(|r| JsonValue::Object(coerce::record_to_json(self.registry, r)))
                .collect(),
        );
        let mut content = serde_json::to_string_pretty(&document)?;
        content.push('\n');
        write_replacing(&self.path, content.as_bytes(), self.backup).await
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}
