//! Schema-driven value coercion
//!
//! Raw spreadsheet cells and JSON values are converted into typed [`Value`]s
//! here, so that every record reaching the merge engine has each active field
//! populated with a value of the right type:
//! - strings trimmed
//! - bool words (`true`/`yes`/`y`/`1`/`x`) to `true`, anything else `false`
//! - numbers parsed, unparseable numbers to the type's empty value
//! - `nan` / JSON `null` to the empty value
//! - categories split on `;`
//! - unknown keys ignored, missing fields empty

use crate::record::{CategorySet, Record, Value};
use crate::schema::{names, FieldDescriptor, FieldType, SchemaRegistry};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;
use uuid::Uuid;

/// Reserved key holding the synthetic record id in file stores
pub const ID_KEY: &str = "_id";

fn is_nan_sentinel(raw: &str) -> bool {
    raw.eq_ignore_ascii_case("nan")
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "t" | "x"
    )
}

/// Coerce one raw cell into the field's type
pub fn coerce_cell(field: &FieldDescriptor, raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() || is_nan_sentinel(raw) {
        return empty_value(field);
    }

    match field.field_type {
        FieldType::String | FieldType::Text => Value::Str(raw.to_string()),
        FieldType::Bool => Value::Bool(parse_bool(raw)),
        FieldType::Int => raw
            .parse::<i64>()
            .ok()
            .or_else(|| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
            .map(Value::Int)
            .unwrap_or_else(|| empty_value(field)),
        FieldType::Float => raw
            .parse::<f64>()
            .ok()
            .filter(|f| !f.is_nan())
            .map(Value::Float)
            .unwrap_or_else(|| empty_value(field)),
        FieldType::Enum => Value::Categories(CategorySet::parse(raw)),
    }
}

/// Coerce one JSON value into the field's type
pub fn coerce_json(field: &FieldDescriptor, raw: &JsonValue) -> Value {
    match (raw, field.field_type) {
        (JsonValue::Null, _) => empty_value(field),
        (JsonValue::Bool(b), FieldType::Bool) => Value::Bool(*b),
        (JsonValue::Number(n), FieldType::Bool) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
        (JsonValue::Number(n), FieldType::Int) => n
            .as_i64()
            .map(Value::Int)
            .unwrap_or_else(|| coerce_cell(field, &n.to_string())),
        (JsonValue::Number(n), FieldType::Float) => n
            .as_f64()
            .map(Value::Float)
            .unwrap_or_else(|| empty_value(field)),
        (JsonValue::Array(items), FieldType::Enum) => Value::Categories(
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        (JsonValue::String(s), _) => coerce_cell(field, s),
        (other, _) => coerce_cell(field, &other.to_string()),
    }
}

/// Empty value, except `show_in_output` which defaults to shown
fn empty_value(field: &FieldDescriptor) -> Value {
    if field.name == names::SHOW_IN_OUTPUT {
        Value::Bool(true)
    } else {
        Value::empty_for(field.field_type)
    }
}

/// Typed value to JSON
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Categories(c) => JsonValue::String(c.joined()),
    }
}

/// Resolve a store key (storage name first, then field name)
fn lookup<'a>(registry: &'a SchemaRegistry, key: &str) -> Option<&'a FieldDescriptor> {
    registry
        .field_by_storage_name(key)
        .or_else(|| registry.field(key))
        .filter(|f| f.is_active())
}

/// Build a record from raw cells keyed by storage or field name
pub fn record_from_cells<'a, I>(registry: &SchemaRegistry, cells: I) -> Record
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut record = Record::blank(registry);
    for (key, raw) in cells {
        if key == ID_KEY {
            if let Ok(id) = Uuid::parse_str(raw.trim()) {
                record.set_id(id);
            }
            continue;
        }
        match lookup(registry, key) {
            Some(field) => {
                let value = coerce_cell(field, raw);
                // Coerced values always fit the field type
                let _ = record.set(field, value);
            }
            None => debug!(column = %key, "Ignoring unknown column"),
        }
    }
    record
}

/// Build a record from a JSON object keyed by storage or field name
pub fn record_from_json(registry: &SchemaRegistry, object: &Map<String, JsonValue>) -> Record {
    let mut record = Record::blank(registry);
    for (key, raw) in object {
        if key == ID_KEY {
            if let Some(id) = raw.as_str().and_then(|s| Uuid::parse_str(s.trim()).ok()) {
                record.set_id(id);
            }
            continue;
        }
        match lookup(registry, key) {
            Some(field) => {
                let value = coerce_json(field, raw);
                let _ = record.set(field, value);
            }
            None => debug!(key = %key, "Ignoring unknown key"),
        }
    }
    record
}

/// JSON object keyed by storage name, in schema order, with the record id
pub fn record_to_json(registry: &SchemaRegistry, record: &Record) -> Map<String, JsonValue> {
    let mut object = Map::new();
    object.insert(ID_KEY.to_string(), JsonValue::String(record.id().to_string()));
    for field in registry.active_fields() {
        let value = record
            .get(field)
            .cloned()
            .unwrap_or_else(|| empty_value(field));
        object.insert(field.storage_name.clone(), value_to_json(&value));
    }
    object
}

/// Cells in schema order (id first), matching [`header_row`]
pub fn record_to_cells(registry: &SchemaRegistry, record: &Record) -> Vec<String> {
    std::iter::once(record.id().to_string())
        .chain(registry.active_fields().into_iter().map(|field| {
            record
                .get(field)
                .map(Value::to_cell)
                .unwrap_or_else(|| empty_value(field).to_cell())
        }))
        .collect()
}

/// Column header: id key then active storage names in schema order
pub fn header_row(registry: &SchemaRegistry) -> Vec<String> {
    std::iter::once(ID_KEY.to_string())
        .chain(
            registry
                .active_fields()
                .into_iter()
                .map(|f| f.storage_name.clone()),
        )
        .collect()
}
