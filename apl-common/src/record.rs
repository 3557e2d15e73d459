//! Paper record model
//!
//! A [`Record`] is one paper submission: a flat map from field name to typed
//! [`Value`], plus a stable synthetic id. Field access goes through
//! [`FieldDescriptor`]s so that values are checked against the schema type;
//! the identity and bookkeeping fields have typed helpers.

use crate::schema::{names, FieldDescriptor, FieldType, SchemaRegistry};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Separator of category unique names in stores
pub const CATEGORY_SEPARATOR: char = ';';

/// Ordered, duplicate-free set of category unique names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySet(Vec<String>);

impl CategorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `;`-joined store value
    pub fn parse(joined: &str) -> Self {
        joined
            .split(CATEGORY_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Add a unique name; returns false if it was already present
    pub fn insert(&mut self, unique_name: impl Into<String>) -> bool {
        let unique_name = unique_name.into();
        if self.contains(&unique_name) {
            return false;
        }
        self.0.push(unique_name);
        true
    }

    pub fn contains(&self, unique_name: &str) -> bool {
        self.0.iter().any(|c| c == unique_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Store representation, in insertion order
    pub fn joined(&self) -> String {
        self.0.join(&CATEGORY_SEPARATOR.to_string())
    }

    /// Membership equality, ignoring order
    pub fn same_members(&self, other: &CategorySet) -> bool {
        self.len() == other.len() && self.iter().all(|c| other.contains(c))
    }
}

impl FromIterator<String> for CategorySet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = CategorySet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl fmt::Display for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

/// Typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Categories(CategorySet),
}

impl Value {
    /// Empty value of a field type
    pub fn empty_for(field_type: FieldType) -> Value {
        match field_type {
            FieldType::String | FieldType::Text => Value::Str(String::new()),
            FieldType::Bool => Value::Bool(false),
            FieldType::Int => Value::Int(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Enum => Value::Categories(CategorySet::new()),
        }
    }

    /// Whether this value can be stored in a field of `field_type`
    pub fn fits(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (Value::Str(_), FieldType::String | FieldType::Text)
                | (Value::Bool(_), FieldType::Bool)
                | (Value::Int(_), FieldType::Int)
                | (Value::Float(_), FieldType::Float)
                | (Value::Categories(_), FieldType::Enum)
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Str(s) => s.trim().is_empty(),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => false,
            Value::Categories(c) => c.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.trim().is_empty(),
            Value::Categories(c) => !c.is_empty(),
        }
    }

    /// Flat text form used by columnar stores and string comparison
    pub fn to_cell(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Categories(c) => c.joined(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<CategorySet> for Value {
    fn from(value: CategorySet) -> Self {
        Value::Categories(value)
    }
}

/// One paper submission
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: Uuid,
    values: BTreeMap<String, Value>,
}

impl Record {
    /// Record with every active field set to its empty value
    ///
    /// `show_in_output` starts out true; hiding a paper is an explicit choice.
    pub fn blank(registry: &SchemaRegistry) -> Self {
        let mut values: BTreeMap<String, Value> = registry
            .active_fields()
            .into_iter()
            .map(|f| (f.name.clone(), Value::empty_for(f.field_type)))
            .collect();
        if let Some(show) = values.get_mut(names::SHOW_IN_OUTPUT) {
            *show = Value::Bool(true);
        }
        Self {
            id: Uuid::new_v4(),
            values,
        }
    }

    /// Stable synthetic id (never shown, never compared for identity)
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    pub(crate) fn reassign_id(&mut self) {
        self.id = Uuid::new_v4();
    }

    pub fn get(&self, field: &FieldDescriptor) -> Option<&Value> {
        self.values.get(&field.name)
    }

    /// Set a field, rejecting values of the wrong type
    pub fn set(&mut self, field: &FieldDescriptor, value: Value) -> Result<()> {
        if !value.fits(field.field_type) {
            return Err(Error::InvalidInput(format!(
                "value {:?} does not fit field '{}' of type {:?}",
                value, field.name, field.field_type
            )));
        }
        self.values.insert(field.name.clone(), value);
        Ok(())
    }

    /// Builder form of [`Record::set`]
    pub fn with(mut self, field: &FieldDescriptor, value: impl Into<Value>) -> Result<Self> {
        self.set(field, value.into())?;
        Ok(self)
    }

    fn str_field(&self, name: &str) -> &str {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Raw DOI as stored (may carry the conflict-marker token)
    pub fn doi(&self) -> &str {
        self.str_field(names::DOI)
    }

    pub fn title(&self) -> &str {
        self.str_field(names::TITLE)
    }

    pub fn contributor(&self) -> &str {
        self.str_field(names::CONTRIBUTOR)
    }

    /// Stored submission time, `None` if never assigned
    pub fn submission_time(&self) -> Option<&str> {
        Some(self.str_field(names::SUBMISSION_TIME).trim()).filter(|s| !s.is_empty())
    }

    pub fn conflict_marker(&self) -> bool {
        self.values
            .get(names::CONFLICT_MARKER)
            .is_some_and(Value::truthy)
    }

    pub fn categories(&self) -> CategorySet {
        match self.values.get(names::CATEGORY) {
            Some(Value::Categories(set)) => set.clone(),
            Some(Value::Str(joined)) => CategorySet::parse(joined),
            _ => CategorySet::new(),
        }
    }

    /// Bucket key used for ordering: the joined category string
    pub fn category_key(&self) -> String {
        self.categories().joined()
    }

    /// Whether the record should appear in the rendered report
    pub fn shown_in_output(&self) -> bool {
        self.values
            .get(names::SHOW_IN_OUTPUT)
            .map_or(true, Value::truthy)
    }

    pub(crate) fn set_conflict_marker(&mut self, marker: bool) {
        self.values
            .insert(names::CONFLICT_MARKER.to_string(), Value::Bool(marker));
    }

    pub(crate) fn set_submission_time(&mut self, timestamp: &str) {
        self.values.insert(
            names::SUBMISSION_TIME.to_string(),
            Value::Str(timestamp.to_string()),
        );
    }

    pub(crate) fn set_contributor(&mut self, contributor: &str) {
        self.values.insert(
            names::CONTRIBUTOR.to_string(),
            Value::Str(contributor.to_string()),
        );
    }
}
