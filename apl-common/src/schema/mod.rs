//! Schema Registry
//!
//! Config-driven table of recognized paper fields and categories. Every other
//! module consults it to know which fields exist, how they are stored, and how
//! their values are typed.
//!
//! # Architecture
//!
//! The registry is a process-wide singleton installed once (normally from the
//! TOML configuration) and read-only afterwards. If nothing is installed, the
//! first read initializes it with the compiled-in default schema.
//!
//! ```rust,ignore
//! use apl_common::schema::SchemaRegistry;
//!
//! SchemaRegistry::install(SchemaRegistry::new(fields, categories)?)?;
//! let registry = SchemaRegistry::global();
//! for field in registry.active_fields() {
//!     println!("{} -> {}", field.name, field.storage_name);
//! }
//! ```

mod defaults;

use crate::{Error, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub use defaults::{default_categories, default_fields};

/// Well-known field names the merge engine and stores depend on
pub mod names {
    pub const DOI: &str = "doi";
    pub const TITLE: &str = "title";
    pub const AUTHORS: &str = "authors";
    pub const DATE: &str = "date";
    pub const CATEGORY: &str = "category";
    pub const PAPER_URL: &str = "paper_url";
    pub const PROJECT_URL: &str = "project_url";
    pub const CONTRIBUTOR: &str = "contributor";
    pub const SUBMISSION_TIME: &str = "submission_time";
    pub const CONFLICT_MARKER: &str = "conflict_marker";
    pub const SHOW_IN_OUTPUT: &str = "show_in_output";
    pub const STATUS: &str = "status";

    /// Fields that must be present in every schema, with their required type
    pub(crate) const CORE_FIELDS: [(&str, super::FieldType); 6] = [
        (DOI, super::FieldType::String),
        (TITLE, super::FieldType::String),
        (CATEGORY, super::FieldType::Enum),
        (CONTRIBUTOR, super::FieldType::String),
        (SUBMISSION_TIME, super::FieldType::String),
        (CONFLICT_MARKER, super::FieldType::Bool),
    ];
}

static REGISTRY: OnceCell<SchemaRegistry> = OnceCell::new();

/// Value type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Single-line string
    String,
    /// Boolean flag
    Bool,
    /// Integer
    Int,
    /// Floating point number
    Float,
    /// Free text (summaries, notes)
    Text,
    /// Set of category unique names
    Enum,
}

/// One recognized paper field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Logical name used by records and code
    pub name: String,
    /// Column / key name in the persisted store (defaults to `name`)
    #[serde(default)]
    pub storage_name: String,
    /// Human readable label (defaults to `name`)
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Immutable fields are always enabled
    #[serde(default)]
    pub immutable: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Position in the store; unique and contiguous from 0
    pub order: u32,
    #[serde(default)]
    pub show_in_output: bool,
}

impl FieldDescriptor {
    /// Create an enabled, optional, mutable field
    pub fn new(name: impl Into<String>, field_type: FieldType, order: u32) -> Self {
        let name = name.into();
        Self {
            storage_name: name.clone(),
            display_name: name.clone(),
            name,
            field_type,
            required: false,
            immutable: false,
            enabled: true,
            order,
            show_in_output: false,
        }
    }

    /// Set storage (column) name
    pub fn stored_as(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = storage_name.into();
        self
    }

    /// Set display label
    pub fn displayed_as(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Mark field as required (implies immutable)
    pub fn required(mut self) -> Self {
        self.required = true;
        self.immutable = true;
        self
    }

    /// Mark field as immutable
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Mark field as disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Include field as a column in the rendered report
    pub fn shown(mut self) -> Self {
        self.show_in_output = true;
        self
    }

    /// Whether the field participates in records
    pub fn is_active(&self) -> bool {
        self.enabled || self.immutable
    }
}

/// One paper category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    /// Stable identifier, never reused
    pub unique_name: String,
    /// Cosmetic label, may collide across categories
    pub display_name: String,
    pub order: u32,
    /// `unique_name` of the parent category; `None` for primary categories
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl CategoryDescriptor {
    pub fn primary(unique_name: &str, display_name: &str, order: u32) -> Self {
        Self {
            unique_name: unique_name.to_string(),
            display_name: display_name.to_string(),
            order,
            parent: None,
            enabled: true,
        }
    }

    pub fn child(unique_name: &str, display_name: &str, order: u32, parent: &str) -> Self {
        Self {
            parent: Some(parent.to_string()),
            ..Self::primary(unique_name, display_name, order)
        }
    }

    pub fn is_primary(&self) -> bool {
        self.parent.is_none()
    }
}

fn default_true() -> bool {
    true
}

/// Validated field and category tables
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    /// Sorted by `order`
    fields: Vec<FieldDescriptor>,
    /// Sorted by `order`
    categories: Vec<CategoryDescriptor>,
    by_name: HashMap<String, usize>,
    by_storage_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Build a registry, normalizing descriptors and checking invariants
    pub fn new(
        fields: Vec<FieldDescriptor>,
        categories: Vec<CategoryDescriptor>,
    ) -> Result<Self> {
        let fields: Vec<FieldDescriptor> = fields.into_iter().map(normalize_field).collect();
        validate_fields(&fields)?;
        validate_categories(&categories)?;
        Ok(Self::assemble(fields, categories))
    }

    /// Compiled-in default schema
    pub fn builtin() -> Self {
        Self::assemble(
            default_fields().into_iter().map(normalize_field).collect(),
            default_categories(),
        )
    }

    fn assemble(
        mut fields: Vec<FieldDescriptor>,
        mut categories: Vec<CategoryDescriptor>,
    ) -> Self {
        fields.sort_by_key(|f| f.order);
        categories.sort_by_key(|c| c.order);

        let by_name = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        let by_storage_name = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.storage_name.clone(), i))
            .collect();

        Self {
            fields,
            categories,
            by_name,
            by_storage_name,
        }
    }

    /// Install the process-wide registry
    ///
    /// Fails if a registry was already installed or already read.
    pub fn install(registry: SchemaRegistry) -> Result<()> {
        REGISTRY
            .set(registry)
            .map_err(|_| Error::Schema("schema registry already initialized".to_string()))
    }

    /// Process-wide registry (built-in default if nothing was installed)
    pub fn global() -> &'static SchemaRegistry {
        REGISTRY.get_or_init(SchemaRegistry::builtin)
    }

    /// Every field in storage order, including disabled ones
    pub fn all_fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Enabled (or immutable) fields in storage order
    pub fn active_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_active()).collect()
    }

    pub fn required_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields.iter().filter(|f| f.required).collect()
    }

    /// Active fields rendered as report columns
    pub fn output_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.is_active() && f.show_in_output)
            .collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Look up a field by its store column name
    pub fn field_by_storage_name(&self, storage_name: &str) -> Option<&FieldDescriptor> {
        self.by_storage_name
            .get(storage_name)
            .map(|&i| &self.fields[i])
    }

    /// Descriptor of a field every valid schema contains
    ///
    /// Only meant for the names in [`names`] checked at construction time.
    pub fn core_field(&self, name: &str) -> &FieldDescriptor {
        match self.field(name) {
            Some(field) => field,
            None => unreachable!("schema registry validated without core field {name}"),
        }
    }

    pub fn active_categories(&self) -> Vec<&CategoryDescriptor> {
        self.categories.iter().filter(|c| c.enabled).collect()
    }

    pub fn category(&self, unique_name: &str) -> Option<&CategoryDescriptor> {
        self.categories.iter().find(|c| c.unique_name == unique_name)
    }

    /// Enabled categories without a parent, in order
    pub fn primary_categories(&self) -> Vec<&CategoryDescriptor> {
        self.categories
            .iter()
            .filter(|c| c.enabled && c.is_primary())
            .collect()
    }

    /// Enabled children of `parent`, in order
    pub fn subcategories(&self, parent: &str) -> Vec<&CategoryDescriptor> {
        self.categories
            .iter()
            .filter(|c| c.enabled && c.parent.as_deref() == Some(parent))
            .collect()
    }
}

fn normalize_field(mut field: FieldDescriptor) -> FieldDescriptor {
    if field.storage_name.trim().is_empty() {
        field.storage_name = field.name.clone();
    }
    if field.display_name.trim().is_empty() {
        field.display_name = field.name.clone();
    }
    if field.immutable {
        field.enabled = true;
    }
    field
}

fn validate_fields(fields: &[FieldDescriptor]) -> Result<()> {
    let mut names = HashSet::new();
    let mut storage_names = HashSet::new();
    let mut orders = HashSet::new();

    for field in fields {
        if field.name.trim().is_empty() {
            return Err(Error::Schema("field with empty name".to_string()));
        }
        if !names.insert(field.name.as_str()) {
            return Err(Error::Schema(format!("duplicate field name '{}'", field.name)));
        }
        if !storage_names.insert(field.storage_name.as_str()) {
            return Err(Error::Schema(format!(
                "duplicate storage name '{}'",
                field.storage_name
            )));
        }
        if !orders.insert(field.order) {
            return Err(Error::Schema(format!(
                "duplicate order {} (field '{}')",
                field.order, field.name
            )));
        }
        if field.required && !field.immutable {
            return Err(Error::Schema(format!(
                "required field '{}' must be immutable",
                field.name
            )));
        }
    }

    // Orders must be exactly 0..n
    let count = fields.len() as u32;
    if let Some(order) = orders.iter().find(|&&o| o >= count) {
        return Err(Error::Schema(format!(
            "field orders must be contiguous from 0; found {order} with {count} fields"
        )));
    }

    for (name, field_type) in names::CORE_FIELDS {
        match fields.iter().find(|f| f.name == name) {
            None => return Err(Error::Schema(format!("missing core field '{name}'"))),
            Some(field) if field.field_type != field_type => {
                return Err(Error::Schema(format!(
                    "core field '{name}' must have type {field_type:?}, found {:?}",
                    field.field_type
                )))
            }
            Some(field) if !field.is_active() => {
                return Err(Error::Schema(format!("core field '{name}' cannot be disabled")))
            }
            Some(_) => {}
        }
    }

    Ok(())
}

fn validate_categories(categories: &[CategoryDescriptor]) -> Result<()> {
    let mut unique_names = HashSet::new();
    for category in categories {
        if category.unique_name.trim().is_empty() || category.unique_name.contains(';') {
            return Err(Error::Schema(format!(
                "invalid category unique name '{}'",
                category.unique_name
            )));
        }
        if !unique_names.insert(category.unique_name.as_str()) {
            return Err(Error::Schema(format!(
                "duplicate category unique name '{}'",
                category.unique_name
            )));
        }
    }

    for category in categories {
        if let Some(parent) = &category.parent {
            if parent == &category.unique_name || !unique_names.contains(parent.as_str()) {
                return Err(Error::Schema(format!(
                    "category '{}' references unknown parent '{}'",
                    category.unique_name, parent
                )));
            }
        }
    }

    Ok(())
}
