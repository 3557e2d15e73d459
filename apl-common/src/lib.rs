//! # APL Common Library
//!
//! Core of the paper list tooling:
//! - Schema registry (fields and categories)
//! - Record model and identity resolution
//! - Merge engine with conflict marking
//! - Submission validation
//! - Store adapters (JSON, CSV, SQLite)
//! - Markdown report rendering
//! - Configuration loading

pub mod config;
pub mod error;
pub mod identity;
pub mod merge;
pub mod record;
pub mod report;
pub mod schema;
pub mod store;
pub mod time;
pub mod validate;

pub use error::{Error, Result};
pub use identity::IdentityResolver;
pub use merge::{MergeEngine, MergeOptions, MergePolicy, MergeReport};
pub use record::{CategorySet, Record, Value};
pub use schema::SchemaRegistry;
pub use store::RecordStore;
