//! Canonical set persistence
//!
//! A store loads and saves the whole canonical set. File stores write in the
//! order they are given (display order); the SQLite store does not keep order.

pub mod coerce;
pub mod json;
pub mod spreadsheet;
#[cfg(feature = "sqlx")]
pub mod sqlite;
pub mod submission;

pub use json::JsonStore;
pub use spreadsheet::CsvStore;
#[cfg(feature = "sqlx")]
pub use sqlite::SqliteStore;
pub use submission::{load_submission_files, load_submissions};

use crate::record::Record;
use crate::schema::SchemaRegistry;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Load/save access to the canonical set
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Load every record; a store that does not exist yet loads as empty
    async fn load(&self) -> Result<Vec<Record>>;

    /// Replace the stored set with `records`
    async fn save(&self, records: &[Record]) -> Result<()>;

    /// Short label for log lines
    fn describe(&self) -> String;
}

/// Backing format of the canonical store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Json,
    Csv,
    Sqlite,
}

impl StoreKind {
    /// Guess the kind from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(StoreKind::Json),
            "csv" => Some(StoreKind::Csv),
            "db" | "sqlite" | "sqlite3" => Some(StoreKind::Sqlite),
            _ => None,
        }
    }
}

impl std::str::FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(StoreKind::Json),
            "csv" => Ok(StoreKind::Csv),
            "sqlite" => Ok(StoreKind::Sqlite),
            other => Err(Error::InvalidInput(format!(
                "unknown store kind '{other}' (expected json, csv or sqlite)"
            ))),
        }
    }
}

/// Store chosen at runtime from configuration
pub enum AnyStore<'r> {
    Json(JsonStore<'r>),
    Csv(CsvStore<'r>),
    #[cfg(feature = "sqlx")]
    Sqlite(SqliteStore<'r>),
}

/// Open the store described by `kind` and `path`
pub async fn open_store<'r>(
    kind: StoreKind,
    path: &Path,
    backup: bool,
    registry: &'r SchemaRegistry,
) -> Result<AnyStore<'r>> {
    let store = match kind {
        StoreKind::Json => AnyStore::Json(JsonStore::new(path, registry).with_backup(backup)),
        StoreKind::Csv => AnyStore::Csv(CsvStore::new(path, registry).with_backup(backup)),
        #[cfg(feature = "sqlx")]
        StoreKind::Sqlite => AnyStore::Sqlite(SqliteStore::open(path, registry).await?),
        #[cfg(not(feature = "sqlx"))]
        StoreKind::Sqlite => {
            return Err(Error::Config(
                "sqlite store requested but built without the sqlx feature".to_string(),
            ))
        }
    };
    debug!(store = %store.describe(), "Opened store");
    Ok(store)
}

impl RecordStore for AnyStore<'_> {
    async fn load(&self) -> Result<Vec<Record>> {
        match self {
            AnyStore::Json(s) => s.load().await,
            AnyStore::Csv(s) => s.load().await,
            #[cfg(feature = "sqlx")]
            AnyStore::Sqlite(s) => s.load().await,
        }
    }

    async fn save(&self, records: &[Record]) -> Result<()> {
        match self {
            AnyStore::Json(s) => s.save(records).await,
            AnyStore::Csv(s) => s.save(records).await,
            #[cfg(feature = "sqlx")]
            AnyStore::Sqlite(s) => s.save(records).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            AnyStore::Json(s) => s.describe(),
            AnyStore::Csv(s) => s.describe(),
            #[cfg(feature = "sqlx")]
            AnyStore::Sqlite(s) => s.describe(),
        }
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Write `content` to `path` through a temporary file and rename.
///
/// With `backup`, the previous file (if any) is first copied to
/// `<file>.bak`. A failed backup is logged and does not stop the write.
pub(crate) async fn write_replacing(path: &Path, content: &[u8], backup: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    if backup && tokio::fs::try_exists(path).await? {
        let backup_path = sibling_path(path, ".bak");
        if let Err(e) = tokio::fs::copy(path, &backup_path).await {
            warn!(
                path = %backup_path.display(),
                error = %e,
                "Backup copy failed; continuing with save"
            );
        }
    }

    let temp_path = sibling_path(path, ".tmp");
    tokio::fs::write(&temp_path, content).await.map_err(|e| {
        Error::Persistence(format!("writing {}: {}", temp_path.display(), e))
    })?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(Error::Persistence(format!(
            "replacing {}: {}",
            path.display(),
            e
        )));
    }

    debug!(path = %path.display(), bytes = content.len(), "Store file written");
    Ok(())
}
