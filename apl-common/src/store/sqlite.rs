//! SQLite store
//!
//! Rows are keyed by the synthetic record id and stored unordered; callers
//! derive display order from the loaded groups. The identity columns are
//! duplicated out of the JSON document for inspection with plain SQL.

use super::{coerce, RecordStore};
use crate::record::Record;
use crate::schema::SchemaRegistry;
use crate::{Error, Result};
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

pub struct SqliteStore<'r> {
    pool: SqlitePool,
    registry: &'r SchemaRegistry,
    label: String,
}

impl<'r> SqliteStore<'r> {
    /// Open (creating if needed) a database file
    pub async fn open(db_path: &Path, registry: &'r SchemaRegistry) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Single writer per store; one connection keeps it that way
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new paper database: {}", db_path.display());
        } else {
            info!("Opened existing paper database: {}", db_path.display());
        }

        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&pool)
            .await?;

        create_papers_table(&pool).await?;

        Ok(Self {
            pool,
            registry,
            label: format!("sqlite:{}", db_path.display()),
        })
    }

    /// Private in-memory database
    pub async fn in_memory(registry: &'r SchemaRegistry) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        create_papers_table(&pool).await?;
        Ok(Self {
            pool,
            registry,
            label: "sqlite::memory:".to_string(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Create the papers table (idempotent)
pub async fn create_papers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS papers (
            id TEXT PRIMARY KEY,
            doi TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT '',
            conflict_marker INTEGER NOT NULL DEFAULT 0,
            submission_time TEXT NOT NULL DEFAULT '',
            fields TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

impl RecordStore for SqliteStore<'_> {
    async fn load(&self) -> Result<Vec<Record>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT id, fields FROM papers")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(id, fields)| {
                let document: JsonValue = serde_json::from_str(&fields)?;
                let object = document.as_object().ok_or_else(|| {
                    Error::CorruptState(format!("paper {id}: fields column is not an object"))
                })?;
                let mut record = coerce::record_from_json(self.registry, object);
                let id = Uuid::parse_str(&id)
                    .map_err(|e| Error::CorruptState(format!("invalid paper id '{id}': {e}")))?;
                record.set_id(id);
                Ok(record)
            })
            .collect()
    }

    async fn save(&self, records: &[Record]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM papers").execute(&mut *tx).await?;

        for record in records {
            let fields = serde_json::to_string(&coerce::record_to_json(self.registry, record))?;
            sqlx::query(
                r#"
                INSERT INTO papers (id, doi, title, category, conflict_marker, submission_time, fields, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
                "#,
            )
            .bind(record.id().to_string())
            .bind(record.doi())
            .bind(record.title())
            .bind(record.category_key())
            .bind(record.conflict_marker())
            .bind(record.submission_time().unwrap_or_default())
            .bind(&fields)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
