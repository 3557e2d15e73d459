//! Columnar (spreadsheet) store
//!
//! CSV with a header row of storage names and one paper per row. Rows are
//! written in display order so the file reads like the rendered list.

use super::{coerce, write_replacing, RecordStore};
use crate::record::Record;
use crate::schema::SchemaRegistry;
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct CsvStore<'r> {
    path: PathBuf,
    registry: &'r SchemaRegistry,
    backup: bool,
}

impl<'r> CsvStore<'r> {
    pub fn new(path: impl Into<PathBuf>, registry: &'r SchemaRegistry) -> Self {
        Self {
            path: path.into(),
            registry,
            backup: true,
        }
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse CSV content; columns are matched by header name
pub(crate) fn parse_rows(registry: &SchemaRegistry, content: &str) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        records.push(coerce::record_from_cells(
            registry,
            headers.iter().zip(row.iter()),
        ));
    }
    Ok(records)
}

fn render_rows(registry: &SchemaRegistry, records: &[Record]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(coerce::header_row(registry))?;
    for record in records {
        writer.write_record(coerce::record_to_cells(registry, record))?;
    }
    writer
        .into_inner()
        .map_err(|e| crate::Error::Internal(format!("CSV buffer flush failed: {e}")))
}

impl RecordStore for CsvStore<'_> {
    async fn load(&self) -> Result<Vec<Record>> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!(path = %self.path.display(), "Spreadsheet store missing; starting empty");
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_rows(self.registry, &content)
    }

    async fn save(&self, records: &[Record]) -> Result<()> {
        let content = render_rows(self.registry, records)?;
        write_replacing(&self.path, &content, self.backup).await
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CategorySet;
    use crate::schema::names;
    use tempfile::TempDir;

    #[test]
    fn test_parse_rows_with_partial_columns() {
        let registry = SchemaRegistry::builtin();
        let content = "Title,DOI,Category,Conflict\nFoo,10.1/a,method;survey,TRUE\n,,,\nBar,,other,\n";
        let records = parse_rows(&registry, content).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title(), "Foo");
        assert!(records[0].conflict_marker());
        assert_eq!(records[0].categories(), CategorySet::parse("method;survey"));
        assert!(!records[1].conflict_marker());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let registry = SchemaRegistry::builtin();
        let store = CsvStore::new(dir.path().join("papers.csv"), &registry).with_backup(false);

        let records = vec![
            Record::blank(&registry)
                .with(registry.core_field(names::TITLE), "Comma, inside")
                .unwrap()
                .with(registry.core_field(names::CATEGORY), CategorySet::parse("a;b"))
                .unwrap(),
            Record::blank(&registry)
                .with(registry.core_field(names::TITLE), "Line\nbreak")
                .unwrap(),
        ];

        store.save(&records).await.unwrap();
        assert_eq!(store.load().await.unwrap(), records);
        assert!(!dir.path().join("papers.csv.bak").exists());
    }
}
