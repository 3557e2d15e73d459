//! Submission templates
//!
//! Contributors fill in a JSON template (one object or an array) or a CSV
//! template with the store's column names. Parsed submissions are fresh
//! records: new ids, no conflict marker, no submission time.

use super::{json, spreadsheet};
use crate::record::Record;
use crate::schema::{names, SchemaRegistry};
use crate::{Error, Result};
use std::path::Path;
use tracing::info;

/// Parse one submission file; format chosen by extension (`.csv` or JSON)
pub async fn load_submissions(registry: &SchemaRegistry, path: &Path) -> Result<Vec<Record>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read submission {}: {}", path.display(), e),
        ))
    })?;

    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    let parsed = if is_csv {
        spreadsheet::parse_rows(registry, &content)?
    } else {
        json::parse_records(registry, &content, path)?
    };

    let submissions: Vec<Record> = parsed.into_iter().map(|r| as_fresh(registry, r)).collect();

    info!(
        path = %path.display(),
        count = submissions.len(),
        "Loaded submissions"
    );
    Ok(submissions)
}

/// Parse several submission files, in order
pub async fn load_submission_files(
    registry: &SchemaRegistry,
    paths: &[impl AsRef<Path>],
) -> Result<Vec<Record>> {
    let mut all = Vec::new();
    for path in paths {
        all.extend(load_submissions(registry, path.as_ref()).await?);
    }
    Ok(all)
}

fn as_fresh(registry: &SchemaRegistry, mut record: Record) -> Record {
    record.reassign_id();
    record.set_conflict_marker(false);
    if registry.field(names::SUBMISSION_TIME).is_some() {
        record.set_submission_time("");
    }
    record
}
