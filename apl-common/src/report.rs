//! Markdown list rendering
//!
//! Reads the canonical set (as stored) and writes one table per category.
//! Conflict shadows and hidden papers are left out.

use crate::record::{Record, Value};
use crate::schema::{CategoryDescriptor, FieldDescriptor, SchemaRegistry};
use std::fmt::Write as _;

const UNCATEGORIZED: &str = "Uncategorized";

fn escape_cell(raw: &str) -> String {
    raw.trim()
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

fn render_cell(registry: &SchemaRegistry, field: &FieldDescriptor, record: &Record) -> String {
    match record.get(field) {
        Some(Value::Categories(set)) => set
            .iter()
            .map(|name| {
                registry
                    .category(name)
                    .map_or(name, |c| c.display_name.as_str())
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Bool(true)) => "yes".to_string(),
        Some(Value::Bool(false)) => String::new(),
        Some(value) => escape_cell(&value.to_cell()),
        None => String::new(),
    }
}

fn render_table(out: &mut String, registry: &SchemaRegistry, records: &[&Record]) {
    let columns = registry.output_fields();
    let header: Vec<&str> = columns.iter().map(|f| f.display_name.as_str()).collect();

    let _ = writeln!(out, "| {} |", header.join(" | "));
    let _ = writeln!(out, "|{}", " --- |".repeat(columns.len()));
    for record in records {
        let cells: Vec<String> = columns
            .iter()
            .map(|field| render_cell(registry, field, record))
            .collect();
        let _ = writeln!(out, "| {} |", cells.join(" | "));
    }
    out.push('\n');
}

fn render_section(
    out: &mut String,
    registry: &SchemaRegistry,
    level: &str,
    category: &CategoryDescriptor,
    listed: &[&Record],
) {
    let members: Vec<&Record> = listed
        .iter()
        .copied()
        .filter(|r| r.categories().contains(&category.unique_name))
        .collect();
    if members.is_empty() {
        return;
    }
    let _ = writeln!(out, "{level} {}\n", category.display_name);
    render_table(out, registry, &members);
}

/// Render the public list as Markdown
///
/// Papers appear under every category they carry, newest first.
pub fn render_markdown(registry: &SchemaRegistry, records: &[Record]) -> String {
    let mut listed: Vec<&Record> = records
        .iter()
        .filter(|r| !r.conflict_marker() && r.shown_in_output())
        .collect();
    // Fixed-width timestamps sort chronologically as strings
    listed.sort_by(|a, b| {
        b.submission_time()
            .unwrap_or_default()
            .cmp(a.submission_time().unwrap_or_default())
    });

    let mut out = String::new();
    for primary in registry.primary_categories() {
        render_section(&mut out, registry, "##", primary, &listed);
        for child in registry.subcategories(&primary.unique_name) {
            render_section(&mut out, registry, "###", child, &listed);
        }
    }

    let uncategorized: Vec<&Record> = listed
        .iter()
        .copied()
        .filter(|r| {
            !r.categories()
                .iter()
                .any(|name| registry.category(name).is_some_and(|c| c.enabled))
        })
        .collect();
    if !uncategorized.is_empty() {
        let _ = writeln!(out, "## {UNCATEGORIZED}\n");
        render_table(&mut out, registry, &uncategorized);
    }

    out
}
