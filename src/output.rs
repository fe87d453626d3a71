//! Output formatting for query results.
//!
//! Supports table, CSV and JSON output formats.

use std::str::FromStr;

use colored::Colorize;
use comfy_table::{Cell as TableCell, ContentArrangement, Table};
use serde_json::Value as JsonValue;

use crate::engine::{Cell, Frame};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned text table.
    #[default]
    Table,
    /// Comma-separated values with a header line.
    Csv,
    /// JSON array of objects.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: '{other}'")),
        }
    }
}

/// Formats a frame according to the specified format.
pub fn format_frame(frame: &Frame, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_table(frame),
        OutputFormat::Csv => format_csv(frame),
        OutputFormat::Json => format_json(frame),
    }
}

/// Formats the frame as a table with a shape footer.
fn format_table(frame: &Frame) -> String {
    let mut table = Table::new();

    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);

    if !frame.columns.is_empty() {
        table.set_header(frame.columns.iter().map(TableCell::new));
    }

    for row in &frame.rows {
        table.add_row(row.iter().map(|v| TableCell::new(v.to_string())));
    }

    let (r, c) = frame.shape();
    format!("{table}\n{}\n", format!("({r} rows x {c} cols)").dimmed())
}

fn format_csv(frame: &Frame) -> String {
    let mut output = String::new();

    if !frame.columns.is_empty() {
        let header: Vec<String> = frame.columns.iter().map(|c| escape_csv(c)).collect();
        output.push_str(&header.join(","));
        output.push('\n');
    }

    for row in &frame.rows {
        let values: Vec<String> = row
            .iter()
            .map(|v| match v {
                Cell::Null => String::new(),
                other => escape_csv(&other.to_string()),
            })
            .collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    output
}

/// Escapes a value for CSV output.
fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn format_json(frame: &Frame) -> String {
    let rows: Vec<JsonValue> = frame
        .rows
        .iter()
        .map(|row| {
            let mut obj = serde_json::Map::new();
            for (i, cell) in row.iter().enumerate() {
                let name = frame
                    .columns
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("column_{}", i));
                obj.insert(name, serde_json::to_value(cell).unwrap_or(JsonValue::Null));
            }
            JsonValue::Object(obj)
        })
        .collect();

    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}
