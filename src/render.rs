use std::fmt::Write as _;
use std::str::FromStr;

use serde_json::{Map, Value};
use unicode_width::UnicodeWidthStr;

use crate::error::{Error, Result};
use crate::flags::FlagSet;
use crate::property::encode;
use crate::schema::PropertySchema;
use crate::zfs_types::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned columns with headers.
    Table,
    /// Tab separated, no headers.
    Compact,
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "table" => Ok(Self::Table),
            "compact" => Ok(Self::Compact),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(Error::validation(format!(
                "unrecognised output format `{other}`, must be one of: table, compact, csv, json"
            ))),
        }
    }
}

/// Resolve `--format` together with its `--json` and `--no-headers` shortcuts.
pub fn resolve_format(flags: &FlagSet, schema: &PropertySchema) -> Result<OutputFormat> {
    let explicit = flags.is_used("format");
    let format = match flags.get("format") {
        Some(raw) => match encode("format", raw, schema)? {
            crate::property::PropertyValue::String(s) => s.parse()?,
            _ => OutputFormat::Table,
        },
        None => OutputFormat::Table,
    };

    let shortcut = match (flags.is_true("json"), flags.is_true("no_headers")) {
        (true, true) => return Err(Error::validation("--json and --no-headers can't be used together")),
        (true, false) => Some(("--json", OutputFormat::Json)),
        (false, true) => Some(("--no-headers", OutputFormat::Compact)),
        (false, false) => None,
    };
    match shortcut {
        Some((flag, implied)) if explicit && implied != format => Err(Error::validation(format!(
            "{flag} conflicts with --format={}",
            flags.get("format").unwrap_or_default()
        ))),
        Some((_, implied)) => Ok(implied),
        None => Ok(format),
    }
}

/// Columns to show.
///
/// With `all_props`, the union of every record's keys in first-seen order, after the required
/// columns. Otherwise the explicit projection, or just the required columns.
pub fn select_columns(all_props: bool, projection: &[String], required: &[&str], records: &[Record]) -> Vec<String> {
    if all_props {
        let mut columns: Vec<String> = required.iter().map(|c| (*c).to_owned()).collect();
        for record in records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    } else if !projection.is_empty() {
        projection.to_vec()
    } else {
        required.iter().map(|c| (*c).to_owned()).collect()
    }
}

/// Render `records` restricted to `columns`. `label` names the collection in JSON output.
pub fn render(format: OutputFormat, label: &str, columns: &[String], records: &[Record]) -> Result<String> {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| columns.iter().map(|c| display_value(record.get(c))).collect())
        .collect();

    let out = match format {
        OutputFormat::Table => {
            let header = columns.iter().map(|c| c.to_uppercase()).collect::<Vec<_>>();
            aligned(std::iter::once(&header).chain(rows.iter()), columns.len())
        }
        OutputFormat::Compact => rows.iter().map(|row| row.join("\t") + "\n").collect(),
        OutputFormat::Csv => std::iter::once(columns)
            .chain(rows.iter().map(Vec::as_slice))
            .map(|row| row.iter().map(|cell| csv_field(cell)).collect::<Vec<_>>().join(",") + "\n")
            .collect(),
        OutputFormat::Json => {
            let objects = records
                .iter()
                .map(|record| {
                    let object: Map<String, Value> = columns
                        .iter()
                        .map(|c| (c.clone(), record.get(c).cloned().unwrap_or(Value::Null)))
                        .collect();
                    Value::Object(object)
                })
                .collect::<Vec<_>>();
            let mut document = Map::new();
            document.insert(label.to_owned(), Value::Array(objects));
            let mut s = serde_json::to_string_pretty(&Value::Object(document))
                .map_err(|e| Error::validation(format!("failed to encode {label}: {e}")))?;
            s.push('\n');
            s
        }
    };
    Ok(out)
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_owned(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn aligned<'r>(rows: impl Iterator<Item = &'r Vec<String>> + Clone, ncols: usize) -> String {
    let mut widths = vec![0; ncols];
    for row in rows.clone() {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.width());
        }
    }

    let mut out = String::new();
    for row in rows {
        let mut line = String::new();
        for (i, (cell, width)) in row.iter().zip(&widths).enumerate() {
            if i + 1 == ncols {
                line.push_str(cell);
            } else {
                let _ = write!(line, "{cell}{}  ", " ".repeat(width.saturating_sub(cell.width())));
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn csv_field(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_owned()
    }
}

/// Restore the schema's casing for enumerated values (the service reports e.g. `LZ4`).
pub fn canonicalize_enum_values(records: &mut [Record], schema: &PropertySchema) {
    for record in records {
        for (name, value) in record.iter_mut() {
            if let Value::String(s) = value {
                if let Some(canonical) = schema.canonical(name, s) {
                    *s = canonical.to_owned();
                }
            }
        }
    }
}
