//! Column selection and type inference for tabular formats.

use std::collections::HashMap;

use arrow_schema::DataType;
use governance_services::ClassificationItem;
use serde_json::Value;

/// Columns always placed first when present.
pub const PRIORITY_COLUMNS: [&str; 6] = ["id", "label", "confidence", "timestamp", "category", "score"];

/// Upper bound on columns beyond [`PRIORITY_COLUMNS`].
pub const MAX_EXTRA_COLUMNS: usize = 20;

/// Nested objects deeper than this are kept as JSON values.
const MAX_DEPTH: usize = 3;

/// Results laid out as rows of optional cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<Value>>>,
}

/// Inferred column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Long,
    Double,
    String,
}

impl ColumnType {
    /// Arrow type used for Parquet columns.
    #[must_use]
    pub fn arrow_type(self) -> DataType {
        match self {
            Self::Boolean => DataType::Boolean,
            Self::Long => DataType::Int64,
            Self::Double => DataType::Float64,
            Self::String => DataType::Utf8,
        }
    }

    /// Avro primitive type name.
    #[must_use]
    pub fn avro_name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Long => "long",
            Self::Double => "double",
            Self::String => "string",
        }
    }
}

/// Inferred schema of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    /// Some row lacks the column or holds null.
    pub nullable: bool,
    /// Integers beyond the signed 64-bit range forced the column to double.
    pub widened: bool,
}

/// Flatten an item into dotted key paths, in field order.
#[must_use]
pub fn flatten(item: &ClassificationItem) -> Vec<(String, Value)> {
    let mut out = vec![
        ("id".to_string(), Value::from(item.id.clone())),
        ("label".to_string(), Value::from(item.label.clone())),
        ("confidence".to_string(), Value::from(item.confidence)),
        ("timestamp".to_string(), Value::from(item.timestamp.to_rfc3339())),
    ];
    if let Some(category) = &item.category {
        out.push(("category".to_string(), Value::from(category.clone())));
    }
    if let Some(score) = item.score {
        out.push(("score".to_string(), Value::from(score)));
    }
    out.push(("source".to_string(), Value::from(item.source.clone())));
    for (key, value) in &item.attributes {
        flatten_value(&format!("attributes.{key}"), value, 2, &mut out);
    }
    out
}

fn flatten_value(path: &str, value: &Value, depth: usize, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if depth < MAX_DEPTH && !map.is_empty() => {
            for (key, nested) in map {
                flatten_value(&format!("{path}.{key}"), nested, depth + 1, out);
            }
        }
        other => out.push((path.to_string(), other.clone())),
    }
}

/// Select columns and lay results out as a table.
///
/// Priority columns come first, then the remaining keys by descending
/// frequency with ties broken by first appearance.
#[must_use]
pub fn tabulate(results: &[ClassificationItem]) -> Table {
    let flattened: Vec<Vec<(String, Value)>> = results.iter().map(flatten).collect();

    let mut stats: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut order = 0;
    for row in &flattened {
        for (key, _) in row {
            let entry = stats.entry(key.as_str()).or_insert_with(|| {
                order += 1;
                (0, order)
            });
            entry.0 += 1;
        }
    }

    let mut columns: Vec<String> = PRIORITY_COLUMNS
        .iter()
        .filter(|c| stats.contains_key(*c))
        .map(|c| (*c).to_string())
        .collect();

    let mut extras: Vec<(&str, usize, usize)> = stats
        .iter()
        .filter(|(key, _)| !PRIORITY_COLUMNS.contains(key))
        .map(|(key, (count, first))| (*key, *count, *first))
        .collect();
    extras.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    columns.extend(
        extras
            .into_iter()
            .take(MAX_EXTRA_COLUMNS)
            .map(|(key, _, _)| key.to_string()),
    );

    let rows = flattened
        .into_iter()
        .map(|row| {
            let mut cells: HashMap<String, Value> = row.into_iter().collect();
            columns.iter().map(|c| cells.remove(c)).collect()
        })
        .collect();

    Table { columns, rows }
}

/// Infer the type and nullability of every column.
#[must_use]
pub fn infer_schema(table: &Table) -> Vec<ColumnSchema> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut nullable = false;
            let mut widened = false;
            let mut column_type: Option<ColumnType> = None;
            for row in &table.rows {
                let observed = match row.get(i).and_then(Option::as_ref) {
                    None | Some(Value::Null) => {
                        nullable = true;
                        continue;
                    }
                    Some(Value::Bool(_)) => ColumnType::Boolean,
                    Some(Value::Number(n)) if n.is_i64() => ColumnType::Long,
                    Some(Value::Number(n)) if n.is_u64() => {
                        widened = true;
                        ColumnType::Double
                    }
                    Some(Value::Number(_)) => ColumnType::Double,
                    Some(_) => ColumnType::String,
                };
                column_type = Some(match (column_type, observed) {
                    (None, t) => t,
                    (Some(a), b) if a == b => a,
                    (Some(ColumnType::Long | ColumnType::Double), ColumnType::Long | ColumnType::Double) => {
                        ColumnType::Double
                    }
                    _ => ColumnType::String,
                });
            }
            ColumnSchema {
                name: name.clone(),
                // All-null columns are typed as strings.
                column_type: column_type.unwrap_or(ColumnType::String),
                nullable,
                widened: widened && column_type == Some(ColumnType::Double),
            }
        })
        .collect()
}

/// Render a cell as text. Missing and null cells are empty.
#[must_use]
pub fn cell_text(cell: Option<&Value>) -> String {
    match cell {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Replace every character outside `[A-Za-z0-9_]` (plus `extra`) with `_`
/// and make sure the name does not start with a digit or dash.
#[must_use]
pub fn sanitize_name(name: &str, extra: &[char]) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || extra.contains(&c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !sanitized.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        sanitized.insert(0, '_');
    }
    sanitized
}

/// Sanitize names and suffix duplicates so every name is unique.
#[must_use]
pub fn unique_names(columns: &[String], extra: &[char]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    columns
        .iter()
        .map(|c| {
            let base = sanitize_name(c, extra);
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}_{count}")
            }
        })
        .collect()
}
