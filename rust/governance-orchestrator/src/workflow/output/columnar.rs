//! Column-oriented encodings: Parquet file and Avro object container, both
//! base64 encoded.

use std::sync::Arc;

use apache_avro::types::Value as AvroValue;
use apache_avro::{Schema, Writer};
use arrow_array::{ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{Field, Schema as ArrowSchema};
use base64::Engine as _;
use parquet::arrow::ArrowWriter;
use serde_json::{json, Value};

use super::columns::{cell_text, infer_schema, unique_names, ColumnSchema, ColumnType, Table};
use super::{EncodeError, Encoded, FormatWarning};
use crate::workflow::execution::Severity;

/// Low warnings for columns whose integers did not fit a signed 64-bit value.
fn widening_warnings(schema: &[ColumnSchema]) -> Vec<FormatWarning> {
    schema
        .iter()
        .filter(|c| c.widened)
        .map(|c| {
            FormatWarning::new(
                Severity::Low,
                format!(
                    "column '{}' holds integers beyond the signed 64-bit range and was encoded as double",
                    c.name
                ),
            )
        })
        .collect()
}

fn cell(table: &Table, row: usize, index: usize) -> Option<&Value> {
    table.rows[row]
        .get(index)
        .and_then(Option::as_ref)
        .filter(|v| !v.is_null())
}

fn arrow_column(table: &Table, index: usize, column_type: ColumnType) -> ArrayRef {
    let cells = (0..table.rows.len()).map(|row| cell(table, row, index));
    match column_type {
        ColumnType::Boolean => Arc::new(cells.map(|c| c.and_then(Value::as_bool)).collect::<BooleanArray>()),
        ColumnType::Long => Arc::new(cells.map(|c| c.and_then(Value::as_i64)).collect::<Int64Array>()),
        ColumnType::Double => Arc::new(cells.map(|c| c.and_then(Value::as_f64)).collect::<Float64Array>()),
        ColumnType::String => Arc::new(
            cells
                .map(|c| c.map(|v| cell_text(Some(v))))
                .collect::<StringArray>(),
        ),
    }
}

/// Encode a table as a single-row-group Parquet file, base64 encoded.
pub(super) fn encode_parquet(table: &Table) -> Result<Encoded, EncodeError> {
    let schema = infer_schema(table);
    if schema.is_empty() {
        return Err(EncodeError::new("parquet", "no columns to encode"));
    }

    let fields: Vec<Field> = schema
        .iter()
        .map(|c| Field::new(c.name.clone(), c.column_type.arrow_type(), c.nullable))
        .collect();
    let arrow_schema = Arc::new(ArrowSchema::new(fields));
    let columns: Vec<ArrayRef> = schema
        .iter()
        .enumerate()
        .map(|(i, c)| arrow_column(table, i, c.column_type))
        .collect();
    let batch = RecordBatch::try_new(Arc::clone(&arrow_schema), columns)
        .map_err(|e| EncodeError::new("parquet", e))?;

    let mut bytes = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut bytes, arrow_schema, None)
        .map_err(|e| EncodeError::new("parquet", e))?;
    writer.write(&batch).map_err(|e| EncodeError::new("parquet", e))?;
    writer.close().map_err(|e| EncodeError::new("parquet", e))?;

    Ok(Encoded {
        payload: base64::engine::general_purpose::STANDARD.encode(bytes),
        warnings: widening_warnings(&schema),
    })
}

/// Avro record schema for the inferred columns.
fn avro_schema(schema: &[ColumnSchema], names: &[String]) -> Value {
    let fields: Vec<Value> = schema
        .iter()
        .zip(names)
        .map(|(column, name)| {
            let primitive = column.column_type.avro_name();
            if column.nullable {
                json!({ "name": name, "type": ["null", primitive], "default": null })
            } else {
                json!({ "name": name, "type": primitive })
            }
        })
        .collect();

    json!({
        "type": "record",
        "name": "ClassificationResult",
        "namespace": "governance.output",
        "fields": fields,
    })
}

fn avro_value(cell: Option<&Value>, column_type: ColumnType) -> AvroValue {
    match (cell, column_type) {
        (None | Some(Value::Null), _) => AvroValue::Null,
        (Some(Value::Bool(b)), ColumnType::Boolean) => AvroValue::Boolean(*b),
        // Inferred long columns only hold values that fit in an i64.
        (Some(Value::Number(n)), ColumnType::Long) => match n.as_i64() {
            Some(v) => AvroValue::Long(v),
            None => AvroValue::String(n.to_string()),
        },
        (Some(Value::Number(n)), ColumnType::Double) => match n.as_f64() {
            Some(v) => AvroValue::Double(v),
            None => AvroValue::String(n.to_string()),
        },
        (Some(other), _) => AvroValue::String(cell_text(Some(other))),
    }
}

/// Encode a table as an Avro object container file, base64 encoded.
pub(super) fn encode_avro(table: &Table) -> Result<Encoded, EncodeError> {
    let schema = infer_schema(table);
    let names = unique_names(&table.columns, &[]);

    let schema_json = avro_schema(&schema, &names).to_string();
    let avro_schema = Schema::parse_str(&schema_json).map_err(|e| EncodeError::new("avro", e))?;

    let mut writer = Writer::new(&avro_schema, Vec::new());
    for row in &table.rows {
        let fields: Vec<(String, AvroValue)> = schema
            .iter()
            .zip(&names)
            .enumerate()
            .map(|(i, (column, name))| {
                let value = avro_value(row.get(i).and_then(Option::as_ref), column.column_type);
                let value = if column.nullable {
                    match value {
                        AvroValue::Null => AvroValue::Union(0, Box::new(AvroValue::Null)),
                        other => AvroValue::Union(1, Box::new(other)),
                    }
                } else {
                    value
                };
                (name.clone(), value)
            })
            .collect();
        writer
            .append(AvroValue::Record(fields))
            .map_err(|e| EncodeError::new("avro", e))?;
    }

    let bytes = writer.into_inner().map_err(|e| EncodeError::new("avro", e))?;
    Ok(Encoded {
        payload: base64::engine::general_purpose::STANDARD.encode(bytes),
        warnings: widening_warnings(&schema),
    })
}
