//! Batch → Arrow conversion with per-column type inference

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, ListBuilder, RecordBatch, StringArray,
    StringBuilder,
};
use arrow::datatypes::{Field, Schema};
use arrow::error::ArrowError;
use rustc_hash::FxHashSet;
use serde_json::Value;

use crate::batch::Batch;

static NULL: Value = Value::Null;

/// Inferred Arrow type of one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Boolean,
    Int64,
    Float64,
    /// List<Utf8>
    List,
    Utf8,
}

impl ColumnType {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(n) if n.as_i64().is_some() => Some(Self::Int64),
            Value::Number(_) => Some(Self::Float64),
            Value::Array(_) => Some(Self::List),
            Value::String(_) | Value::Object(_) => Some(Self::Utf8),
        }
    }

    fn unify(self, other: Self) -> Self {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Int64, Float64) | (Float64, Int64) => Float64,
            _ => Utf8,
        }
    }
}

/// Column names: identity field first, then first-seen order across rows
fn column_names(batch: &Batch) -> Vec<String> {
    let identity = batch.identity_field();
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    seen.insert(identity);
    let mut names = vec![identity.to_string()];
    for row in batch.rows() {
        for key in row.keys() {
            if seen.insert(key.as_str()) {
                names.push(key.clone());
            }
        }
    }
    names
}

/// Render a value as text: strings verbatim, anything else as JSON
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn build_column(batch: &Batch, name: &str, force_utf8: bool) -> ArrayRef {
    let values = || batch.rows().iter().map(|r| r.get(name).unwrap_or(&NULL));
    let inferred = values()
        .filter_map(ColumnType::of)
        .reduce(ColumnType::unify)
        .unwrap_or(ColumnType::Utf8);
    let column_type = if force_utf8 { ColumnType::Utf8 } else { inferred };

    match column_type {
        ColumnType::Boolean => Arc::new(values().map(Value::as_bool).collect::<BooleanArray>()),
        ColumnType::Int64 => Arc::new(values().map(Value::as_i64).collect::<Int64Array>()),
        ColumnType::Float64 => Arc::new(values().map(Value::as_f64).collect::<Float64Array>()),
        ColumnType::List => {
            let mut builder = ListBuilder::new(StringBuilder::new());
            for value in values() {
                match value {
                    Value::Array(items) => {
                        for item in items {
                            builder.values().append_option(as_text(item));
                        }
                        builder.append(true);
                    }
                    _ => builder.append(false),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Utf8 => Arc::new(values().map(as_text).collect::<StringArray>()),
    }
}

/// Convert a batch to an Arrow record batch.
///
/// The identity column is always present, first and Utf8, even when no row
/// carries it. All columns are nullable.
pub fn to_arrow(batch: &Batch) -> Result<RecordBatch, ArrowError> {
    let identity = batch.identity_field();
    let names = column_names(batch);

    let columns: Vec<ArrayRef> = names
        .iter()
        .map(|name| build_column(batch, name, name == identity))
        .collect();
    let fields: Vec<Field> = names
        .iter()
        .zip(&columns)
        .map(|(name, col)| Field::new(name, col.data_type().clone(), true))
        .collect();

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}
