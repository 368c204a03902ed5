//! Flat records normalized from nested response JSON

use serde_json::{Map, Value};

use crate::error::HarvestError;

/// One flat record: column name → scalar or array value
pub type Record = Map<String, Value>;

/// Maximum nesting depth accepted when flattening objects or walking
/// response groups
pub const MAX_DEPTH: usize = 16;

/// Column used when a list element is a bare scalar
pub const SCALAR_COLUMN: &str = "value";

/// Flatten a JSON object into dotted column names.
///
/// `{"public_metrics": {"like_count": 3}}` becomes
/// `{"public_metrics.like_count": 3}`. Arrays are kept as-is and empty
/// nested objects produce no column.
pub fn flatten(obj: &Map<String, Value>) -> Result<Record, HarvestError> {
    let mut out = Record::new();
    flatten_into("", obj, &mut out, 0)?;
    Ok(out)
}

fn flatten_into(
    prefix: &str,
    obj: &Map<String, Value>,
    out: &mut Record,
    depth: usize,
) -> Result<(), HarvestError> {
    if depth >= MAX_DEPTH {
        return Err(HarvestError::Malformed(format!(
            "record nested deeper than {MAX_DEPTH} levels at '{prefix}'"
        )));
    }
    for (key, value) in obj {
        let column = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten_into(&column, inner, out, depth + 1)?,
            other => {
                out.insert(column, other.clone());
            }
        }
    }
    Ok(())
}

/// Turn one list element into a record
pub fn from_element(value: &Value) -> Result<Record, HarvestError> {
    match value {
        Value::Object(obj) => flatten(obj),
        scalar => {
            let mut record = Record::new();
            record.insert(SCALAR_COLUMN.to_string(), scalar.clone());
            Ok(record)
        }
    }
}

/// Identity value as a string.
///
/// Strings are returned verbatim and numbers in decimal form; null, absent
/// and non-scalar values have no identity.
pub fn identity_of(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Rewrite a numeric identity as its string form in place
pub fn normalize_identity(record: &mut Record, field: &str) {
    if let Some(Value::Number(n)) = record.get(field) {
        let id = n.to_string();
        record.insert(field.to_string(), Value::String(id));
    }
}
