//! Homogeneous record batches with an identity column

use rustc_hash::FxHashSet;
use serde_json::Value;

use crate::error::HarvestError;
use crate::kind::RecordKind;
use crate::record::{self, Record};

/// Ordered records of a single kind.
///
/// Row order is insertion order; `append` never reorders and
/// `drop_duplicates` keeps the first occurrence of each identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    kind: RecordKind,
    rows: Vec<Record>,
}

impl Batch {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            rows: Vec::new(),
        }
    }

    /// Build from already-flat rows; numeric identities are stringified
    pub fn from_rows(kind: RecordKind, mut rows: Vec<Record>) -> Self {
        let field = kind.identity_field();
        for row in &mut rows {
            record::normalize_identity(row, field);
        }
        Self { kind, rows }
    }

    /// Build from a response group: a list of objects, or a single object.
    ///
    /// Rows are flattened, then the kind's rename map is applied.
    pub fn from_json(kind: RecordKind, value: &Value) -> Result<Self, HarvestError> {
        let rows = match value {
            Value::Array(items) => items
                .iter()
                .map(record::from_element)
                .collect::<Result<Vec<_>, _>>()?,
            Value::Object(obj) => vec![record::flatten(obj)?],
            other => {
                return Err(HarvestError::Malformed(format!(
                    "{kind}: expected list or object, got {}",
                    json_type(other)
                )));
            }
        };
        let mut batch = Self::from_rows(kind, rows);
        let renames = batch.kind.renames();
        if !renames.is_empty() {
            batch.rename_fields(renames);
        }
        Ok(batch)
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn identity_field(&self) -> &'static str {
        self.kind.identity_field()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Identity values in row order; rows without identity are skipped
    pub fn ids(&self) -> impl Iterator<Item = String> + '_ {
        let field = self.identity_field();
        self.rows.iter().filter_map(move |r| record::identity_of(r, field))
    }

    /// Concatenate `other` after this batch's rows
    pub fn append(&mut self, other: Batch) -> Result<(), HarvestError> {
        if other.kind != self.kind {
            return Err(HarvestError::KindMismatch {
                expected: self.kind.clone(),
                found: other.kind,
            });
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Keep only the first row for each identity value; returns rows removed.
    ///
    /// Rows without an identity are always kept. Only this batch is
    /// consulted; see [`crate::ledger`] for cross-session filtering.
    pub fn drop_duplicates(&mut self, identity_field: &str) -> usize {
        let before = self.rows.len();
        let mut seen = FxHashSet::default();
        self.rows
            .retain(|row| match record::identity_of(row, identity_field) {
                Some(id) => seen.insert(id),
                None => true,
            });
        let removed = before - self.rows.len();
        if removed > 0 {
            log::debug!(
                "{}: dropped {removed} in-batch duplicates, {} remaining",
                self.kind,
                self.rows.len()
            );
        }
        removed
    }

    /// Rename raw field names to normalized ones; returns rows touched.
    ///
    /// A mapped field missing from every row is logged and skipped, since
    /// response shapes vary with the requested fields.
    pub fn rename_fields(&mut self, mapping: &[(&str, &str)]) -> usize {
        let mut touched = 0;
        for (from, to) in mapping {
            let mut found = false;
            for row in &mut self.rows {
                if let Some(value) = row.remove(*from) {
                    row.insert((*to).to_string(), value);
                    found = true;
                    touched += 1;
                }
            }
            if !found && !self.rows.is_empty() {
                log::debug!("{}: field '{from}' absent, not renamed", self.kind);
            }
        }
        touched
    }

    /// Rows whose identity satisfies `keep` (rows without identity pass)
    pub fn filter_ids(&self, mut keep: impl FnMut(&str) -> bool) -> Batch {
        let field = self.identity_field();
        let rows = self
            .rows
            .iter()
            .filter(|row| record::identity_of(row, field).is_none_or(|id| keep(&id)))
            .cloned()
            .collect();
        Batch {
            kind: self.kind.clone(),
            rows,
        }
    }

    /// Split into `ceil(len / chunk_size)` near-equal parts, in order.
    ///
    /// Part sizes differ by at most one row, larger parts first.
    pub fn split(&self, chunk_size: usize) -> Vec<Batch> {
        let chunk_size = chunk_size.max(1);
        let parts = self.rows.len().div_ceil(chunk_size).max(1);
        let base = self.rows.len() / parts;
        let extra = self.rows.len() % parts;

        let mut out = Vec::with_capacity(parts);
        let mut start = 0;
        for i in 0..parts {
            let size = base + usize::from(i < extra);
            out.push(Batch {
                kind: self.kind.clone(),
                rows: self.rows[start..start + size].to_vec(),
            });
            start += size;
        }
        out
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tweets(ids: &[&str]) -> Batch {
        let items: Vec<Value> = ids.iter().map(|id| json!({"id": id, "text": "t"})).collect();
        Batch::from_json(RecordKind::Tweets, &Value::Array(items)).unwrap()
    }

    fn ids(batch: &Batch) -> Vec<String> {
        batch.ids().collect()
    }

    #[test]
    fn from_json_applies_rename_map() {
        let batch = Batch::from_json(
            RecordKind::Tweets,
            &json!([{"id": "1", "text": "hola", "author_id": "u1",
                     "public_metrics": {"like_count": 2}}]),
        )
        .unwrap();
        let row = &batch.rows()[0];
        assert_eq!(row["text_orig"], json!("hola"));
        assert_eq!(row["user_id"], json!("u1"));
        assert_eq!(row["like_count"], json!(2));
        assert!(!row.contains_key("text"));
        assert_eq!(row["id"], json!("1"));
    }

    #[test]
    fn from_json_single_object() {
        let batch = Batch::from_json(RecordKind::Users, &json!({"id": "u1"})).unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn from_json_rejects_scalar() {
        let err = Batch::from_json(RecordKind::Users, &json!("nope")).unwrap_err();
        assert!(matches!(err, HarvestError::Malformed(_)));
    }

    #[test]
    fn numeric_ids_stringified() {
        let batch = Batch::from_json(RecordKind::Tweets, &json!([{"id": 42}])).unwrap();
        assert_eq!(ids(&batch), vec!["42"]);
        assert_eq!(batch.rows()[0]["id"], json!("42"));
    }

    #[test]
    fn append_preserves_order() {
        let mut a = tweets(&["1", "2"]);
        a.append(tweets(&["3", "1"])).unwrap();
        assert_eq!(ids(&a), vec!["1", "2", "3", "1"]);
    }

    #[test]
    fn append_kind_mismatch() {
        let mut a = tweets(&["1"]);
        let users = Batch::from_json(RecordKind::Users, &json!([{"id": "u1"}])).unwrap();
        let err = a.append(users).unwrap_err();
        assert!(matches!(
            err,
            HarvestError::KindMismatch {
                expected: RecordKind::Tweets,
                found: RecordKind::Users
            }
        ));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn drop_duplicates_keeps_first() {
        let mut batch = Batch::from_json(
            RecordKind::Tweets,
            &json!([
                {"id": "4", "text": "first"},
                {"id": "4", "text": "second"},
                {"id": "5", "text": "x"}
            ]),
        )
        .unwrap();
        assert_eq!(batch.drop_duplicates("id"), 1);
        assert_eq!(ids(&batch), vec!["4", "5"]);
        assert_eq!(batch.rows()[0]["text_orig"], json!("first"));
    }

    #[test]
    fn drop_duplicates_keeps_rows_without_identity() {
        let mut batch = Batch::from_rows(
            RecordKind::other("errors"),
            vec![Record::new(), Record::new()],
        );
        assert_eq!(batch.drop_duplicates("id"), 0);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn rename_missing_field_is_not_an_error() {
        let mut batch = tweets(&["1"]);
        assert_eq!(batch.rename_fields(&[("no_such_field", "x")]), 0);
        assert!(!batch.rows()[0].contains_key("x"));
    }

    #[test]
    fn filter_ids_passes_rows_without_identity() {
        let mut rows = vec![Record::new()];
        rows.push(json!({"id": "1"}).as_object().unwrap().clone());
        let batch = Batch::from_rows(RecordKind::Users, rows);
        let kept = batch.filter_ids(|_| false);
        assert_eq!(kept.len(), 1);
        assert!(kept.ids().next().is_none());
    }

    #[test]
    fn split_near_equal() {
        let batch = tweets(&["1", "2", "3", "4", "5", "6", "7"]);
        let sizes: Vec<usize> = batch.split(3).iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 2, 2]);
        let joined: Vec<String> = batch.split(3).iter().flat_map(ids).collect();
        assert_eq!(joined, ids(&batch));
    }

    #[test]
    fn split_smaller_than_chunk() {
        let batch = tweets(&["1", "2"]);
        let parts = batch.split(1000);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].len(), 2);
    }
}
