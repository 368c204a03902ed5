//! Response envelopes: one API response decomposed into per-kind batches

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::batch::Batch;
use crate::error::HarvestError;
use crate::kind::RecordKind;
use crate::record::MAX_DEPTH;

/// Response key holding pagination metadata
pub const META_KEY: &str = "meta";

/// Metadata key holding the continuation token
pub const NEXT_TOKEN_KEY: &str = "next_token";

/// Decomposed result of one (or several merged) search responses.
///
/// `meta` is kept verbatim and is never a batch. Batches are keyed by kind;
/// nested groups such as `includes` are flattened into the same mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    meta: Option<Map<String, Value>>,
    tables: BTreeMap<RecordKind, Batch>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decompose a decoded response payload
    pub fn from_raw(payload: &Value) -> Result<Self, HarvestError> {
        let Value::Object(map) = payload else {
            return Err(HarvestError::Malformed(
                "response payload is not a JSON object".to_string(),
            ));
        };
        let mut envelope = Self::new();
        envelope.walk(map, 0)?;
        Ok(envelope)
    }

    fn walk(&mut self, map: &Map<String, Value>, depth: usize) -> Result<(), HarvestError> {
        if depth >= MAX_DEPTH {
            return Err(HarvestError::Malformed(format!(
                "response groups nested deeper than {MAX_DEPTH} levels"
            )));
        }
        log::trace!(
            "Building tables from keys: {:?}",
            map.keys().collect::<Vec<_>>()
        );
        for (key, value) in map {
            if key == META_KEY {
                match value {
                    Value::Object(meta) => self.meta = Some(meta.clone()),
                    other => log::warn!("Ignoring non-object '{META_KEY}': {other}"),
                }
            } else if let Some(kind) = RecordKind::from_key(key) {
                self.insert(Batch::from_json(kind, value)?)?;
            } else {
                match value {
                    Value::Array(_) => {
                        let kind = RecordKind::other(key);
                        self.insert(Batch::from_json(kind, value)?)?;
                    }
                    Value::Object(inner) => self.walk(inner, depth + 1)?,
                    _ => log::debug!("Skipping scalar response field '{key}'"),
                }
            }
        }
        Ok(())
    }

    /// Add a batch, appending to an existing batch of the same kind
    fn insert(&mut self, batch: Batch) -> Result<(), HarvestError> {
        match self.tables.get_mut(batch.kind()) {
            Some(existing) => existing.append(batch),
            None => {
                self.tables.insert(batch.kind().clone(), batch);
                Ok(())
            }
        }
    }

    /// Token for the next page, or `None` when the results are exhausted
    pub fn continuation_token(&self) -> Option<&str> {
        let token = self
            .meta
            .as_ref()
            .and_then(|m| m.get(NEXT_TOKEN_KEY))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty());
        if token.is_none() {
            log::info!("No next token to paginate");
        }
        token
    }

    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.meta.as_ref()
    }

    /// Merge a newer envelope into this one.
    ///
    /// Metadata is replaced by `other`'s unconditionally. Batches of kinds
    /// new to `self` are adopted; shared kinds are appended. No
    /// deduplication happens here.
    pub fn merge(&mut self, other: Envelope) -> Result<(), HarvestError> {
        self.meta = other.meta;
        for (_, batch) in other.tables {
            self.insert(batch)?;
        }
        if let Some(tweets) = self.tables.get(&RecordKind::Tweets) {
            log::trace!("After merge: {} tweets", tweets.len());
        }
        Ok(())
    }

    pub fn batch(&self, kind: &RecordKind) -> Option<&Batch> {
        self.tables.get(kind)
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.tables.values()
    }

    pub fn into_batches(self) -> impl Iterator<Item = Batch> {
        self.tables.into_values()
    }

    pub fn row_count(&self, kind: &RecordKind) -> usize {
        self.tables.get(kind).map_or(0, Batch::len)
    }

    /// Rows of the primary kind; the only count compared to the batch size
    pub fn primary_rows(&self) -> usize {
        self.row_count(&RecordKind::Tweets)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(Batch::len).sum()
    }

    /// True when no batch holds any row (metadata is ignored)
    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }
}
