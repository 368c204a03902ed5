//! Persisted id ledgers for cross-session deduplication
//!
//! One ledger per record kind, stored as `<dir>/<kind>.ids`: identity
//! strings sorted and joined by commas, no trailing delimiter, UTF-8.
//! Readers also accept whitespace-separated files written by older tools.
//!
//! A ledger only ever grows. Writes rewrite the whole file through a
//! `.tmp` sibling and a rename; there is no locking, so only one process
//! may update a given kind's ledger at a time.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::batch::Batch;
use crate::error::LedgerError;
use crate::kind::RecordKind;

/// Delimiter used when writing ledger files
pub const DELIMITER: char = ',';

/// Ledger file extension
pub const LEDGER_EXT: &str = "ids";

/// Ledger file location for a kind
pub fn ledger_path(dir: &Path, kind: &RecordKind) -> PathBuf {
    dir.join(format!("{}.{LEDGER_EXT}", kind.name()))
}

/// Parse ledger text into trimmed, non-empty ids
pub fn parse_ids(text: &str) -> FxHashSet<String> {
    text.split(|c: char| c == DELIMITER || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Read a ledger file. A missing file is [`LedgerError::NotFound`].
pub fn read_ids(path: &Path) -> Result<FxHashSet<String>, LedgerError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(parse_ids(&text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(LedgerError::NotFound(path.to_owned())),
        Err(e) if e.kind() == ErrorKind::InvalidData => Err(LedgerError::Invalid {
            path: path.to_owned(),
            message: e.to_string(),
        }),
        Err(source) => Err(LedgerError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

/// Reject ids that would not survive a write/read cycle
fn check_ids<'a>(ids: impl IntoIterator<Item = &'a String>, path: &Path) -> Result<(), LedgerError> {
    let unstorable = |id: &&String| {
        id.is_empty() || id.chars().any(|c| c == DELIMITER || c.is_whitespace())
    };
    match ids.into_iter().find(unstorable) {
        Some(id) => Err(LedgerError::Invalid {
            path: path.to_owned(),
            message: format!("id {id:?} is empty or contains a delimiter or whitespace"),
        }),
        None => Ok(()),
    }
}

/// Overwrite a ledger file with `ids` (sorted for stable diffs).
///
/// Fails with [`LedgerError::Invalid`] before touching the file if any id
/// is empty or contains a delimiter or whitespace.
pub fn write_ids(ids: &FxHashSet<String>, path: &Path) -> Result<(), LedgerError> {
    check_ids(ids, path)?;
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let text = sorted.join(&DELIMITER.to_string());

    let tmp_path = path.with_extension(format!("{LEDGER_EXT}.tmp"));
    let io_err = |source| LedgerError::Io {
        path: path.to_owned(),
        source,
    };
    fs::write(&tmp_path, text).map_err(io_err)?;
    fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}

/// Create an empty ledger file if none exists; returns whether it was created.
///
/// Never truncates an existing ledger.
pub fn init_ledger(path: &Path) -> Result<bool, LedgerError> {
    let io_err = |source| LedgerError::Io {
        path: path.to_owned(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(io_err(e)),
    }
}

/// Result of reconciling a batch against known ids
#[derive(Debug)]
pub struct Reconciled {
    /// Rows whose identity is not in the ledger, in original order
    pub novel: Batch,
    /// Batch identities already present in the ledger
    pub duplicates: FxHashSet<String>,
}

/// Split `batch` into rows not yet in `existing` and the ids that are.
///
/// Repeated ids *within* `batch` that are not in `existing` all pass as
/// novel; run [`Batch::drop_duplicates`] to remove those.
pub fn reconcile(existing: &FxHashSet<String>, batch: &Batch) -> Reconciled {
    let duplicates: FxHashSet<String> = batch.ids().filter(|id| existing.contains(id)).collect();
    let novel = if duplicates.is_empty() {
        batch.clone()
    } else {
        batch.filter_ids(|id| !duplicates.contains(id))
    };
    log::debug!(
        "{}: {} already recorded, {} of {} rows novel",
        batch.kind(),
        duplicates.len(),
        novel.len(),
        batch.len()
    );
    Reconciled { novel, duplicates }
}

/// Union `batch`'s ids into `existing` and rewrite the ledger at `path`.
///
/// Returns how many ids were added. An id that cannot be stored leaves
/// both `existing` and the file unchanged.
pub fn commit(
    existing: &mut FxHashSet<String>,
    batch: &Batch,
    path: &Path,
) -> Result<usize, LedgerError> {
    let incoming: Vec<String> = batch.ids().collect();
    check_ids(&incoming, path)?;
    let previous = existing.len();
    existing.extend(incoming);
    let added = existing.len() - previous;
    write_ids(existing, path)?;
    log::info!(
        "Updated {} ids: {previous} (existing) + {added} (new) = {}",
        batch.kind(),
        existing.len()
    );
    Ok(added)
}

/// A loaded ledger for one kind
#[derive(Debug)]
pub struct IdLedger {
    kind: RecordKind,
    path: PathBuf,
    ids: FxHashSet<String>,
}

impl IdLedger {
    /// Load the ledger file; fails if it has not been provisioned
    pub fn load(kind: RecordKind, path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let ids = read_ids(&path)?;
        log::debug!("Loaded {} {kind} ids from {}", ids.len(), path.display());
        Ok(Self { kind, path, ids })
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> &FxHashSet<String> {
        &self.ids
    }

    pub fn reconcile(&self, batch: &Batch) -> Reconciled {
        reconcile(&self.ids, batch)
    }

    pub fn commit(&mut self, batch: &Batch) -> Result<usize, LedgerError> {
        commit(&mut self.ids, batch, &self.path)
    }

    /// Union arbitrary ids (e.g. recovered from output files) and persist
    pub fn extend(&mut self, ids: impl IntoIterator<Item = String>) -> Result<usize, LedgerError> {
        let incoming: Vec<String> = ids.into_iter().collect();
        check_ids(&incoming, &self.path)?;
        let previous = self.ids.len();
        self.ids.extend(incoming);
        let added = self.ids.len() - previous;
        write_ids(&self.ids, &self.path)?;
        Ok(added)
    }
}

/// Ledgers for several kinds, loaded from one directory
#[derive(Debug, Default)]
pub struct LedgerSet {
    ledgers: BTreeMap<RecordKind, IdLedger>,
}

impl LedgerSet {
    /// Load `<dir>/<kind>.ids` for every kind; any missing file is fatal
    pub fn load(dir: &Path, kinds: &[RecordKind]) -> Result<Self, LedgerError> {
        let mut ledgers = BTreeMap::new();
        for kind in kinds {
            let ledger = IdLedger::load(kind.clone(), ledger_path(dir, kind))?;
            ledgers.insert(kind.clone(), ledger);
        }
        Ok(Self { ledgers })
    }

    pub fn get(&self, kind: &RecordKind) -> Option<&IdLedger> {
        self.ledgers.get(kind)
    }

    pub fn get_mut(&mut self, kind: &RecordKind) -> Option<&mut IdLedger> {
        self.ledgers.get_mut(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdLedger> {
        self.ledgers.values()
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }
}

/// Recover identity values from Parquet files already written for `kind`.
///
/// Scans `<dir>/**/<kind>/*.parquet`; unreadable files are logged and
/// skipped. Used to rebuild a ledger after a crash or a lost ledger file.
pub fn recover_ids(dir: &Path, kind: &RecordKind) -> FxHashSet<String> {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = Path::new(&base)
        .join("**")
        .join(glob::Pattern::escape(kind.name()))
        .join("*.parquet");
    let pattern_str = pattern.to_string_lossy();

    let mut ids = FxHashSet::default();
    let entries = match glob::glob(&pattern_str) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Invalid recovery pattern {pattern_str}: {e}");
            return ids;
        }
    };
    for path in entries.flatten() {
        match read_ids_from_parquet(&path, kind.identity_field()) {
            Ok(file_ids) => {
                log::debug!("Recovered {} ids from {}", file_ids.len(), path.display());
                ids.extend(file_ids);
            }
            Err(e) => log::warn!("Failed to read {}: {e}", path.display()),
        }
    }
    ids
}

/// Read the identity column of a Parquet file
fn read_ids_from_parquet(
    path: &Path,
    identity_field: &str,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    use arrow::array::StringArray;
    use parquet::arrow::ProjectionMask;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let file = fs::File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    if builder.schema().field_with_name(identity_field).is_err() {
        return Err(format!("no '{identity_field}' column").into());
    }
    let mask = ProjectionMask::columns(builder.parquet_schema(), std::iter::once(identity_field));
    let reader = builder.with_projection(mask).build()?;

    let mut ids = Vec::new();
    for batch in reader {
        let batch = batch?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| format!("'{identity_field}' column is not Utf8"))?;
        ids.extend(col.iter().flatten().map(str::to_owned));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn set(ids: &[&str]) -> FxHashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn tweets(ids: &[&str]) -> Batch {
        let items: Vec<_> = ids.iter().map(|id| json!({"id": id})).collect();
        Batch::from_json(RecordKind::Tweets, &json!(items)).unwrap()
    }

    #[test]
    fn reconcile_scenario() {
        let existing = set(&["1", "2", "3"]);
        let batch = tweets(&["3", "4", "4", "5"]);

        let Reconciled { mut novel, duplicates } = reconcile(&existing, &batch);
        assert_eq!(novel.ids().collect::<Vec<_>>(), vec!["4", "4", "5"]);
        assert_eq!(duplicates, set(&["3"]));

        assert_eq!(novel.drop_duplicates("id"), 1);
        assert_eq!(novel.ids().collect::<FxHashSet<_>>(), set(&["4", "5"]));
    }

    #[test]
    fn reconcile_novel_excludes_ledger_ids() {
        let existing = set(&["a", "b"]);
        let batch = tweets(&["a", "c", "b", "d", "a"]);
        let r = reconcile(&existing, &batch);
        assert!(r.novel.ids().all(|id| !existing.contains(&id)));
        assert_eq!(r.duplicates, set(&["a", "b"]));
    }

    #[test]
    fn reconcile_empty_ledger_passes_everything() {
        let batch = tweets(&["1", "2"]);
        let r = reconcile(&FxHashSet::default(), &batch);
        assert_eq!(r.novel, batch);
        assert!(r.duplicates.is_empty());
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = read_ids(&dir.path().join("tweets.ids")).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn read_binary_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tweets.ids");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(read_ids(&path), Err(LedgerError::Invalid { .. })));
    }

    #[test]
    fn parse_trims_and_skips_empty() {
        assert_eq!(parse_ids(" 1, 2,,3 ,\n"), set(&["1", "2", "3"]));
        assert_eq!(parse_ids("1 2\n3"), set(&["1", "2", "3"]));
        assert!(parse_ids("").is_empty());
    }

    #[test]
    fn write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.ids");
        let ids = set(&["30", "10", "20"]);
        write_ids(&ids, &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "10,20,30");
        assert_eq!(read_ids(&path).unwrap(), ids);
        assert!(!path.with_extension("ids.tmp").exists());
    }

    #[test]
    fn commit_unions_and_counts_added() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tweets.ids");
        let mut existing = set(&["1", "2"]);

        let added = commit(&mut existing, &tweets(&["2", "3", "3"]), &path).unwrap();
        assert_eq!(added, 1);
        assert_eq!(read_ids(&path).unwrap(), set(&["1", "2", "3"]));
    }

    #[test]
    fn commit_rejects_ids_that_would_split() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tweets.ids");
        write_ids(&set(&["1"]), &path).unwrap();
        let mut existing = set(&["1"]);

        for bad in ["2,3", "4 5", "6\n"] {
            let err = commit(&mut existing, &tweets(&[bad]), &path).unwrap_err();
            assert!(matches!(err, LedgerError::Invalid { .. }), "{bad:?}");
        }
        assert_eq!(existing, set(&["1"]));
        assert_eq!(fs::read_to_string(&path).unwrap(), "1");
    }

    #[test]
    fn write_rejects_empty_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tweets.ids");
        assert!(matches!(
            write_ids(&set(&["1", ""]), &path),
            Err(LedgerError::Invalid { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn commit_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tweets.ids");
        let batch = tweets(&["7", "8"]);
        let mut existing = set(&["1"]);

        commit(&mut existing, &batch, &path).unwrap();
        let once = fs::read_to_string(&path).unwrap();
        let added = commit(&mut existing, &batch, &path).unwrap();
        assert_eq!(added, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), once);
    }

    #[test]
    fn init_does_not_truncate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids").join("tweets.ids");
        assert!(init_ledger(&path).unwrap());
        fs::write(&path, "1,2").unwrap();
        assert!(!init_ledger(&path).unwrap());
        assert_eq!(read_ids(&path).unwrap(), set(&["1", "2"]));
    }

    #[test]
    fn ledger_set_requires_every_file() {
        let dir = TempDir::new().unwrap();
        init_ledger(&ledger_path(dir.path(), &RecordKind::Tweets)).unwrap();

        let err = LedgerSet::load(dir.path(), &[RecordKind::Tweets, RecordKind::Users]).unwrap_err();
        match err {
            LedgerError::NotFound(path) => assert!(path.ends_with("users.ids")),
            other => panic!("unexpected error: {other}"),
        }

        let ledgers = LedgerSet::load(dir.path(), &[RecordKind::Tweets]).unwrap();
        assert_eq!(ledgers.len(), 1);
        assert!(ledgers.get(&RecordKind::Tweets).unwrap().is_empty());
    }

    #[test]
    fn id_ledger_grows_monotonically() {
        let dir = TempDir::new().unwrap();
        let path = ledger_path(dir.path(), &RecordKind::Tweets);
        fs::write(&path, "1 2").unwrap();

        let mut ledger = IdLedger::load(RecordKind::Tweets, &path).unwrap();
        assert_eq!(ledger.commit(&tweets(&["3"])).unwrap(), 1);
        assert_eq!(ledger.extend(vec!["1".to_string(), "9".to_string()]).unwrap(), 1);

        let reloaded = IdLedger::load(RecordKind::Tweets, &path).unwrap();
        assert_eq!(reloaded.ids(), &set(&["1", "2", "3", "9"]));
    }

    #[test]
    fn recover_from_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(recover_ids(dir.path(), &RecordKind::Tweets).is_empty());
    }
}
