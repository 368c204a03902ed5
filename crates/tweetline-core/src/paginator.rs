//! Pagination sessions: fetch, accumulate, flush through the ledger.
//!
//! A session walks continuation tokens until results run out, the batch
//! quota is reached, the cursor gets stuck or shutdown is requested. Data
//! accumulated since the last flush is always flushed on the way out,
//! except when a request fails outright.

use std::collections::BTreeMap;
use std::path::Path;
use std::thread;
use std::time::Duration;

use indicatif::ProgressBar;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::{FetchError, HarvestError};
use crate::kind::RecordKind;
use crate::ledger::LedgerSet;
use crate::progress::fmt_num;
use crate::shutdown::Shutdown;
use crate::sink::BatchWriter;

/// Fixed wait before retrying a rate-limited request
pub const RATE_LIMIT_DELAY: Duration = Duration::from_secs(5);

/// One authenticated request/response round-trip.
pub trait Fetcher {
    /// Fetch one page for `query`, continuing from `token` when given.
    ///
    /// HTTP 429 must be reported as [`FetchError::RateLimited`] so the
    /// caller can retry the same request.
    fn fetch(&mut self, query: &Query, token: Option<&str>) -> Result<Value, FetchError>;
}

/// A search topic to harvest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Short label used in file names
    pub name: String,
    /// Search expression sent upstream
    pub topic: String,
    pub lang: String,
}

impl Query {
    pub fn new(name: impl Into<String>, topic: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            lang: lang.into(),
        }
    }

    /// File name prefix: `<lang>-<name>`
    pub fn name_scheme(&self) -> String {
        format!("{}-{}", self.lang, self.name)
    }
}

/// Caller-controlled limits for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginateOptions {
    /// Primary rows to accumulate before flushing
    pub batch_size: usize,
    /// Maximum number of flushed batches
    pub num_batches: usize,
    /// Delay before each continuation request
    pub sleep: Duration,
    /// Split each written batch into files of at most this many rows
    pub chunk_size: Option<usize>,
}

impl Default for PaginateOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            num_batches: 1,
            sleep: Duration::from_secs(1),
            chunk_size: None,
        }
    }
}

impl PaginateOptions {
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.batch_size == 0 {
            return Err(HarvestError::InvalidArgument(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.num_batches == 0 {
            return Err(HarvestError::InvalidArgument(
                "num_batches must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == Some(0) {
            return Err(HarvestError::InvalidArgument(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-kind counters for one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindStats {
    /// Rows received from the API
    pub fetched: usize,
    /// Rows written to storage
    pub written: usize,
    /// Rows dropped as repeats within a flushed batch
    pub batch_duplicates: usize,
    /// Rows dropped because the ledger already had their id
    pub ledger_duplicates: usize,
    pub files: usize,
    /// Ids added to the ledger
    pub ids_added: usize,
}

/// Outcome of one pagination session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub pages: usize,
    pub rate_limited: usize,
    pub batches_written: usize,
    /// The API returned the token it was given
    pub stuck_token: bool,
    /// Stopped early by a shutdown request
    pub interrupted: bool,
    pub kinds: BTreeMap<RecordKind, KindStats>,
}

impl SessionStats {
    pub fn kind(&self, kind: &RecordKind) -> KindStats {
        self.kinds.get(kind).cloned().unwrap_or_default()
    }

    pub fn rows_written(&self) -> usize {
        self.kinds.values().map(|k| k.written).sum()
    }
}

enum State {
    Idle,
    Fetching { token: Option<String> },
    Accumulating { page: Envelope, used: Option<String> },
    Flushing { next: String },
    Terminated,
}

/// Drives pagination sessions against one fetcher and one writer.
///
/// Ledgers, when attached, persist across sessions so several topics in a
/// run share one view of previously seen ids.
pub struct Paginator<F, W> {
    fetcher: F,
    writer: W,
    ledgers: Option<LedgerSet>,
    progress: ProgressBar,
    shutdown: Shutdown,
    retry_delay: Duration,
}

impl<F: Fetcher, W: BatchWriter> Paginator<F, W> {
    pub fn new(fetcher: F, writer: W) -> Self {
        Self {
            fetcher,
            writer,
            ledgers: None,
            progress: ProgressBar::hidden(),
            shutdown: Shutdown::global(),
            retry_delay: RATE_LIMIT_DELAY,
        }
    }

    /// Reconcile every flush against these ledgers and commit written ids
    pub fn with_ledgers(mut self, ledgers: LedgerSet) -> Self {
        self.ledgers = Some(ledgers);
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Spinner updated after each page (use a hidden bar off-TTY)
    pub fn set_progress(&mut self, pb: ProgressBar) {
        self.progress = pb;
    }

    pub fn ledgers(&self) -> Option<&LedgerSet> {
        self.ledgers.as_ref()
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Run one session; returns the number of batches written
    pub fn paginate(
        &mut self,
        save_path: &Path,
        query: &Query,
        options: &PaginateOptions,
    ) -> Result<usize, HarvestError> {
        self.paginate_with_stats(save_path, query, options)
            .map(|stats| stats.batches_written)
    }

    pub fn paginate_with_stats(
        &mut self,
        save_path: &Path,
        query: &Query,
        options: &PaginateOptions,
    ) -> Result<SessionStats, HarvestError> {
        options.validate()?;

        let scheme = query.name_scheme();
        let mut stats = SessionStats::default();
        let mut accumulated = Envelope::new();
        let mut state = State::Idle;

        loop {
            state = match state {
                State::Idle => {
                    log::info!(
                        "Paginating '{}' ({}): batch size {}, up to {} batches",
                        query.topic,
                        scheme,
                        options.batch_size,
                        options.num_batches
                    );
                    State::Fetching { token: None }
                }
                State::Fetching { token } => {
                    if token.is_some() && !options.sleep.is_zero() {
                        thread::sleep(options.sleep);
                    }
                    match self.fetch_page(query, token.as_deref(), &mut stats)? {
                        Some(payload) => State::Accumulating {
                            page: Envelope::from_raw(&payload)?,
                            used: token,
                        },
                        None => State::Terminated,
                    }
                }
                State::Accumulating { page, used } => {
                    stats.pages += 1;
                    for batch in page.batches() {
                        stats.kinds.entry(batch.kind().clone()).or_default().fetched += batch.len();
                    }
                    log::debug!(
                        "Page {}: {} rows ({} primary)",
                        stats.pages,
                        page.total_rows(),
                        page.primary_rows()
                    );
                    accumulated.merge(page)?;
                    self.report(&stats, &accumulated);

                    let quota_left = stats.batches_written < options.num_batches;
                    match accumulated.continuation_token().map(str::to_owned) {
                        Some(next) if used.as_deref() == Some(next.as_str()) => {
                            log::warn!(
                                "Stuck token: '{next}' returned twice in a row for '{}'; stopping",
                                query.topic
                            );
                            stats.stuck_token = true;
                            State::Terminated
                        }
                        Some(next) if quota_left => {
                            if accumulated.primary_rows() >= options.batch_size {
                                State::Flushing { next }
                            } else {
                                State::Fetching { token: Some(next) }
                            }
                        }
                        _ => State::Terminated,
                    }
                }
                State::Flushing { next } => {
                    let envelope = std::mem::take(&mut accumulated);
                    self.flush(save_path, &scheme, envelope, options, &mut stats)?;
                    if stats.batches_written >= options.num_batches {
                        log::info!("Reached {} batches for '{}'", options.num_batches, query.topic);
                        State::Terminated
                    } else {
                        State::Fetching { token: Some(next) }
                    }
                }
                State::Terminated => {
                    if !accumulated.is_empty() {
                        let envelope = std::mem::take(&mut accumulated);
                        self.flush(save_path, &scheme, envelope, options, &mut stats)?;
                    }
                    break;
                }
            };
        }

        self.progress.finish_and_clear();
        log::info!(
            "Finished '{}': {} pages, {} batches, {} rows written",
            query.topic,
            stats.pages,
            stats.batches_written,
            fmt_num(stats.rows_written())
        );
        Ok(stats)
    }

    /// Issue one request, retrying rate-limited attempts after a fixed delay.
    ///
    /// `None` means shutdown was requested before a response arrived.
    fn fetch_page(
        &mut self,
        query: &Query,
        token: Option<&str>,
        stats: &mut SessionStats,
    ) -> Result<Option<Value>, HarvestError> {
        loop {
            if self.shutdown.is_requested() {
                log::warn!("Shutdown requested; ending session for '{}'", query.topic);
                stats.interrupted = true;
                return Ok(None);
            }
            match self.fetcher.fetch(query, token) {
                Ok(payload) => return Ok(Some(payload)),
                Err(e) if e.is_rate_limited() => {
                    stats.rate_limited += 1;
                    log::warn!("{e}; retrying in {}s", self.retry_delay.as_secs());
                    thread::sleep(self.retry_delay);
                }
                Err(e) => {
                    log::error!("Request for '{}' failed: {e}", query.topic);
                    return Err(e.into());
                }
            }
        }
    }

    /// Dedup, reconcile, write, then commit each batch of `envelope`.
    ///
    /// Storage is written before the ledger so every committed id has a
    /// persisted row.
    fn flush(
        &mut self,
        save_path: &Path,
        scheme: &str,
        envelope: Envelope,
        options: &PaginateOptions,
        stats: &mut SessionStats,
    ) -> Result<(), HarvestError> {
        let batch_num = stats.batches_written + 1;
        log::debug!("Flushing batch {batch_num} ({} rows)", envelope.total_rows());

        for mut batch in envelope.into_batches() {
            let kind = batch.kind().clone();
            let kind_stats = stats.kinds.entry(kind.clone()).or_default();
            kind_stats.batch_duplicates += batch.drop_duplicates(batch.identity_field());

            if let Some(ledger) = self.ledgers.as_ref().and_then(|l| l.get(&kind)) {
                let reconciled = ledger.reconcile(&batch);
                kind_stats.ledger_duplicates += reconciled.duplicates.len();
                batch = reconciled.novel;
            }
            if batch.is_empty() {
                log::debug!("No new {kind} in batch {batch_num}");
                continue;
            }

            let paths = self
                .writer
                .write(save_path, &batch, scheme, batch_num, options.chunk_size)?;
            kind_stats.written += batch.len();
            kind_stats.files += paths.len();

            if let Some(ledger) = self.ledgers.as_mut().and_then(|l| l.get_mut(&kind)) {
                kind_stats.ids_added += ledger.commit(&batch)?;
            }
        }

        stats.batches_written += 1;
        Ok(())
    }

    fn report(&self, stats: &SessionStats, accumulated: &Envelope) {
        self.progress.set_message(format!(
            "page {} · {} buffered · {} batches",
            stats.pages,
            fmt_num(accumulated.primary_rows()),
            stats.batches_written
        ));
    }
}
