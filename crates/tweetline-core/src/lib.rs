//! Tweetline Core - pagination and deduplication engine
//!
//! Walks continuation tokens of a rate-limited search API, normalizes
//! responses into per-kind record batches, and filters every flush through
//! persisted id ledgers so repeated harvests never store a record twice.

pub mod batch;
pub mod columnar;
pub mod envelope;
pub mod error;
pub mod http;
pub mod kind;
pub mod ledger;
pub mod logging;
pub mod paginator;
pub mod progress;
pub mod record;
pub mod shutdown;
pub mod sink;

// Re-exports for convenience
pub use batch::Batch;
pub use envelope::Envelope;
pub use error::{FetchError, HarvestError, LedgerError};
pub use http::{SHARED_RUNTIME, http_client};
pub use kind::{LEDGER_KINDS, RecordKind};
pub use ledger::{IdLedger, LedgerSet, Reconciled, init_ledger, ledger_path, recover_ids};
pub use logging::{IndicatifLogger, init_logging};
pub use paginator::{
    Fetcher, KindStats, PaginateOptions, Paginator, Query, RATE_LIMIT_DELAY, SessionStats,
};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use record::Record;
pub use shutdown::{Shutdown, shutdown_flag};
pub use sink::{BatchWriter, ParquetSink, ParquetWriter, cleanup_tmp_files, is_valid_parquet};
