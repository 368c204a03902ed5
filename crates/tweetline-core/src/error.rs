//! Error types for fetching, ledger I/O and pagination sessions

use std::path::PathBuf;

use crate::kind::RecordKind;

/// HTTP status returned by the search API when the rate limit is hit
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Error from a single request/response round-trip.
#[derive(Debug)]
pub enum FetchError {
    /// HTTP 429; recovered by the paginator, never surfaced to callers
    RateLimited { status: u16, body: String },
    /// Any other non-2xx status, or a network failure without status
    Transport { status: Option<u16>, body: String },
    /// Response body was not the expected JSON
    Malformed(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited { status, body } => write!(f, "rate limited (HTTP {status}): {body}"),
            Self::Transport {
                status: Some(s),
                body,
            } => write!(f, "HTTP {s}: {body}"),
            Self::Transport { status: None, body } => write!(f, "HTTP error: {body}"),
            Self::Malformed(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Classify a non-2xx response by status code
    pub fn from_status(status: u16, body: String) -> Self {
        if status == STATUS_TOO_MANY_REQUESTS {
            Self::RateLimited { status, body }
        } else {
            Self::Transport {
                status: Some(status),
                body,
            }
        }
    }

    /// Create a fetch error from a reqwest error, stripping the URL so the
    /// query string never lands in logs
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16());
        let body = e.without_url().to_string();
        match status {
            Some(s) => Self::from_status(s, body),
            None => Self::Transport { status: None, body },
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. } => Some(*status),
            Self::Transport { status, .. } => *status,
            Self::Malformed(_) => None,
        }
    }
}

/// Error from reading or writing an id ledger file.
#[derive(Debug)]
pub enum LedgerError {
    /// Ledger file absent; ledgers must be provisioned before first use
    NotFound(PathBuf),
    /// Ledger file exists but is not UTF-8 text
    Invalid { path: PathBuf, message: String },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(
                f,
                "ledger file not found: {} (run `tweetline ledger init`)",
                path.display()
            ),
            Self::Invalid { path, message } => {
                write!(f, "invalid ledger {}: {message}", path.display())
            }
            Self::Io { path, source } => write!(f, "ledger {}: {source}", path.display()),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NotFound(_) | Self::Invalid { .. } => None,
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// Error ending a pagination session.
#[derive(Debug)]
pub enum HarvestError {
    /// Appending or merging batches of different kinds
    KindMismatch {
        expected: RecordKind,
        found: RecordKind,
    },
    Fetch(FetchError),
    /// Payload shape that cannot be turned into an envelope
    Malformed(String),
    Ledger(LedgerError),
    Storage(std::io::Error),
    InvalidArgument(String),
}

impl std::fmt::Display for HarvestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KindMismatch { expected, found } => {
                write!(f, "cannot append {found} records to a {expected} batch")
            }
            Self::Fetch(e) => write!(f, "fetch failed: {e}"),
            Self::Malformed(msg) => write!(f, "malformed response: {msg}"),
            Self::Ledger(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for HarvestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch(e) => Some(e),
            Self::Ledger(e) => Some(e),
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FetchError> for HarvestError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Malformed(msg) => Self::Malformed(msg),
            other => Self::Fetch(other),
        }
    }
}

impl From<LedgerError> for HarvestError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

impl From<std::io::Error> for HarvestError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e)
    }
}
