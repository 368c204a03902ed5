//! Tweetline Twitter - recent and full-archive tweet search harvesting
//!
//! Provides the HTTP `Fetcher` for the search endpoints and the run loop
//! that paginates each configured topic into a timestamped session
//! directory.

pub mod client;
pub mod config;
pub mod runner;
pub mod stats;

// Re-exports
pub use client::SearchClient;
pub use config::{ApiSettings, BEARER_TOKEN_ENV, HarvestConfig, Topic};
pub use runner::{default_ledger_dir, run, run_with};
pub use stats::{RunSummary, TopicSummary};
