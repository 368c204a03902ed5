//! Shared HTTP client and tokio runtime.
//!
//! Requests are async reqwest under the hood, driven to completion with
//! `SHARED_RUNTIME.block_on` so the pagination loop stays synchronous.

use std::sync::LazyLock;
use std::time::Duration;

/// Connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Whole-request timeout; search pages are small JSON documents
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("tweetline/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});
