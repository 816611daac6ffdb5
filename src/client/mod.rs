//! Clients for the three RPC surfaces, plus the chunked file I/O path.

mod file;
mod mds;
mod scheduler;
mod storage;

pub use file::FileClient;
pub use mds::MdsClient;
pub use scheduler::SchedulerClient;
pub use storage::StorageClient;

use std::time::Duration;

/// Default connection timeout for client requests.
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default request timeout for client operations.
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_http_client(connect_timeout: Duration, request_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
