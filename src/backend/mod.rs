pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error as ThisError;

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

/// The three read operations the dictionary needs from a key-value store.
///
/// Implementations are shared by every connection and must be safe to call concurrently.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Point lookup. A missing key is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// One round of a cursor based enumeration, returning the matched keys and the cursor to
    /// continue from. A returned cursor of `0` means the enumeration is complete.
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(Vec<String>, u64), BackendError>;

    /// Fetches many values in one round trip, aligned by position with `keys`.
    async fn bulk_get(&self, keys: &[String]) -> Result<Vec<Fetched>, BackendError>;
}

/// A single result of [`Backend::bulk_get`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetched {
    Missing,
    Text(String),
    /// The key holds something that is not a string, described by the name of its type.
    Unsupported(&'static str),
}

#[derive(Debug, ThisError)]
pub enum BackendError {
    #[error("{0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("WRONGTYPE key '{key}' holds a {kind} value")]
    WrongType { key: String, kind: &'static str },
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend call cancelled")]
    Cancelled,
    #[error("scan did not complete after {0} rounds")]
    ScanRoundsExceeded(usize),
    #[error("unsupported backend URL '{0}'")]
    UnsupportedUrl(String),
}
