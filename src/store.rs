use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{Backend, BackendError, Fetched, MemoryBackend, RedisBackend};

pub const DEFAULT_SCAN_COUNT: usize = 10;
pub const DEFAULT_MAX_SCAN_ROUNDS: usize = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// Deadline for every single backend call. `None` waits as long as the backend does.
    pub timeout: Option<Duration>,
    /// Batch size hint for scans that have no row limit.
    pub scan_count: usize,
    /// Upper bound on scan rounds of one iteration, in case the backend never completes a cycle.
    pub max_scan_rounds: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            timeout: None,
            scan_count: DEFAULT_SCAN_COUNT,
            max_scan_rounds: DEFAULT_MAX_SCAN_ROUNDS,
        }
    }
}

/// The Store is the handle every connection uses to reach the backend. It is cloned cheaply
/// through reference counting and never mutates the data behind it.
///
/// Each call is raced against the caller's cancellation token and, when configured, a deadline.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
    options: StoreOptions,
}

impl Store {
    pub fn new(backend: impl Backend + 'static) -> Store {
        Store::with_options(backend, StoreOptions::default())
    }

    pub fn with_options(backend: impl Backend + 'static, options: StoreOptions) -> Store {
        Store {
            backend: Arc::new(backend),
            options,
        }
    }

    /// Opens the backend named by `url`: `redis://`, `rediss://`, `redis+unix://` or `memory://`.
    pub async fn connect(url: &str, options: StoreOptions) -> Result<Store, BackendError> {
        let scheme = url.split_once("://").map(|(scheme, _)| scheme);

        match scheme {
            Some("memory") => Ok(Store::with_options(MemoryBackend::new(), options)),
            Some("redis" | "rediss" | "redis+unix" | "unix") => {
                let backend = RedisBackend::connect(url).await?;
                Ok(Store::with_options(backend, options))
            }
            _ => Err(BackendError::UnsupportedUrl(url.to_string())),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<Option<String>, BackendError> {
        self.call(cancel, self.backend.get(key)).await
    }

    pub async fn scan(
        &self,
        cancel: &CancellationToken,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(Vec<String>, u64), BackendError> {
        self.call(cancel, self.backend.scan(cursor, pattern, count))
            .await
    }

    pub async fn bulk_get(
        &self,
        cancel: &CancellationToken,
        keys: &[String],
    ) -> Result<Vec<Fetched>, BackendError> {
        self.call(cancel, self.backend.bulk_get(keys)).await
    }

    async fn call<T, F>(&self, cancel: &CancellationToken, call: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        let call = async {
            match self.options.timeout {
                Some(timeout) => tokio::time::timeout(timeout, call)
                    .await
                    .map_err(|_| BackendError::Timeout(timeout))?,
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Backend call cancelled");
                Err(BackendError::Cancelled)
            }
            result = call => result,
        }
    }
}
