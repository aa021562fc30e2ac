//! Runtime configuration of the dictionary server.

use std::time::Duration;

use crate::codec::DEFAULT_MAX_LINE_LENGTH;
use crate::store::{StoreOptions, DEFAULT_MAX_SCAN_ROUNDS, DEFAULT_SCAN_COUNT};

pub const DEFAULT_LISTEN: &str = "unix:///run/dovecot2/auth-dict-service.socket";
pub const DEFAULT_BACKEND_URL: &str = "redis://localhost:6379/0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `tcp://host:port` or `unix:///path/to/socket`. Parsed when the listener is bound.
    pub listen: String,

    /// `redis://`, `rediss://`, `redis+unix://` or `memory://`.
    pub backend_url: String,

    pub debug: bool,

    /// Deadline for a single backend call.
    pub backend_timeout: Option<Duration>,

    /// Longest request line accepted, terminator excluded.
    pub max_line_length: usize,

    /// Batch size hint for unbounded scans.
    pub scan_count: usize,

    pub max_scan_rounds: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            debug: false,
            backend_timeout: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            scan_count: DEFAULT_SCAN_COUNT,
            max_scan_rounds: DEFAULT_MAX_SCAN_ROUNDS,
        }
    }
}

impl Config {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            timeout: self.backend_timeout,
            scan_count: self.scan_count,
            max_scan_rounds: self.max_scan_rounds,
        }
    }
}
