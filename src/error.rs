use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::warn;

use crate::processor::ConnectionKey;

/// Number of errors logged in full before the counter goes quiet.
pub const DETAILED_ERROR_LIMIT: u64 = 5;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("capture is not initialized, call init_sniffer first")]
    CaptureNotInitialized,

    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    #[error("{0} isn't running")]
    NotRunning(&'static str),

    #[error("interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dashboard request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("dashboard responded with status {0}")]
    HttpStatus(u16),
}

pub type Result<T> = std::result::Result<T, CollectorError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("connection {0} is not in the active table")]
    UnknownConnection(ConnectionKey),

    #[error("completion pipeline is closed, dropping {0}")]
    PipelineClosed(ConnectionKey),
}

/// Process-wide error tally shared by capture, completion and prediction.
/// The first few errors are logged in full, later ones only counted.
#[derive(Debug, Default)]
pub struct ErrorCounter {
    count: AtomicU64,
}

impl ErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts an error and returns the new total.
    pub fn record(&self, context: &str, err: impl Display) -> u64 {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if n <= DETAILED_ERROR_LIMIT {
            warn!(error_count = n, "{context}: {err}");
            if n == DETAILED_ERROR_LIMIT {
                warn!("Suppressing further error messages");
            }
        }
        n
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_keeps_counting_after_suppression() {
        let counter = ErrorCounter::new();
        for i in 1..=12 {
            assert_eq!(counter.record("test", "boom"), i);
        }
        assert_eq!(counter.count(), 12);
    }
}
