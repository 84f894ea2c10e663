//! Audit log front-end with configurable failure handling.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::{AuditEntry, AuditResult, AuditSink, DailyFileSink};

/// What a failed audit write does to the call that produced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuditFailureMode {
    /// Log a warning, count the failure, and let the call continue.
    #[default]
    FailOpen,
    /// Return the write error to the caller.
    FailClosed,
}

/// Entry point used by the kernel to record audit entries.
pub struct AuditLog {
    sink: Option<Arc<dyn AuditSink>>,
    mode: AuditFailureMode,
    failures: AtomicU64,
}

impl AuditLog {
    /// Creates a log writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, mode: AuditFailureMode) -> Self {
        Self {
            sink: Some(sink),
            mode,
            failures: AtomicU64::new(0),
        }
    }

    /// Creates a log writing day files under `root`.
    #[must_use]
    pub fn daily_files(root: impl Into<PathBuf>, mode: AuditFailureMode) -> Self {
        Self::new(Arc::new(DailyFileSink::new(root)), mode)
    }

    /// Creates a log that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            sink: None,
            mode: AuditFailureMode::FailOpen,
            failures: AtomicU64::new(0),
        }
    }

    /// Returns `true` when entries are being written.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Returns the configured failure mode.
    #[must_use]
    pub const fn failure_mode(&self) -> AuditFailureMode {
        self.mode
    }

    /// Returns how many writes have failed since construction.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Records an entry.
    ///
    /// # Errors
    ///
    /// Only in [`AuditFailureMode::FailClosed`]: returns the sink error when
    /// the write fails.
    pub async fn record(&self, entry: &AuditEntry) -> AuditResult<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };

        match sink.append(entry).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    tool = entry.tool(),
                    action = ?entry.action(),
                    error = %err,
                    failures,
                    "audit write failed"
                );
                match self.mode {
                    AuditFailureMode::FailOpen => Ok(()),
                    AuditFailureMode::FailClosed => Err(err),
                }
            }
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("enabled", &self.is_enabled())
            .field("mode", &self.mode)
            .field("failures", &self.failure_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kernel_primitives::{Role, UserIdentity};
    use serde_json::json;

    use crate::{AuditError, MemorySink};

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn append(&self, _entry: &AuditEntry) -> AuditResult<()> {
            Err(AuditError::from(std::io::Error::other("disk full")))
        }
    }

    fn entry() -> AuditEntry {
        let identity = UserIdentity::builder("u", Role::Admin).build().unwrap();
        AuditEntry::request("geowiz.parse_las_file", &json!({}), &identity)
    }

    #[tokio::test]
    async fn fail_open_swallows_and_counts() {
        let log = AuditLog::new(Arc::new(BrokenSink), AuditFailureMode::FailOpen);
        log.record(&entry()).await.unwrap();
        log.record(&entry()).await.unwrap();
        assert_eq!(log.failure_count(), 2);
    }

    #[tokio::test]
    async fn fail_closed_propagates() {
        let log = AuditLog::new(Arc::new(BrokenSink), AuditFailureMode::FailClosed);
        let err = log.record(&entry()).await.expect_err("should propagate");
        assert!(matches!(err, AuditError::Io { .. }));
        assert_eq!(log.failure_count(), 1);
    }

    #[tokio::test]
    async fn disabled_log_writes_nothing() {
        let log = AuditLog::disabled();
        assert!(!log.is_enabled());
        log.record(&entry()).await.unwrap();
        assert_eq!(log.failure_count(), 0);
    }

    #[tokio::test]
    async fn forwards_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let log = AuditLog::new(sink.clone(), AuditFailureMode::default());
        log.record(&entry()).await.unwrap();
        assert_eq!(sink.entries().len(), 1);
    }
}
