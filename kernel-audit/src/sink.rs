//! Audit sinks.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{AuditEntry, AuditResult};

/// Trait implemented by append-only audit destinations.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one entry.
    async fn append(&self, entry: &AuditEntry) -> AuditResult<()>;
}

struct OpenDay {
    date: NaiveDate,
    file: File,
}

/// File sink writing newline-delimited JSON to `{root}/{YYYY-MM-DD}.jsonl`,
/// partitioned by the entry's UTC date.
///
/// A single writer lock guards the open file, so concurrent appends are
/// serialized and each line lands whole.
pub struct DailyFileSink {
    root: PathBuf,
    current: Mutex<Option<OpenDay>>,
}

impl DailyFileSink {
    /// Creates a sink rooted at `root`. The directory is created on first
    /// write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: Mutex::new(None),
        }
    }

    /// Returns the directory holding the day files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path used for `date`.
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.root.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Reads back every entry recorded on `date`, oldest first. A day with
    /// no file yields an empty list. Lines left torn by an interrupted write
    /// are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors other than a missing file.
    pub async fn read_day(&self, date: NaiveDate) -> AuditResult<Vec<AuditEntry>> {
        let data = match fs::read(self.path_for(date)).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for (index, chunk) in data
            .split(|byte| *byte == b'\n')
            .enumerate()
            .filter(|(_, chunk)| !chunk.is_empty())
        {
            match serde_json::from_slice(chunk) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(%date, line = index + 1, error = %err, "skipping malformed audit line"),
            }
        }
        Ok(entries)
    }

    /// Opens the day file for appending. A file whose last line was cut
    /// short is terminated first so the next entry starts on a fresh line.
    async fn open_day(&self, date: NaiveDate) -> AuditResult<File> {
        fs::create_dir_all(&self.root).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.path_for(date))
            .await?;

        if file.metadata().await?.len() > 0 {
            let mut last = [0_u8; 1];
            file.seek(SeekFrom::End(-1)).await?;
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                warn!(%date, "terminating torn audit line");
                file.write_all(b"\n").await?;
                file.flush().await?;
            }
        }
        Ok(file)
    }
}

impl std::fmt::Debug for DailyFileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyFileSink")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuditSink for DailyFileSink {
    async fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        let date = entry.timestamp().date_naive();
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut guard = self.current.lock().await;
        let open = match guard.take() {
            Some(open) if open.date == date => guard.insert(open),
            _ => {
                let file = self.open_day(date).await?;
                guard.insert(OpenDay { date, file })
            }
        };

        if let Err(err) = write_line(&mut open.file, &line).await {
            // Reopen next time so the torn line gets terminated.
            guard.take();
            return Err(err.into());
        }
        Ok(())
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

/// In-memory sink that keeps every entry. Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: StdMutex<Vec<AuditEntry>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("memory sink poisoned").clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        self.entries
            .lock()
            .expect("memory sink poisoned")
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kernel_primitives::{Role, UserIdentity};
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    use crate::AuditAction;

    fn temp_root() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("kernel-audit-{}", Uuid::new_v4()));
        path
    }

    fn identity() -> UserIdentity {
        UserIdentity::builder("eng-1", Role::Engineer).build().unwrap()
    }

    #[tokio::test]
    async fn writes_one_line_per_entry_into_day_file() {
        let root = temp_root();
        let sink = DailyFileSink::new(&root);
        let day = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();

        let request = AuditEntry::request("geowiz.parse_las_file", &json!({"apiKey": "abc123"}), &identity())
            .with_timestamp(day);
        sink.append(&request).await.unwrap();

        let path = sink.path_for(day.date_naive());
        assert!(path.ends_with("2025-03-14.jsonl"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 1);
        assert!(!raw.contains("abc123"));

        let entries = sink.read_day(day.date_naive()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action(), AuditAction::Request);
        assert_eq!(entries[0].parameters()["apiKey"], "[REDACTED]");

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn torn_trailing_line_does_not_swallow_next_entry() {
        let root = temp_root();
        let sink = DailyFileSink::new(&root);
        let day = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let path = sink.path_for(day.date_naive());
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(&path, r#"{"timestamp":"2025-03-14T09:"#).unwrap();

        let request = AuditEntry::request("geowiz.parse_las_file", &json!({}), &identity())
            .with_timestamp(day);
        sink.append(&request).await.unwrap();
        sink.append(&request).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 3);
        assert!(raw.ends_with('\n'));

        let entries = sink.read_day(day.date_naive()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], request);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn rotates_when_the_day_changes() {
        let root = temp_root();
        let sink = DailyFileSink::new(&root);
        let first = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let second = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap();

        sink.append(&AuditEntry::request("a", &json!({}), &identity()).with_timestamp(first))
            .await
            .unwrap();
        sink.append(&AuditEntry::request("b", &json!({}), &identity()).with_timestamp(second))
            .await
            .unwrap();

        let old = sink.read_day(first.date_naive()).await.unwrap();
        let new = sink.read_day(second.date_naive()).await.unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].tool(), "a");
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].tool(), "b");

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn concurrent_appends_produce_parseable_lines() {
        let root = temp_root();
        let sink = Arc::new(DailyFileSink::new(&root));
        let day = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let payload = json!({ "blob": "x".repeat(8 * 1024) });

        let writes = (0..64).map(|i| {
            let sink = Arc::clone(&sink);
            let payload = payload.clone();
            tokio::spawn(async move {
                let entry = AuditEntry::request(&format!("tool.{i}"), &payload, &identity())
                    .with_timestamp(day);
                sink.append(&entry).await
            })
        });

        for result in futures::future::join_all(writes).await {
            result.unwrap().unwrap();
        }

        let entries = sink.read_day(day.date_naive()).await.unwrap();
        assert_eq!(entries.len(), 64);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_day_reads_empty() {
        let sink = DailyFileSink::new(temp_root());
        let entries = sink
            .read_day(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn memory_sink_collects_entries() {
        let sink = MemorySink::new();
        sink.append(&AuditEntry::request("x", &json!({}), &identity()))
            .await
            .unwrap();
        assert_eq!(sink.entries().len(), 1);
    }
}
