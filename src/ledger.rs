//! Append-only JSONL episode ledger.
//!
//! One JSON line per state change; current records are derived by replay.
//! Records are never deleted, so reprocessing is an explicit, auditable
//! decision rather than a silent overwrite.
//!
//! Writes for a given episode id are serialized through a per-identifier
//! mutex; unrelated episodes never contend on a global lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::domain::{EpisodeStatus, ProcessingRecord};

/// Errors that can occur with the episode ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("episode not found: {0}")]
    NotFound(String),

    #[error("invalid status transition for {episode_id}: {from:?} → {to:?}")]
    InvalidTransition {
        episode_id: String,
        from: EpisodeStatus,
        to: EpisodeStatus,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One line in the ledger log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub timestamp: DateTime<Utc>,

    pub episode_id: String,

    pub status: EpisodeStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// Set when an operator forced reprocessing of a completed episode
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub forced: bool,
}

/// File-backed episode processing ledger.
pub struct Ledger {
    path: PathBuf,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Ledger {
    /// Open (or create) a ledger at the given path.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path,
            locks: StdMutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Per-identifier write lock. Concurrent episode pipelines hold their
    /// own episode's lock for the duration of processing.
    pub fn lock_for(&self, episode_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("ledger lock map poisoned");
        locks
            .entry(episode_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn append_event(&self, event: &LedgerEvent) -> Result<(), LedgerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let json = serde_json::to_string(event)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Replay the log into current per-id records.
    pub async fn replay(&self) -> Result<HashMap<String, ProcessingRecord>, LedgerError> {
        let mut records: HashMap<String, ProcessingRecord> = HashMap::new();

        if !self.path.exists() {
            return Ok(records);
        }

        let file = File::open(&self.path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: LedgerEvent = serde_json::from_str(&line)?;
            Self::apply_event(&mut records, event);
        }

        Ok(records)
    }

    fn apply_event(records: &mut HashMap<String, ProcessingRecord>, event: LedgerEvent) {
        let record = records
            .entry(event.episode_id.clone())
            .or_insert_with(|| ProcessingRecord::new(event.episode_id.clone(), event.timestamp));

        // Entering in_progress counts as a new attempt; repeating the
        // current status only bumps the timestamp.
        if event.status == EpisodeStatus::InProgress && record.status != EpisodeStatus::InProgress {
            record.attempts += 1;
        }

        record.status = event.status;
        record.last_attempt = event.timestamp;
        if event.error_kind.is_some() {
            record.last_error_kind = event.error_kind;
        } else if event.status == EpisodeStatus::Completed {
            record.last_error_kind = None;
        }
    }

    /// Point lookup of the current record for an id.
    pub async fn lookup(&self, episode_id: &str) -> Result<Option<ProcessingRecord>, LedgerError> {
        let records = self.replay().await?;
        Ok(records.get(episode_id).cloned())
    }

    /// Record a status for an episode. Idempotent: writing the current
    /// status again appends an event (the log is the audit trail) but the
    /// derived record only moves its timestamp. Invalid transitions are
    /// rejected; `mark_forced` is the explicit escape hatch.
    pub async fn mark(
        &self,
        episode_id: &str,
        status: EpisodeStatus,
        error_kind: Option<&str>,
    ) -> Result<(), LedgerError> {
        if let Some(record) = self.lookup(episode_id).await? {
            if record.status != status && !record.status.can_transition(status) {
                return Err(LedgerError::InvalidTransition {
                    episode_id: episode_id.to_string(),
                    from: record.status,
                    to: status,
                });
            }
        }

        self.append_event(&LedgerEvent {
            timestamp: Utc::now(),
            episode_id: episode_id.to_string(),
            status,
            error_kind: error_kind.map(str::to_string),
            forced: false,
        })
        .await
    }

    /// Force a completed (or failed) episode back into `in_progress`.
    /// Prior history is preserved; the attempt count grows.
    pub async fn mark_forced(&self, episode_id: &str) -> Result<(), LedgerError> {
        if self.lookup(episode_id).await?.is_none() {
            return Err(LedgerError::NotFound(episode_id.to_string()));
        }

        self.append_event(&LedgerEvent {
            timestamp: Utc::now(),
            episode_id: episode_id.to_string(),
            status: EpisodeStatus::InProgress,
            error_kind: None,
            forced: true,
        })
        .await
    }

    /// Records still eligible for the retry sweep.
    pub async fn list_incomplete(&self) -> Result<Vec<ProcessingRecord>, LedgerError> {
        let records = self.replay().await?;
        let mut incomplete: Vec<ProcessingRecord> = records
            .into_values()
            .filter(|r| r.status.is_incomplete())
            .collect();

        incomplete.sort_by(|a, b| a.last_attempt.cmp(&b.last_attempt));
        Ok(incomplete)
    }

    /// Summary counts by status.
    pub async fn status_summary(&self) -> Result<LedgerSummary, LedgerError> {
        let records = self.replay().await?;

        let mut summary = LedgerSummary::default();
        for record in records.values() {
            match record.status {
                EpisodeStatus::Pending => summary.pending += 1,
                EpisodeStatus::InProgress => summary.in_progress += 1,
                EpisodeStatus::Completed => summary.completed += 1,
                EpisodeStatus::Failed => summary.failed += 1,
            }
        }

        let mut recent: Vec<ProcessingRecord> = records.into_values().collect();
        recent.sort_by(|a, b| b.last_attempt.cmp(&a.last_attempt));
        summary.recent = recent.into_iter().take(5).collect();

        Ok(summary)
    }
}

/// Ledger status summary for the CLI.
#[derive(Debug, Clone, Default)]
pub struct LedgerSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub recent: Vec<ProcessingRecord>,
}

impl LedgerSummary {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_ledger() -> (Ledger, TempDir) {
        let temp = TempDir::new().unwrap();
        let ledger = Ledger::open(temp.path().join("ledger.jsonl")).await.unwrap();
        (ledger, temp)
    }

    #[tokio::test]
    async fn test_first_sighting_creates_record() {
        let (ledger, _temp) = create_test_ledger().await;

        ledger.mark("ep-42", EpisodeStatus::Pending, None).await.unwrap();

        let record = ledger.lookup("ep-42").await.unwrap().unwrap();
        assert_eq!(record.status, EpisodeStatus::Pending);
        assert_eq!(record.attempts, 0);
    }

    #[tokio::test]
    async fn test_mark_is_idempotent() {
        let (ledger, _temp) = create_test_ledger().await;

        ledger.mark("ep-42", EpisodeStatus::Pending, None).await.unwrap();
        ledger.mark("ep-42", EpisodeStatus::InProgress, None).await.unwrap();
        ledger.mark("ep-42", EpisodeStatus::Completed, None).await.unwrap();
        ledger.mark("ep-42", EpisodeStatus::Completed, None).await.unwrap();

        let records = ledger.replay().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records["ep-42"].status, EpisodeStatus::Completed);
        assert_eq!(records["ep-42"].attempts, 1);
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let (ledger, _temp) = create_test_ledger().await;

        ledger.mark("ep-42", EpisodeStatus::Pending, None).await.unwrap();
        ledger.mark("ep-42", EpisodeStatus::InProgress, None).await.unwrap();
        ledger.mark("ep-42", EpisodeStatus::Completed, None).await.unwrap();

        let err = ledger
            .mark("ep-42", EpisodeStatus::InProgress, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_forced_reprocess_increments_attempts() {
        let (ledger, _temp) = create_test_ledger().await;

        ledger.mark("ep-42", EpisodeStatus::Pending, None).await.unwrap();
        ledger.mark("ep-42", EpisodeStatus::InProgress, None).await.unwrap();
        ledger.mark("ep-42", EpisodeStatus::Completed, None).await.unwrap();

        ledger.mark_forced("ep-42").await.unwrap();

        let record = ledger.lookup("ep-42").await.unwrap().unwrap();
        assert_eq!(record.status, EpisodeStatus::InProgress);
        assert_eq!(record.attempts, 2);
    }

    #[tokio::test]
    async fn test_failed_records_keep_error_kind() {
        let (ledger, _temp) = create_test_ledger().await;

        ledger.mark("ep-7", EpisodeStatus::Pending, None).await.unwrap();
        ledger.mark("ep-7", EpisodeStatus::InProgress, None).await.unwrap();
        ledger
            .mark("ep-7", EpisodeStatus::Failed, Some("download_failed"))
            .await
            .unwrap();

        let record = ledger.lookup("ep-7").await.unwrap().unwrap();
        assert_eq!(record.status, EpisodeStatus::Failed);
        assert_eq!(record.last_error_kind.as_deref(), Some("download_failed"));
    }

    #[tokio::test]
    async fn test_list_incomplete() {
        let (ledger, _temp) = create_test_ledger().await;

        ledger.mark("ep-1", EpisodeStatus::Pending, None).await.unwrap();
        ledger.mark("ep-1", EpisodeStatus::InProgress, None).await.unwrap();
        ledger.mark("ep-1", EpisodeStatus::Completed, None).await.unwrap();

        ledger.mark("ep-2", EpisodeStatus::Pending, None).await.unwrap();
        ledger.mark("ep-3", EpisodeStatus::Pending, None).await.unwrap();
        ledger.mark("ep-3", EpisodeStatus::InProgress, None).await.unwrap();
        ledger
            .mark("ep-3", EpisodeStatus::Failed, Some("timeout"))
            .await
            .unwrap();

        let incomplete = ledger.list_incomplete().await.unwrap();
        let ids: Vec<&str> = incomplete.iter().map(|r| r.episode_id.as_str()).collect();
        assert_eq!(incomplete.len(), 2);
        assert!(ids.contains(&"ep-2"));
        assert!(ids.contains(&"ep-3"));
    }

    #[tokio::test]
    async fn test_per_id_lock_reuse() {
        let (ledger, _temp) = create_test_ledger().await;

        let a = ledger.lock_for("ep-1");
        let b = ledger.lock_for("ep-1");
        let c = ledger.lock_for("ep-2");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
