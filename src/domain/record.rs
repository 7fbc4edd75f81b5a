//! Per-episode processing state, derived from replaying the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of an episode identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    /// Seen in the feed, not yet started
    Pending,

    /// Pipeline currently holds this episode
    InProgress,

    /// Published and recorded; skipped on later sweeps
    Completed,

    /// Exhausted retries or hit a permanent error
    Failed,
}

impl EpisodeStatus {
    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// `Completed → InProgress` is only valid under force-reprocess,
    /// which the ledger gates separately.
    pub fn can_transition(self, next: EpisodeStatus) -> bool {
        use EpisodeStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Failed, InProgress)
        )
    }

    /// Statuses the retry sweep considers incomplete.
    pub fn is_incomplete(self) -> bool {
        !matches!(self, EpisodeStatus::Completed)
    }
}

/// Current ledger state for one episode identifier.
///
/// Never deleted; reprocessing appends new events on the same id so
/// history stays auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    /// Episode identifier (primary key, never duplicated)
    pub episode_id: String,

    /// Current status
    pub status: EpisodeStatus,

    /// Number of processing attempts so far
    pub attempts: u32,

    /// Timestamp of the most recent ledger event for this id
    pub last_attempt: DateTime<Utc>,

    /// Kind string of the last recorded error, if any
    pub last_error_kind: Option<String>,
}

impl ProcessingRecord {
    /// Fresh record for a newly sighted candidate.
    pub fn new(episode_id: String, now: DateTime<Utc>) -> Self {
        Self {
            episode_id,
            status: EpisodeStatus::Pending,
            attempts: 0,
            last_attempt: now,
            last_error_kind: None,
        }
    }
}
