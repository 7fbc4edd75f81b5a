//! Stage error taxonomy and retry classification.
//!
//! Every component raises a typed `StageError`; only the orchestrator
//! decides retry vs. terminal-fail vs. partial-continue, based on the
//! error's `ErrorClass`.

use thiserror::Error;

/// Typed failure raised by pipeline components.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("malformed feed item: {0}")]
    MalformedFeedItem(String),

    #[error("audio download failed: {0}")]
    DownloadFailed(String),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("transcription service error: {0}")]
    TranscriptionService(String),

    #[error("enrichment service error in {stage}: {message}")]
    EnrichmentService { stage: String, message: String },

    #[error("enrichment contract violation in {stage}: {message}")]
    EnrichmentContract { stage: String, message: String },

    #[error("link resolution failed for {platform}: {message}")]
    LinkResolution { platform: String, message: String },

    #[error("service quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("publish transport error: {0}")]
    PublishTransport(String),

    #[error("schema validation failed for fields: {}", .0.join(", "))]
    SchemaValidation(Vec<String>),

    #[error("stage timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the orchestrator should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry with standard exponential backoff.
    Transient,

    /// Retry with the longer quota backoff schedule.
    Quota,

    /// Do not retry; episode fails immediately with reason recorded.
    Permanent,

    /// Never retried automatically; surfaced to the operator.
    Validation,
}

impl StageError {
    /// Classify this error for the retry policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::FeedUnavailable(_)
            | Self::DownloadFailed(_)
            | Self::TranscriptionService(_)
            | Self::EnrichmentService { .. }
            | Self::LinkResolution { .. }
            | Self::PublishTransport(_)
            | Self::Timeout(_)
            | Self::Io(_) => ErrorClass::Transient,

            Self::QuotaExceeded(_) => ErrorClass::Quota,

            Self::MalformedFeedItem(_)
            | Self::UnsupportedFormat(_)
            | Self::EnrichmentContract { .. } => ErrorClass::Permanent,

            Self::SchemaValidation(_) => ErrorClass::Validation,
        }
    }

    /// Stable kind string recorded in the ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FeedUnavailable(_) => "feed_unavailable",
            Self::MalformedFeedItem(_) => "malformed_feed_item",
            Self::DownloadFailed(_) => "download_failed",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::TranscriptionService(_) => "transcription_service",
            Self::EnrichmentService { .. } => "enrichment_service",
            Self::EnrichmentContract { .. } => "enrichment_contract",
            Self::LinkResolution { .. } => "link_resolution",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::PublishTransport(_) => "publish_transport",
            Self::SchemaValidation(_) => "schema_validation",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io",
        }
    }

    /// True when the retry policy may re-attempt the stage.
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient | ErrorClass::Quota)
    }

    /// Map an HTTP transport error onto the taxonomy, promoting 429s.
    pub fn from_response_status(status: reqwest::StatusCode, context: &str) -> Self {
        if status.as_u16() == 429 {
            Self::QuotaExceeded(format!("{context}: HTTP 429"))
        } else {
            Self::PublishTransport(format!("{context}: HTTP {status}"))
        }
    }
}
