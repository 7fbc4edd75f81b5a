//! podsync - Podcast episode ingestion and enrichment pipeline
//!
//! Watches an RSS feed for new episodes and drives each one through
//! download, chunked transcription, AI enrichment, listen-link
//! resolution, and a schema-validated CMS publish.
//!
//! # Architecture
//!
//! Processing state lives in an append-only ledger keyed by episode id:
//! - Every status change is recorded as an immutable event
//! - Current per-episode state is derived by replaying events
//! - Completed episodes are skipped on later sweeps; failed ones can be retried
//!
//! # Modules
//!
//! - `feed`: RSS candidate discovery
//! - `audio`: download and MP3 frame-aligned chunking
//! - `transcribe`: concurrent per-segment speech-to-text and merge
//! - `enrich`: category, Q&A, and excerpt generation
//! - `links`: per-platform listen-link resolution
//! - `publish`: CMS schema validation and idempotent upsert
//! - `pipeline`: retry policy and the per-episode state machine
//!
//! # Usage
//!
//! ```bash
//! # One sweep of the feed
//! podsync sync
//!
//! # Poll on the configured schedule
//! podsync watch
//!
//! # Inspect the ledger
//! podsync status
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod domain;
pub mod enrich;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod links;
pub mod pipeline;
pub mod publish;
pub mod thumbnail;
pub mod transcribe;

pub use config::Config;
pub use domain::{
    EnrichmentBundle, EpisodeCandidate, EpisodeStatus, FieldSet, Platform, ProcessingRecord,
    QaPair, StageOutcome, Transcript,
};
pub use error::{ErrorClass, StageError};
pub use ledger::{Ledger, LedgerError};
pub use pipeline::{Orchestrator, RetryPolicy, SyncOptions, SyncReport};
pub use publish::{CmsApi, CmsItem, Publisher, Schema, SchemaField};
