//! Domain types for the podsync pipeline.
//!
//! This module contains the core data structures:
//! - EpisodeCandidate: a feed item not yet confirmed as processed
//! - ProcessingRecord: per-episode ledger state
//! - Transcript / EnrichmentBundle: AI-derived content attached before publish

pub mod bundle;
pub mod episode;
pub mod record;

// Re-export commonly used types
pub use bundle::{EnrichmentBundle, FieldSet, ImageRef, Platform, QaPair, StageOutcome, Transcript};
pub use episode::{clean_html, slugify, EpisodeCandidate};
pub use record::{EpisodeStatus, ProcessingRecord};
