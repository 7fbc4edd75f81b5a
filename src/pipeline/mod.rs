//! Pipeline orchestration: retry policy and the per-episode state machine.

pub mod orchestrator;
pub mod retry;

pub use orchestrator::{Components, EpisodeOutcome, Orchestrator, SyncOptions, SyncReport};
pub use retry::{run_with_retry, RetryPolicy};
