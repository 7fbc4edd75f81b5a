//! Per-episode pipeline state machine.
//!
//! Drives each candidate through download, transcription, enrichment
//! and link resolution (joined), then publish. The ledger is consulted
//! before any network work and updated at every status change; the
//! per-id lock means two concurrent sweeps never process the same
//! episode twice.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::audio::AudioFetcher;
use crate::config::Config;
use crate::domain::{
    EnrichmentBundle, EpisodeCandidate, EpisodeStatus, FieldSet, Platform, StageOutcome,
    Transcript,
};
use crate::enrich::{Categorizer, ExcerptGenerator, OpenAiGenerator, QaGenerator};
use crate::error::StageError;
use crate::feed::{FeedSource, HttpFeedSource};
use crate::ledger::Ledger;
use crate::links::LinkResolver;
use crate::publish::{CmsApi, Publisher, WebflowClient};
use crate::thumbnail::{NoThumbnail, StaticThumbnail, ThumbnailProducer};
use crate::transcribe::{HttpTranscriptionBackend, TranscriptionStage};

use super::retry::{run_with_retry, RetryPolicy};

const APPLE_LINK_BASE: &str = "https://podcasts.apple.com/us/podcast/";

/// Flags from the CLI collapsed into one record.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Run the full pipeline through validation without ledger or CMS writes
    pub dry_run: bool,

    /// Re-drive episodes the ledger already marks completed
    pub force: bool,

    /// Override the configured retry ceiling
    pub max_retries: Option<u32>,

    /// Bound on episodes processed this run
    pub batch_size: Option<usize>,

    /// Only consider episodes published at or after this instant
    pub from: Option<DateTime<Utc>>,

    /// Only consider episodes published at or before this instant
    pub to: Option<DateTime<Utc>>,
}

/// What happened to one candidate during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeOutcome {
    Completed,
    Skipped,
    Failed { error_kind: String },
}

/// Sweep totals, reported by `sync`.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub discovered: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The pipeline's pluggable parts. Production wiring comes from
/// `Orchestrator::from_config`; tests substitute fakes.
pub struct Components {
    pub feed: Arc<dyn FeedSource>,
    pub audio: Arc<dyn AudioFetcher>,
    pub transcription: TranscriptionStage,
    pub categorizer: Categorizer,
    pub qa: QaGenerator,
    pub excerpt: ExcerptGenerator,
    pub links: LinkResolver,
    pub thumbnail: Arc<dyn ThumbnailProducer>,
    pub cms: Arc<dyn CmsApi>,
}

pub struct Orchestrator {
    feed: Arc<dyn FeedSource>,
    audio: Arc<dyn AudioFetcher>,
    transcription: TranscriptionStage,
    categorizer: Categorizer,
    qa: QaGenerator,
    excerpt: ExcerptGenerator,
    links: LinkResolver,
    thumbnail: Arc<dyn ThumbnailProducer>,
    publisher: Publisher,
    ledger: Ledger,
    policy: RetryPolicy,
    episode_color: Option<String>,
}

impl Orchestrator {
    pub fn new(components: Components, ledger: Ledger, policy: RetryPolicy) -> Self {
        Self {
            feed: components.feed,
            audio: components.audio,
            transcription: components.transcription,
            categorizer: components.categorizer,
            qa: components.qa,
            excerpt: components.excerpt,
            links: components.links,
            thumbnail: components.thumbnail,
            publisher: Publisher::new(components.cms),
            ledger,
            policy,
            episode_color: None,
        }
    }

    pub fn with_episode_color(mut self, color: Option<String>) -> Self {
        self.episode_color = color;
        self
    }

    /// Wire the production components from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let ledger = Ledger::open(config.ledger_path()?)
            .await
            .context("Failed to open episode ledger")?;

        let generator = Arc::new(OpenAiGenerator::new(&config.generation)?);
        let http = reqwest::Client::new();

        let backend = Arc::new(HttpTranscriptionBackend::new(&config.transcription)?);
        let components = Components {
            feed: Arc::new(HttpFeedSource::new(&config.feed)),
            audio: Arc::new(crate::audio::HttpAudioFetcher::new(
                &config.audio,
                config.audio_work_dir()?,
            )?),
            transcription: TranscriptionStage::new(
                backend,
                config.transcription.concurrency,
                &config.transcript,
            ),
            categorizer: Categorizer::new(
                Arc::clone(&generator) as Arc<dyn crate::enrich::Generator>,
                config.generation.categories.clone(),
            ),
            qa: QaGenerator::new(Arc::clone(&generator) as Arc<dyn crate::enrich::Generator>),
            excerpt: ExcerptGenerator::new(
                generator,
                config.excerpt.target_len,
                config.excerpt.input_budget_chars,
            ),
            links: LinkResolver::from_config(&config.links, http.clone()),
            thumbnail: match config.cms.thumbnail.clone() {
                Some(asset) => Arc::new(StaticThumbnail::new(asset)) as Arc<dyn ThumbnailProducer>,
                None => Arc::new(NoThumbnail),
            },
            cms: Arc::new(WebflowClient::new(http, &config.cms)),
        };

        let policy = RetryPolicy::from_config(&config.retry);
        Ok(Self::new(components, ledger, policy)
            .with_episode_color(config.cms.default_episode_color.clone()))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Sweep the feed once: fetch candidates, filter by the date
    /// window, and drive each unprocessed episode through the pipeline.
    #[instrument(skip(self, options), fields(dry_run = options.dry_run, force = options.force))]
    pub async fn sync(&self, options: &SyncOptions) -> Result<SyncReport> {
        let policy = match options.max_retries {
            Some(ceiling) => self.policy.clone().with_max_attempts(ceiling),
            None => self.policy.clone(),
        };

        let feed = Arc::clone(&self.feed);
        let mut candidates = run_with_retry(&policy, "feed", || {
            let feed = Arc::clone(&feed);
            async move { feed.fetch_candidates().await }
        })
        .await
        .context("Failed to fetch feed")?;

        candidates.retain(|c| {
            options.from.map_or(true, |from| c.published >= from)
                && options.to.map_or(true, |to| c.published <= to)
        });
        candidates.sort_by_key(|c| c.published);

        let mut report = SyncReport {
            discovered: candidates.len(),
            ..SyncReport::default()
        };
        info!(candidates = candidates.len(), "Feed sweep starting");

        let mut processed = 0usize;
        for candidate in &candidates {
            if let Some(limit) = options.batch_size {
                if processed >= limit {
                    break;
                }
            }

            match self.process_episode(candidate, &policy, options).await {
                EpisodeOutcome::Completed => {
                    report.completed += 1;
                    processed += 1;
                }
                EpisodeOutcome::Skipped => report.skipped += 1,
                EpisodeOutcome::Failed { error_kind } => {
                    error!(episode_id = %candidate.id, %error_kind, "Episode failed");
                    report.failed += 1;
                    processed += 1;
                }
            }
        }

        info!(
            completed = report.completed,
            skipped = report.skipped,
            failed = report.failed,
            "Feed sweep finished"
        );
        Ok(report)
    }

    /// Re-drive episodes the ledger lists as failed or stuck in progress.
    #[instrument(skip(self, options))]
    pub async fn retry_incomplete(&self, options: &SyncOptions) -> Result<SyncReport> {
        let incomplete = self
            .ledger
            .list_incomplete()
            .await
            .context("Failed to read ledger")?;

        if incomplete.is_empty() {
            info!("No incomplete episodes to retry");
            return Ok(SyncReport::default());
        }

        let ids: Vec<String> = incomplete.into_iter().map(|r| r.episode_id).collect();
        info!(count = ids.len(), "Retrying incomplete episodes");

        let policy = match options.max_retries {
            Some(ceiling) => self.policy.clone().with_max_attempts(ceiling),
            None => self.policy.clone(),
        };

        let feed = Arc::clone(&self.feed);
        let candidates = run_with_retry(&policy, "feed", || {
            let feed = Arc::clone(&feed);
            async move { feed.fetch_candidates().await }
        })
        .await
        .context("Failed to fetch feed")?;

        let mut report = SyncReport::default();
        for id in &ids {
            let Some(candidate) = candidates.iter().find(|c| &c.id == id) else {
                warn!(episode_id = %id, "Incomplete episode no longer in feed");
                continue;
            };
            report.discovered += 1;

            match self.process_episode(candidate, &policy, options).await {
                EpisodeOutcome::Completed => report.completed += 1,
                EpisodeOutcome::Skipped => report.skipped += 1,
                EpisodeOutcome::Failed { error_kind } => {
                    error!(episode_id = %candidate.id, %error_kind, "Episode failed again");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Drive one candidate through the state machine under its ledger lock.
    #[instrument(skip(self, candidate, policy, options), fields(episode_id = %candidate.id))]
    async fn process_episode(
        &self,
        candidate: &EpisodeCandidate,
        policy: &RetryPolicy,
        options: &SyncOptions,
    ) -> EpisodeOutcome {
        let lock = self.ledger.lock_for(&candidate.id);
        let _guard = lock.lock().await;

        let record = match self.ledger.lookup(&candidate.id).await {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "Ledger lookup failed");
                return EpisodeOutcome::Failed {
                    error_kind: "io".to_string(),
                };
            }
        };

        let completed = matches!(&record, Some(r) if r.status == EpisodeStatus::Completed);
        if completed && !options.force {
            return EpisodeOutcome::Skipped;
        }

        if !options.dry_run {
            let marked = if completed {
                self.ledger.mark_forced(&candidate.id).await
            } else {
                if record.is_none() {
                    if let Err(e) = self
                        .ledger
                        .mark(&candidate.id, EpisodeStatus::Pending, None)
                        .await
                    {
                        error!(error = %e, "Ledger write failed");
                        return EpisodeOutcome::Failed {
                            error_kind: "io".to_string(),
                        };
                    }
                }
                self.ledger
                    .mark(&candidate.id, EpisodeStatus::InProgress, None)
                    .await
            };
            if let Err(e) = marked {
                error!(error = %e, "Ledger write failed");
                return EpisodeOutcome::Failed {
                    error_kind: "io".to_string(),
                };
            }
        }

        info!(title = %candidate.title, forced = completed, "Processing episode");

        match self.run_stages(candidate, policy, options).await {
            Ok(()) => {
                if !options.dry_run {
                    if let Err(e) = self
                        .ledger
                        .mark(&candidate.id, EpisodeStatus::Completed, None)
                        .await
                    {
                        error!(error = %e, "Ledger write failed");
                        return EpisodeOutcome::Failed {
                            error_kind: "io".to_string(),
                        };
                    }
                }
                EpisodeOutcome::Completed
            }
            Err(stage_error) => {
                let error_kind = stage_error.kind().to_string();
                warn!(error = %stage_error, "Pipeline stage failed");
                if !options.dry_run {
                    if let Err(e) = self
                        .ledger
                        .mark(&candidate.id, EpisodeStatus::Failed, Some(&error_kind))
                        .await
                    {
                        error!(error = %e, "Ledger write failed");
                    }
                }
                EpisodeOutcome::Failed { error_kind }
            }
        }
    }

    /// Download, transcribe, enrich and resolve links in parallel, publish.
    async fn run_stages(
        &self,
        candidate: &EpisodeCandidate,
        policy: &RetryPolicy,
        options: &SyncOptions,
    ) -> Result<(), StageError> {
        let audio = Arc::clone(&self.audio);
        let segments = run_with_retry(policy, "download", || {
            let audio = Arc::clone(&audio);
            let url = candidate.audio_url.clone();
            let id = candidate.id.clone();
            async move { audio.fetch_and_split(&url, &id).await }
        })
        .await?;

        let transcript = self.transcription.transcribe_all(&segments, policy).await?;
        info!(chars = transcript.text.len(), "Transcript assembled");

        // Enrichment stages and link resolution run concurrently and
        // rejoin before publish; none of them block each other.
        let (category, qa_pairs, excerpt, thumbnail, links) = tokio::join!(
            self.categorize(candidate, &transcript, policy),
            self.generate_qa(candidate, &transcript, policy),
            self.generate_excerpt(candidate, &transcript, policy),
            self.produce_thumbnail(candidate, policy),
            self.links.resolve_all(candidate),
        );

        let bundle = EnrichmentBundle {
            category,
            qa_pairs,
            excerpt,
            thumbnail,
            links,
        };
        if bundle.is_partial() {
            warn!("Enrichment bundle is partial; unavailable fields will be omitted");
        }

        let fields = self.build_field_set(candidate, &transcript, &bundle);

        if options.dry_run {
            let validated = self.publisher.check(&fields).await?;
            info!(fields = validated.len(), "Dry run: field set validated, skipping publish");
            return Ok(());
        }

        run_with_retry(policy, "publish", || {
            let fields = fields.clone();
            async move { self.publisher.upsert(&fields).await.map(|_| ()) }
        })
        .await?;

        Ok(())
    }

    async fn categorize(
        &self,
        candidate: &EpisodeCandidate,
        transcript: &Transcript,
        policy: &RetryPolicy,
    ) -> StageOutcome<String> {
        let result = run_with_retry(policy, "categorize", || {
            self.categorizer.classify(&transcript.text, &candidate.title)
        })
        .await;
        into_outcome("categorize", result)
    }

    async fn generate_qa(
        &self,
        candidate: &EpisodeCandidate,
        transcript: &Transcript,
        policy: &RetryPolicy,
    ) -> StageOutcome<Vec<crate::domain::QaPair>> {
        let result = run_with_retry(policy, "qa", || {
            self.qa.generate(&transcript.text, &candidate.title)
        })
        .await;
        into_outcome("qa", result)
    }

    async fn generate_excerpt(
        &self,
        candidate: &EpisodeCandidate,
        transcript: &Transcript,
        policy: &RetryPolicy,
    ) -> StageOutcome<String> {
        let result = run_with_retry(policy, "excerpt", || {
            self.excerpt.generate(&transcript.text, &candidate.title)
        })
        .await;
        into_outcome("excerpt", result)
    }

    async fn produce_thumbnail(
        &self,
        candidate: &EpisodeCandidate,
        policy: &RetryPolicy,
    ) -> StageOutcome<crate::domain::ImageRef> {
        let result = run_with_retry(policy, "thumbnail", || self.thumbnail.produce(candidate)).await;
        into_outcome("thumbnail", result)
    }

    /// Assemble the CMS field set. Unavailable bundle fields are
    /// omitted; the schema decides downstream whether that is fatal.
    fn build_field_set(
        &self,
        candidate: &EpisodeCandidate,
        transcript: &Transcript,
        bundle: &EnrichmentBundle,
    ) -> FieldSet {
        let mut fields = FieldSet::new();
        fields.insert("name".into(), json!(candidate.display_title()));
        fields.insert("slug".into(), json!(candidate.slug()));
        if let Some(number) = candidate.episode_number() {
            fields.insert("episode-number".into(), json!(number));
        }
        fields.insert("description".into(), json!(candidate.plain_description()));
        fields.insert("episode-transcript".into(), json!(transcript.html));

        if let Some(excerpt) = bundle.excerpt.as_produced() {
            fields.insert("episode-description-excerpt".into(), json!(excerpt));
        }
        if let Some(category) = bundle.category.as_produced() {
            fields.insert("episode-category".into(), json!(category));
        }
        if let Some(qa_html) = bundle.qa_html() {
            fields.insert("episode-q-a".into(), json!(qa_html));
        }
        if let Some(image) = bundle.thumbnail.as_produced() {
            if let Ok(value) = serde_json::to_value(image) {
                fields.insert("episode-main-image".into(), value);
            }
        }
        if let Some(ref color) = self.episode_color {
            fields.insert("episode-color".into(), json!(color));
        }

        if let Some(apple) = bundle.links.get(&Platform::Apple) {
            fields.insert("episode-apple-podcasts-link".into(), json!(apple));
            if let Some(short) = apple.strip_prefix(APPLE_LINK_BASE) {
                fields.insert("apple-podcast-link-for-player".into(), json!(short));
            }
        }
        if let Some(spotify) = bundle.links.get(&Platform::Spotify) {
            fields.insert("episode-spotify-link".into(), json!(spotify));
        }
        if let Some(goodpods) = bundle.links.get(&Platform::Goodpods) {
            fields.insert("episode-anchor-link".into(), json!(goodpods));
        }

        fields
    }
}

fn into_outcome<T>(stage: &str, result: Result<T, StageError>) -> StageOutcome<T> {
    match result {
        Ok(value) => StageOutcome::Produced(value),
        Err(e) => {
            warn!(stage, error = %e, "Enrichment stage unavailable");
            StageOutcome::Unavailable(e.to_string())
        }
    }
}
