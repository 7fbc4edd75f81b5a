//! End-to-end pipeline tests against in-memory component fakes.
//!
//! Covers the sweep scenarios that matter operationally: a fresh
//! episode publishing cleanly, a completed episode being skipped
//! without side effects, transient download failures retried to
//! success, and a permanently failing enrichment stage degrading to a
//! partial publish.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use podsync::audio::{AudioFetcher, AudioSegment};
use podsync::config::{GoodpodsConfig, ThumbnailAssetConfig, TranscriptConfig};
use podsync::domain::{EpisodeCandidate, EpisodeStatus, FieldSet};
use podsync::enrich::{Categorizer, ExcerptGenerator, Generator, QaGenerator};
use podsync::error::StageError;
use podsync::feed::FeedSource;
use podsync::ledger::Ledger;
use podsync::links::{GoodpodsLinks, LinkResolver};
use podsync::pipeline::{Components, Orchestrator, RetryPolicy, SyncOptions};
use podsync::publish::{CmsApi, CmsItem, Schema, SchemaField};
use podsync::thumbnail::StaticThumbnail;
use podsync::transcribe::{TranscriptionBackend, TranscriptionStage};

struct FakeFeed {
    candidates: Vec<EpisodeCandidate>,
}

#[async_trait]
impl FeedSource for FakeFeed {
    async fn fetch_candidates(&self) -> Result<Vec<EpisodeCandidate>, StageError> {
        Ok(self.candidates.clone())
    }
}

/// Audio fetcher that fails a configured number of times before
/// producing a single fake segment.
struct FakeAudio {
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
}

impl FakeAudio {
    fn new(failures: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl AudioFetcher for FakeAudio {
    async fn fetch_and_split(
        &self,
        _url: &str,
        _episode_id: &str,
    ) -> Result<Vec<AudioSegment>, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StageError::DownloadFailed("connection reset".into()));
        }
        Ok(vec![AudioSegment {
            index: 0,
            path: PathBuf::from("/tmp/fake-segment.mp3"),
            byte_len: 3,
        }])
    }
}

struct FakeBackend;

#[async_trait]
impl TranscriptionBackend for FakeBackend {
    async fn transcribe(&self, _segment: &AudioSegment) -> Result<String, StageError> {
        Ok("We talk bonds and how coupon payments work.".to_string())
    }
}

/// Canned chat generator; routes on prompt content the way the real
/// stages phrase their requests.
struct FakeGenerator {
    qa_fails: bool,
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, _system: &str, user: &str) -> Result<String, StageError> {
        if user.contains("question and answer pairs") {
            if self.qa_fails {
                return Err(StageError::EnrichmentContract {
                    stage: "qa_generator".into(),
                    message: "output contained no Q:/A: pairs".into(),
                });
            }
            return Ok("Q: What are bonds?\nA: Debt securities with fixed coupons.".into());
        }
        if user.contains("teaser sentence") {
            return Ok("Bonds, coupons, and why rates matter.".into());
        }
        Ok("Investing".into())
    }
}

struct FakeCms {
    schema: Schema,
    items: Mutex<Vec<CmsItem>>,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl FakeCms {
    fn new(schema: Schema) -> Self {
        Self {
            schema,
            items: Mutex::new(Vec::new()),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CmsApi for FakeCms {
    async fn fetch_schema(&self) -> Result<Schema, StageError> {
        Ok(self.schema.clone())
    }

    async fn list_items(&self) -> Result<Vec<CmsItem>, StageError> {
        Ok(self.items.lock().unwrap().clone())
    }

    async fn create_item(&self, fields: &FieldSet) -> Result<CmsItem, StageError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut items = self.items.lock().unwrap();
        let item = CmsItem {
            id: format!("item-{}", items.len() + 1),
            fields: fields.clone(),
        };
        items.push(item.clone());
        Ok(item)
    }

    async fn update_item(&self, id: &str, fields: &FieldSet) -> Result<CmsItem, StageError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut items = self.items.lock().unwrap();
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| StageError::PublishTransport(format!("no item {id}")))?;
        item.fields = fields.clone();
        Ok(item.clone())
    }
}

fn field(slug: &str, field_type: &str, required: bool) -> SchemaField {
    SchemaField {
        slug: slug.to_string(),
        required,
        field_type: field_type.to_string(),
    }
}

fn episode_schema() -> Schema {
    Schema {
        fields: vec![
            field("name", "PlainText", true),
            field("slug", "PlainText", true),
            field("episode-number", "Number", true),
            field("description", "RichText", false),
            field("episode-transcript", "RichText", false),
            field("episode-description-excerpt", "PlainText", false),
            field("episode-category", "PlainText", false),
            field("episode-q-a", "RichText", false),
            field("episode-main-image", "Image", false),
            field("episode-anchor-link", "Link", false),
        ],
    }
}

fn candidate(number: u32, title: &str) -> EpisodeCandidate {
    EpisodeCandidate {
        id: format!("ep-{number}"),
        title: format!("{number}. {title}"),
        description: "<p>All about bonds &amp; coupons.</p>".to_string(),
        audio_url: format!("https://cdn.example.com/{number}.mp3"),
        published: Utc::now(),
    }
}

struct Harness {
    orchestrator: Orchestrator,
    audio: Arc<FakeAudio>,
    cms: Arc<FakeCms>,
    _temp: TempDir,
}

async fn harness(candidates: Vec<EpisodeCandidate>, download_failures: usize, qa_fails: bool) -> Harness {
    let temp = TempDir::new().unwrap();
    let ledger = Ledger::open(temp.path().join("ledger.jsonl")).await.unwrap();

    let generator: Arc<dyn Generator> = Arc::new(FakeGenerator { qa_fails });
    let audio = Arc::new(FakeAudio::new(download_failures));
    let cms = Arc::new(FakeCms::new(episode_schema()));

    let components = Components {
        feed: Arc::new(FakeFeed { candidates }),
        audio: audio.clone(),
        transcription: TranscriptionStage::new(Arc::new(FakeBackend), 2, &TranscriptConfig::default()),
        categorizer: Categorizer::new(
            Arc::clone(&generator),
            vec!["Investing".into(), "Economy".into()],
        ),
        qa: QaGenerator::new(Arc::clone(&generator)),
        excerpt: ExcerptGenerator::new(generator, 73, 4000),
        links: LinkResolver::new(vec![Arc::new(GoodpodsLinks::new(GoodpodsConfig {
            podcast_id: "274363".into(),
            show_slug: "market-makeher-podcast".into(),
        }))]),
        thumbnail: Arc::new(StaticThumbnail::new(ThumbnailAssetConfig {
            file_id: "asset-1".into(),
            url: "https://assets.example.com/cover.png".into(),
        })),
        cms: cms.clone(),
    };

    let policy = RetryPolicy {
        max_attempts: 3,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2.0,
        quota_multiplier: 2.0,
    };

    Harness {
        orchestrator: Orchestrator::new(components, ledger, policy),
        audio,
        cms,
        _temp: temp,
    }
}

#[tokio::test]
async fn test_fresh_episode_publishes_and_completes() {
    let h = harness(vec![candidate(42, "Bonds Explained")], 0, false).await;

    let report = h.orchestrator.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);

    let items = h.cms.items.lock().unwrap().clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].fields["episode-number"], json!(42));
    assert_eq!(items[0].fields["name"], json!("Ep 42: Bonds Explained"));
    assert_eq!(items[0].fields["slug"], json!("ep-42-bonds-explained"));
    assert!(items[0].fields.contains_key("episode-anchor-link"));

    let record = h.orchestrator.ledger().lookup("ep-42").await.unwrap().unwrap();
    assert_eq!(record.status, EpisodeStatus::Completed);
}

#[tokio::test]
async fn test_completed_episode_is_skipped_without_side_effects() {
    let h = harness(vec![candidate(42, "Bonds Explained")], 0, false).await;

    let ledger = h.orchestrator.ledger();
    ledger.mark("ep-42", EpisodeStatus::Pending, None).await.unwrap();
    ledger.mark("ep-42", EpisodeStatus::InProgress, None).await.unwrap();
    ledger.mark("ep-42", EpisodeStatus::Completed, None).await.unwrap();

    let report = h.orchestrator.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.completed, 0);

    assert_eq!(h.audio.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.cms.creates.load(Ordering::SeqCst), 0);
    assert_eq!(h.cms.updates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transient_download_failures_are_retried_to_success() {
    let h = harness(vec![candidate(42, "Bonds Explained")], 2, false).await;

    let report = h.orchestrator.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(h.audio.calls.load(Ordering::SeqCst), 3);

    let record = h.orchestrator.ledger().lookup("ep-42").await.unwrap().unwrap();
    assert_eq!(record.status, EpisodeStatus::Completed);
}

#[tokio::test]
async fn test_download_failure_past_ceiling_marks_failed() {
    let h = harness(vec![candidate(42, "Bonds Explained")], 10, false).await;

    let report = h.orchestrator.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(h.audio.calls.load(Ordering::SeqCst), 3);

    let record = h.orchestrator.ledger().lookup("ep-42").await.unwrap().unwrap();
    assert_eq!(record.status, EpisodeStatus::Failed);
    assert_eq!(record.last_error_kind.as_deref(), Some("download_failed"));
    assert_eq!(h.cms.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_permanent_qa_failure_publishes_without_optional_field() {
    let h = harness(vec![candidate(42, "Bonds Explained")], 0, true).await;

    let report = h.orchestrator.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);

    let items = h.cms.items.lock().unwrap().clone();
    assert_eq!(items.len(), 1);
    assert!(!items[0].fields.contains_key("episode-q-a"));
    assert!(items[0].fields.contains_key("episode-category"));

    let record = h.orchestrator.ledger().lookup("ep-42").await.unwrap().unwrap();
    assert_eq!(record.status, EpisodeStatus::Completed);
}

#[tokio::test]
async fn test_rerun_updates_instead_of_duplicating() {
    let h = harness(vec![candidate(42, "Bonds Explained")], 0, false).await;

    h.orchestrator.sync(&SyncOptions::default()).await.unwrap();
    let forced = SyncOptions {
        force: true,
        ..SyncOptions::default()
    };
    h.orchestrator.sync(&forced).await.unwrap();

    let items = h.cms.items.lock().unwrap().clone();
    assert_eq!(items.len(), 1);
    assert_eq!(h.cms.creates.load(Ordering::SeqCst), 1);
    assert_eq!(h.cms.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let h = harness(vec![candidate(42, "Bonds Explained")], 0, false).await;

    let options = SyncOptions {
        dry_run: true,
        ..SyncOptions::default()
    };
    let report = h.orchestrator.sync(&options).await.unwrap();
    assert_eq!(report.completed, 1);

    assert!(h.cms.items.lock().unwrap().is_empty());
    assert!(h.orchestrator.ledger().lookup("ep-42").await.unwrap().is_none());
}

#[tokio::test]
async fn test_date_window_filters_candidates() {
    let mut old = candidate(41, "ETFs");
    old.published = Utc::now() - chrono::Duration::days(30);
    let h = harness(vec![old, candidate(42, "Bonds Explained")], 0, false).await;

    let options = SyncOptions {
        from: Some(Utc::now() - chrono::Duration::days(1)),
        ..SyncOptions::default()
    };
    let report = h.orchestrator.sync(&options).await.unwrap();

    assert_eq!(report.discovered, 1);
    assert_eq!(report.completed, 1);
    assert!(h.orchestrator.ledger().lookup("ep-41").await.unwrap().is_none());
}
