//! Configuration for podsync.
//!
//! Loaded from a YAML file (default `podsync.yaml` next to the working
//! directory, overridable with `--config` or `PODSYNC_CONFIG`). The
//! resolved `Config` is an explicit value handed to each component at
//! construction; there is no process-global config state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration file schema.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    pub transcription: TranscriptionConfig,

    #[serde(default)]
    pub transcript: TranscriptConfig,

    pub generation: GenerationConfig,

    #[serde(default)]
    pub excerpt: ExcerptConfig,

    #[serde(default)]
    pub links: LinksConfig,

    pub cms: CmsConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Path to the episode ledger (default `~/.podsync/ledger.jsonl`)
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// RSS feed URL
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Working directory for downloaded audio (default `~/.podsync/audio`)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Maximum audio segment size in bytes (transcription service limit)
    #[serde(default = "default_max_segment_bytes")]
    pub max_segment_bytes: u64,

    /// Per-download timeout in seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            max_segment_bytes: default_max_segment_bytes(),
            download_timeout_seconds: default_download_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionConfig {
    /// Transcription endpoint (Whisper-style multipart API)
    #[serde(default = "default_transcription_endpoint")]
    pub endpoint: String,

    /// API key for the transcription service
    pub api_key: String,

    /// Model identifier
    #[serde(default = "default_whisper_model")]
    pub model: String,

    /// Maximum concurrent segment transcriptions
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-call timeout in seconds
    #[serde(default = "default_stage_timeout")]
    pub timeout_seconds: u64,
}

/// Transcript post-processing: merge separator, literal corrections,
/// and host names for speaker attribution lines.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptConfig {
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Literal text corrections applied after merge (wrong → right)
    #[serde(default)]
    pub replacements: HashMap<String, String>,

    /// Podcast host names, used to format attribution lines
    #[serde(default)]
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Chat-completions endpoint
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// API key for the generation service
    pub api_key: String,

    /// Model identifier
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_stage_timeout")]
    pub timeout_seconds: u64,

    /// Category names offered to the classifier
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExcerptConfig {
    /// Target excerpt length in characters
    #[serde(default = "default_excerpt_len")]
    pub target_len: usize,

    /// Transcript input budget in characters fed to the generator
    #[serde(default = "default_excerpt_budget")]
    pub input_budget_chars: usize,
}

impl Default for ExcerptConfig {
    fn default() -> Self {
        Self {
            target_len: default_excerpt_len(),
            input_budget_chars: default_excerpt_budget(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinksConfig {
    #[serde(default)]
    pub apple: Option<AppleConfig>,

    #[serde(default)]
    pub spotify: Option<SpotifyConfig>,

    #[serde(default)]
    pub goodpods: Option<GoodpodsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppleConfig {
    /// Show page URL scraped for episode links
    pub show_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub show_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoodpodsConfig {
    /// Numeric podcast id in Goodpods URLs
    pub podcast_id: String,

    /// Show slug prefix, e.g. "market-makeher-podcast"
    pub show_slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CmsConfig {
    /// API base URL (Webflow-v2-shaped)
    #[serde(default = "default_cms_api_url")]
    pub api_url: String,

    pub api_token: String,

    /// Episode collection id
    pub collection_id: String,

    /// Default episode accent color
    #[serde(default)]
    pub default_episode_color: Option<String>,

    /// Fallback thumbnail asset
    #[serde(default)]
    pub thumbnail: Option<ThumbnailAssetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailAssetConfig {
    pub file_id: String,
    pub url: String,
}

/// Recurring-invocation settings for `podsync watch`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Epoch to start polling from, "YYYY-MM-DD HH:MM:SS" in the
    /// configured offset
    #[serde(default)]
    pub start_datetime: Option<String>,

    /// Hours offset from UTC (e.g. -5 for EST)
    #[serde(default)]
    pub timezone_offset: i32,

    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            start_datetime: None,
            timezone_offset: 0,
            interval_minutes: default_interval_minutes(),
        }
    }
}

/// Retry/backoff settings applied uniformly by the orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Extra multiplier on delays for quota errors
    #[serde(default = "default_quota_multiplier")]
    pub quota_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            quota_multiplier: default_quota_multiplier(),
        }
    }
}

fn default_max_segment_bytes() -> u64 {
    25 * 1024 * 1024
}
fn default_download_timeout() -> u64 {
    600
}
fn default_transcription_endpoint() -> String {
    "https://api.openai.com/v1/audio/transcriptions".to_string()
}
fn default_generation_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_whisper_model() -> String {
    "whisper-1".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_concurrency() -> usize {
    3
}
fn default_stage_timeout() -> u64 {
    120
}
fn default_separator() -> String {
    "\n\n".to_string()
}
fn default_excerpt_len() -> usize {
    73
}
fn default_excerpt_budget() -> usize {
    12_000
}
fn default_cms_api_url() -> String {
    "https://api.webflow.com/v2".to_string()
}
fn default_interval_minutes() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_quota_multiplier() -> f64 {
    4.0
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config YAML")
    }

    /// Resolve the config path: explicit flag, then `PODSYNC_CONFIG`,
    /// then `./podsync.yaml`.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        if let Some(path) = explicit {
            return path;
        }
        if let Ok(env_path) = std::env::var("PODSYNC_CONFIG") {
            return PathBuf::from(env_path);
        }
        PathBuf::from("podsync.yaml")
    }

    /// Resolved ledger path, defaulting under the user's home directory.
    pub fn ledger_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.ledger_path {
            return Ok(path.clone());
        }
        let home = dirs::home_dir().context("Failed to determine home directory")?;
        Ok(home.join(".podsync").join("ledger.jsonl"))
    }

    /// Resolved audio working directory.
    pub fn audio_work_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.audio.work_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().context("Failed to determine home directory")?;
        Ok(home.join(".podsync").join("audio"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CONFIG_YAML: &str = r##"
feed:
  url: https://feeds.example.com/podcast.rss

transcription:
  api_key: test-whisper-key
  concurrency: 2

transcript:
  hosts: [Jess, Jessie]
  replacements:
    "Jesse": "Jessie"

generation:
  api_key: test-chat-key
  categories: [Investing, Economy, Retirement]

excerpt:
  target_len: 73

links:
  goodpods:
    podcast_id: "274363"
    show_slug: market-makeher-podcast

cms:
  api_token: test-cms-token
  collection_id: coll-123
  default_episode_color: "#fff4e1"

retry:
  max_attempts: 4
"##;

    #[test]
    fn test_config_parsing() {
        let config = Config::from_yaml(TEST_CONFIG_YAML).unwrap();

        assert_eq!(config.feed.url, "https://feeds.example.com/podcast.rss");
        assert_eq!(config.transcription.concurrency, 2);
        assert_eq!(config.transcription.model, "whisper-1");
        assert_eq!(
            config.transcript.replacements.get("Jesse"),
            Some(&"Jessie".to_string())
        );
        assert_eq!(config.generation.categories.len(), 3);
        assert_eq!(config.excerpt.target_len, 73);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert!(config.links.apple.is_none());
        assert_eq!(
            config.links.goodpods.unwrap().show_slug,
            "market-makeher-podcast"
        );
    }

    #[test]
    fn test_segment_size_default() {
        let config = Config::from_yaml(TEST_CONFIG_YAML).unwrap();
        assert_eq!(config.audio.max_segment_bytes, 25 * 1024 * 1024);
    }

    #[test]
    fn test_missing_required_section_fails() {
        assert!(Config::from_yaml("feed:\n  url: x\n").is_err());
    }

    #[test]
    fn test_explicit_ledger_path() {
        let mut config = Config::from_yaml(TEST_CONFIG_YAML).unwrap();
        config.ledger_path = Some(PathBuf::from("/tmp/ledger.jsonl"));
        assert_eq!(
            config.ledger_path().unwrap(),
            PathBuf::from("/tmp/ledger.jsonl")
        );
    }
}
