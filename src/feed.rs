//! RSS feed reader.
//!
//! Fetches the configured feed and maps entries to episode candidates.
//! Read-only: no retry here (retry policy belongs to the orchestrator)
//! and no ledger access.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::domain::EpisodeCandidate;
use crate::error::StageError;

/// Source of episode candidates.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch candidates in feed order. The orchestrator does not assume
    /// an ordering; it consults the ledger per id.
    async fn fetch_candidates(&self) -> Result<Vec<EpisodeCandidate>, StageError>;
}

/// HTTP feed reader over an RSS/Atom URL.
pub struct HttpFeedSource {
    url: String,
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            url: config.url.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_candidates(&self) -> Result<Vec<EpisodeCandidate>, StageError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| StageError::FeedUnavailable(format!("fetch {}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(StageError::FeedUnavailable(format!(
                "fetch {}: HTTP {}",
                self.url,
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| StageError::FeedUnavailable(format!("read feed body: {}", e)))?;

        let feed = feed_rs::parser::parse(body.as_ref())
            .map_err(|e| StageError::FeedUnavailable(format!("parse feed: {}", e)))?;

        debug!(entries = feed.entries.len(), "Parsed feed");

        let mut candidates = Vec::with_capacity(feed.entries.len());
        for entry in feed.entries {
            match map_entry(entry) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    // A single malformed item must not take down the sweep.
                    warn!(error = %e, "Skipping malformed feed item");
                }
            }
        }

        Ok(candidates)
    }
}

fn map_entry(entry: feed_rs::model::Entry) -> Result<EpisodeCandidate, StageError> {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| StageError::MalformedFeedItem(format!("entry {} has no title", entry.id)))?;

    let audio_url = enclosure_url(&entry).ok_or_else(|| {
        StageError::MalformedFeedItem(format!("entry '{}' has no audio enclosure", title))
    })?;

    let description = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .unwrap_or_default();

    let published = entry.published.or(entry.updated).unwrap_or_else(Utc::now);

    let id = if entry.id.is_empty() {
        derive_fallback_id(&title)?
    } else {
        entry.id.clone()
    };

    Ok(EpisodeCandidate {
        id,
        title,
        description,
        audio_url,
        published,
    })
}

/// Audio URL from the RSS enclosure (feed-rs surfaces it as media content,
/// with a link-rel fallback).
fn enclosure_url(entry: &feed_rs::model::Entry) -> Option<String> {
    for media in &entry.media {
        for content in &media.content {
            if let Some(url) = &content.url {
                return Some(url.to_string());
            }
        }
    }

    entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("enclosure"))
        .map(|l| l.href.clone())
}

fn derive_fallback_id(title: &str) -> Result<String, StageError> {
    let probe = EpisodeCandidate {
        id: String::new(),
        title: title.to_string(),
        description: String::new(),
        audio_url: String::new(),
        published: Utc::now(),
    };
    probe
        .episode_number()
        .map(|n| format!("ep-{}", n))
        .ok_or_else(|| {
            StageError::MalformedFeedItem(format!("entry '{}' has no GUID or episode number", title))
        })
}
