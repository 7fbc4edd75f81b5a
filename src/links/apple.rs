//! Apple Podcasts link lookup.
//!
//! Apple has no keyless episode API; the show page embeds a schema.org
//! JSON blob whose `workExample` array lists episodes with their URLs.
//! This is scrape-grade and isolated behind [`LinkProvider`] so a page
//! change degrades one platform, not the pipeline.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::config::AppleConfig;
use crate::domain::{EpisodeCandidate, Platform};
use crate::error::StageError;

use super::{title_matches_episode, LinkProvider};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<script[^>]*type=.application/ld\+json.[^>]*>(.*?)</script>")
            .expect("static regex")
    })
}

pub struct AppleLinks {
    client: reqwest::Client,
    config: AppleConfig,
}

impl AppleLinks {
    pub fn new(client: reqwest::Client, config: AppleConfig) -> Self {
        Self { client, config }
    }

    async fn fetch_show_page(&self) -> Result<String, StageError> {
        let response = self
            .client
            .get(&self.config.show_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| StageError::LinkResolution {
                platform: "apple".to_string(),
                message: format!("show page fetch failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(StageError::LinkResolution {
                platform: "apple".to_string(),
                message: format!("show page returned HTTP {}", response.status()),
            });
        }

        response.text().await.map_err(|e| StageError::LinkResolution {
            platform: "apple".to_string(),
            message: format!("show page body unreadable: {e}"),
        })
    }
}

#[async_trait]
impl LinkProvider for AppleLinks {
    fn platform(&self) -> Platform {
        Platform::Apple
    }

    async fn resolve(&self, episode: &EpisodeCandidate) -> Result<Option<String>, StageError> {
        let Some(number) = episode.episode_number() else {
            debug!(episode_id = %episode.id, "no episode number, skipping Apple lookup");
            return Ok(None);
        };

        let page = self.fetch_show_page().await?;
        Ok(find_episode_url(&page, number))
    }
}

/// Scan embedded JSON-LD blocks for a `workExample` entry whose name
/// starts with the episode number.
pub fn find_episode_url(page: &str, episode_number: u32) -> Option<String> {
    for capture in script_re().captures_iter(page) {
        let body = capture.get(1)?.as_str();
        if !body.contains("workExample") {
            continue;
        }
        let Ok(data) = serde_json::from_str::<Value>(body) else {
            continue;
        };
        let Some(examples) = data.get("workExample").and_then(Value::as_array) else {
            continue;
        };
        for example in examples {
            let name = example.get("name").and_then(Value::as_str).unwrap_or("");
            if title_matches_episode(name, episode_number) {
                return example
                    .get("url")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW_PAGE: &str = r#"
<html><head>
<script type="application/ld+json">
{"@type":"PodcastSeries","workExample":[
  {"name":"41. ETFs","url":"https://podcasts.apple.com/us/podcast/x/id1?i=41"},
  {"name":"42. Bonds Explained","url":"https://podcasts.apple.com/us/podcast/x/id1?i=42"}
]}
</script>
</head></html>
"#;

    #[test]
    fn test_finds_episode_by_number_prefix() {
        let url = find_episode_url(SHOW_PAGE, 42);
        assert_eq!(
            url.as_deref(),
            Some("https://podcasts.apple.com/us/podcast/x/id1?i=42")
        );
    }

    #[test]
    fn test_missing_episode_yields_none() {
        assert!(find_episode_url(SHOW_PAGE, 99).is_none());
    }

    #[test]
    fn test_page_without_json_ld_yields_none() {
        assert!(find_episode_url("<html><body>nothing</body></html>", 42).is_none());
    }
}
