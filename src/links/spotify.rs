//! Spotify link lookup via the Web API.
//!
//! Uses the client-credentials flow; the short-lived token is fetched
//! per resolution rather than cached, which keeps the provider
//! stateless at the cost of one extra request per episode.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::SpotifyConfig;
use crate::domain::{EpisodeCandidate, Platform};
use crate::error::StageError;

use super::{title_matches_episode, LinkProvider};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct EpisodesPage {
    items: Vec<EpisodeItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeItem {
    name: String,
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: String,
}

pub struct SpotifyLinks {
    client: reqwest::Client,
    config: SpotifyConfig,
}

impl SpotifyLinks {
    pub fn new(client: reqwest::Client, config: SpotifyConfig) -> Self {
        Self { client, config }
    }

    async fn access_token(&self) -> Result<String, StageError> {
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| transport_error(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(transport_error(format!(
                "token request returned HTTP {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| transport_error(format!("token response malformed: {e}")))?;
        Ok(token.access_token)
    }

    async fn episodes_page(&self, url: &str, token: &str) -> Result<EpisodesPage, StageError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(format!("episodes request failed: {e}")))?;

        if response.status().as_u16() == 429 {
            return Err(StageError::QuotaExceeded("spotify episodes: HTTP 429".to_string()));
        }
        if !response.status().is_success() {
            return Err(transport_error(format!(
                "episodes request returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| transport_error(format!("episodes response malformed: {e}")))
    }
}

fn transport_error(message: String) -> StageError {
    StageError::LinkResolution {
        platform: "spotify".to_string(),
        message,
    }
}

#[async_trait]
impl LinkProvider for SpotifyLinks {
    fn platform(&self) -> Platform {
        Platform::Spotify
    }

    async fn resolve(&self, episode: &EpisodeCandidate) -> Result<Option<String>, StageError> {
        let Some(number) = episode.episode_number() else {
            debug!(episode_id = %episode.id, "no episode number, skipping Spotify lookup");
            return Ok(None);
        };

        let token = self.access_token().await?;
        let mut page_url = format!(
            "{}/shows/{}/episodes?limit=50",
            API_BASE, self.config.show_id
        );

        loop {
            let page = self.episodes_page(&page_url, &token).await?;
            for item in &page.items {
                if title_matches_episode(&item.name, number) {
                    return Ok(Some(item.external_urls.spotify.clone()));
                }
            }
            match page.next {
                Some(next) => page_url = next,
                None => return Ok(None),
            }
        }
    }
}
