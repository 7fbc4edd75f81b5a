//! Goodpods link construction.
//!
//! Goodpods episode URLs are fully deterministic from the podcast id,
//! show slug, episode number, and title, so no network call is needed.

use async_trait::async_trait;
use tracing::debug;

use crate::config::GoodpodsConfig;
use crate::domain::{slugify, EpisodeCandidate, Platform};
use crate::error::StageError;

use super::LinkProvider;

pub struct GoodpodsLinks {
    config: GoodpodsConfig,
}

impl GoodpodsLinks {
    pub fn new(config: GoodpodsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LinkProvider for GoodpodsLinks {
    fn platform(&self) -> Platform {
        Platform::Goodpods
    }

    async fn resolve(&self, episode: &EpisodeCandidate) -> Result<Option<String>, StageError> {
        let Some(number) = episode.episode_number() else {
            debug!(episode_id = %episode.id, "no episode number, skipping Goodpods link");
            return Ok(None);
        };

        let title_slug = slugify(episode.bare_title());
        Ok(Some(format!(
            "https://goodpods.com/podcasts/{}-{}/{}-{}",
            self.config.show_slug, self.config.podcast_id, number, title_slug
        )))
    }
}
