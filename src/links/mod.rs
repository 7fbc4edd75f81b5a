//! Cross-platform listen links.
//!
//! Each provider knows how to locate an episode on one platform. The
//! resolver queries all configured providers concurrently; a provider
//! that fails or finds nothing is logged and omitted, never failing
//! the episode.

pub mod apple;
pub mod goodpods;
pub mod spotify;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::domain::{EpisodeCandidate, Platform};
use crate::error::StageError;

pub use apple::AppleLinks;
pub use goodpods::GoodpodsLinks;
pub use spotify::SpotifyLinks;

/// A single platform's episode lookup.
///
/// `Ok(None)` means the platform answered but the episode is not
/// listed yet (common right after release).
#[async_trait]
pub trait LinkProvider: Send + Sync {
    fn platform(&self) -> Platform;

    async fn resolve(&self, episode: &EpisodeCandidate) -> Result<Option<String>, StageError>;
}

pub struct LinkResolver {
    providers: Vec<Arc<dyn LinkProvider>>,
}

impl LinkResolver {
    pub fn new(providers: Vec<Arc<dyn LinkProvider>>) -> Self {
        Self { providers }
    }

    /// Build a resolver from whichever platforms are configured.
    pub fn from_config(links: &crate::config::LinksConfig, client: reqwest::Client) -> Self {
        let mut providers: Vec<Arc<dyn LinkProvider>> = Vec::new();

        if let Some(ref apple) = links.apple {
            providers.push(Arc::new(AppleLinks::new(client.clone(), apple.clone())));
        }
        if let Some(ref spotify) = links.spotify {
            providers.push(Arc::new(SpotifyLinks::new(client.clone(), spotify.clone())));
        }
        if let Some(ref goodpods) = links.goodpods {
            providers.push(Arc::new(GoodpodsLinks::new(goodpods.clone())));
        }

        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolve links on every configured platform concurrently.
    pub async fn resolve_all(&self, episode: &EpisodeCandidate) -> HashMap<Platform, String> {
        let lookups = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move { (provider.platform(), provider.resolve(episode).await) }
        });

        let mut links = HashMap::new();
        for (platform, result) in join_all(lookups).await {
            match result {
                Ok(Some(url)) => {
                    debug!(%platform, %url, "resolved listen link");
                    links.insert(platform, url);
                }
                Ok(None) => {
                    warn!(%platform, episode_id = %episode.id, "episode not listed yet");
                }
                Err(error) => {
                    warn!(%platform, episode_id = %episode.id, %error, "link lookup failed");
                }
            }
        }
        links
    }
}

/// True when a platform listing title refers to this episode number.
/// Listings use a bare "N." prefix rather than the display title.
pub(crate) fn title_matches_episode(listing_title: &str, episode_number: u32) -> bool {
    listing_title
        .trim_start()
        .strip_prefix(&episode_number.to_string())
        .map(|rest| rest.starts_with('.'))
        .unwrap_or(false)
}
