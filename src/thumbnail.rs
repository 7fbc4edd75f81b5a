//! Episode thumbnail selection.
//!
//! Kept behind a trait so a generated-artwork backend can slot in
//! later; today every episode uses the configured static asset.

use async_trait::async_trait;

use crate::config::ThumbnailAssetConfig;
use crate::domain::{EpisodeCandidate, ImageRef};
use crate::error::StageError;

#[async_trait]
pub trait ThumbnailProducer: Send + Sync {
    async fn produce(&self, episode: &EpisodeCandidate) -> Result<ImageRef, StageError>;
}

/// Serves the one asset configured under `cms.thumbnail`.
pub struct StaticThumbnail {
    asset: ThumbnailAssetConfig,
}

impl StaticThumbnail {
    pub fn new(asset: ThumbnailAssetConfig) -> Self {
        Self { asset }
    }
}

/// Placeholder when no asset is configured; the bundle field comes up
/// unavailable and the schema decides whether that is acceptable.
pub struct NoThumbnail;

#[async_trait]
impl ThumbnailProducer for NoThumbnail {
    async fn produce(&self, _episode: &EpisodeCandidate) -> Result<ImageRef, StageError> {
        Err(StageError::EnrichmentContract {
            stage: "thumbnail".to_string(),
            message: "no thumbnail asset configured".to_string(),
        })
    }
}

#[async_trait]
impl ThumbnailProducer for StaticThumbnail {
    async fn produce(&self, episode: &EpisodeCandidate) -> Result<ImageRef, StageError> {
        Ok(ImageRef {
            file_id: self.asset.file_id.clone(),
            url: self.asset.url.clone(),
            alt: Some(episode.display_title()),
        })
    }
}
