//! Episode audio handling: streaming download plus bounded-size chunking.
//!
//! The transcription service caps request size, so long episodes are
//! split into segments. Splits land on MP3 frame-sync boundaries so no
//! decodable audio is corrupted at a cut.

pub mod chunker;
pub mod fetcher;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StageError;

pub use fetcher::HttpAudioFetcher;

/// A bounded-size slice of an episode's audio, in strict index order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSegment {
    /// Zero-based sequence index
    pub index: usize,

    /// Local artifact path
    pub path: PathBuf,

    /// Segment size in bytes
    pub byte_len: u64,
}

/// Downloads episode audio and splits it into transcription-sized segments.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Fetch the audio at `url` and split it into ordered segments no
    /// larger than the configured maximum.
    async fn fetch_and_split(
        &self,
        url: &str,
        episode_id: &str,
    ) -> Result<Vec<AudioSegment>, StageError>;
}
