//! Streaming audio download.
//!
//! Streams the response body straight to disk so whole episodes never
//! sit in memory, validates the byte count against Content-Length, and
//! removes partial files on failure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::AudioConfig;
use crate::error::StageError;

use super::{chunker, AudioFetcher, AudioSegment};

/// HTTP audio fetcher with MP3 chunking.
pub struct HttpAudioFetcher {
    client: reqwest::Client,
    work_dir: PathBuf,
    max_segment_bytes: u64,
}

impl HttpAudioFetcher {
    pub fn new(config: &AudioConfig, work_dir: PathBuf) -> Result<Self, StageError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.download_timeout_seconds))
            .build()
            .map_err(|e| StageError::DownloadFailed(format!("build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            work_dir,
            max_segment_bytes: config.max_segment_bytes,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, StageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StageError::DownloadFailed(format!("start download: {}", e)))?;

        if !response.status().is_success() {
            return Err(StageError::DownloadFailed(format!(
                "download {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let content_length = response.content_length();
        let mut stream = response.bytes_stream();
        let mut file = fs::File::create(dest).await?;
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| StageError::DownloadFailed(format!("read stream: {}", e)))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;

        if let Some(expected) = content_length {
            if downloaded != expected {
                return Err(StageError::DownloadFailed(format!(
                    "incomplete download: got {} bytes, expected {}",
                    downloaded, expected
                )));
            }
        }

        if downloaded == 0 {
            return Err(StageError::DownloadFailed("empty response body".to_string()));
        }

        debug!(bytes = downloaded, "Download complete");
        Ok(downloaded)
    }
}

#[async_trait]
impl AudioFetcher for HttpAudioFetcher {
    async fn fetch_and_split(
        &self,
        url: &str,
        episode_id: &str,
    ) -> Result<Vec<AudioSegment>, StageError> {
        let episode_dir = self.work_dir.join(sanitize_dir_name(episode_id));
        fs::create_dir_all(&episode_dir).await?;

        let audio_path = episode_dir.join("episode.mp3");

        info!(%url, path = %audio_path.display(), "Downloading episode audio");
        match self.download(url, &audio_path).await {
            Ok(_) => {}
            Err(e) => {
                // Never retry against a truncated artifact.
                let _ = fs::remove_file(&audio_path).await;
                return Err(e);
            }
        }

        let segments =
            chunker::split_file(&audio_path, &episode_dir, self.max_segment_bytes).await?;
        info!(count = segments.len(), "Split audio into segments");

        Ok(segments)
    }
}

/// Episode ids may be feed GUIDs (URLs); keep directory names tame.
fn sanitize_dir_name(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_dir_name() {
        assert_eq!(sanitize_dir_name("ep-42"), "ep-42");
        assert_eq!(
            sanitize_dir_name("https://host/guid?id=1"),
            "https___host_guid_id_1"
        );
    }
}
