//! Whisper-style HTTP transcription backend.
//!
//! Posts each segment as a multipart upload to the configured
//! transcriptions endpoint and returns the recognized text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::audio::AudioSegment;
use crate::config::TranscriptionConfig;
use crate::error::StageError;

use super::TranscriptionBackend;

/// HTTP transcription client.
pub struct HttpTranscriptionBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl HttpTranscriptionBackend {
    pub fn new(config: &TranscriptionConfig) -> Result<Self, StageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StageError::TranscriptionService(format!("build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_seconds: config.timeout_seconds,
        })
    }
}

#[async_trait]
impl TranscriptionBackend for HttpTranscriptionBackend {
    async fn transcribe(&self, segment: &AudioSegment) -> Result<String, StageError> {
        let file_name = segment
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("segment-{:03}.mp3", segment.index));

        let bytes = tokio::fs::read(&segment.path).await?;

        let file_part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| StageError::TranscriptionService(format!("build form: {}", e)))?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StageError::Timeout(self.timeout_seconds)
                } else {
                    StageError::TranscriptionService(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(StageError::QuotaExceeded(format!(
                "transcription segment {}: HTTP 429",
                segment.index
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::TranscriptionService(format!(
                "segment {}: HTTP {}: {}",
                segment.index,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| StageError::TranscriptionService(format!("parse response: {}", e)))?;

        Ok(parsed.text.trim().to_string())
    }
}
