//! Transcription stage: per-segment speech-to-text plus ordered merge.
//!
//! Segments are submitted with bounded concurrency and may complete out
//! of order; results are buffered and reordered by index before the
//! merge, so the transcript always reads chronologically. A segment that
//! exhausts its retries fails the whole transcript; a gap in the middle
//! is worse than no transcript at all.

pub mod whisper;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::audio::AudioSegment;
use crate::config::TranscriptConfig;
use crate::domain::Transcript;
use crate::error::StageError;
use crate::pipeline::retry::{run_with_retry, RetryPolicy};

pub use whisper::HttpTranscriptionBackend;

/// Speech-to-text backend for a single audio segment.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn transcribe(&self, segment: &AudioSegment) -> Result<String, StageError>;
}

/// Drives per-segment transcription and assembles the final transcript.
pub struct TranscriptionStage {
    backend: Arc<dyn TranscriptionBackend>,
    concurrency: usize,
    separator: String,
    replacements: Vec<(String, String)>,
    hosts: Vec<String>,
}

impl TranscriptionStage {
    pub fn new(
        backend: Arc<dyn TranscriptionBackend>,
        concurrency: usize,
        config: &TranscriptConfig,
    ) -> Self {
        let separator = if config.separator.is_empty() {
            "\n\n".to_string()
        } else {
            config.separator.clone()
        };

        Self {
            backend,
            concurrency: concurrency.max(1),
            separator,
            replacements: config
                .replacements
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            hosts: config.hosts.clone(),
        }
    }

    /// Transcribe all segments and merge in index order.
    ///
    /// All-or-nothing: the first segment to exhaust its retries fails the
    /// episode's transcript.
    pub async fn transcribe_all(
        &self,
        segments: &[AudioSegment],
        policy: &RetryPolicy,
    ) -> Result<Transcript, StageError> {
        if segments.is_empty() {
            return Err(StageError::TranscriptionService(
                "no audio segments to transcribe".to_string(),
            ));
        }

        info!(segments = segments.len(), "Transcribing audio segments");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<Result<(usize, String), StageError>> = JoinSet::new();

        for segment in segments {
            let backend = Arc::clone(&self.backend);
            let semaphore = Arc::clone(&semaphore);
            let segment = segment.clone();
            let policy = policy.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| StageError::TranscriptionService("semaphore closed".into()))?;

                let text = run_with_retry(&policy, "transcribe", || {
                    let backend = Arc::clone(&backend);
                    let segment = segment.clone();
                    async move { backend.transcribe(&segment).await }
                })
                .await?;

                Ok((segment.index, text))
            });
        }

        // Buffer and reorder: completion order is not submission order.
        let mut ordered: Vec<Option<String>> = vec![None; segments.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, text) = joined
                .map_err(|e| StageError::TranscriptionService(format!("task panicked: {}", e)))??;
            debug!(index, chars = text.len(), "Segment transcribed");
            ordered[index] = Some(text);
        }

        let texts: Vec<String> = ordered
            .into_iter()
            .enumerate()
            .map(|(i, t)| {
                t.ok_or_else(|| {
                    StageError::TranscriptionService(format!("missing text for segment {}", i))
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(self.merge(&texts))
    }

    /// Merge per-segment texts in index order and post-process.
    pub fn merge(&self, texts: &[String]) -> Transcript {
        let joined = texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(&self.separator);

        let mut text = joined;
        for (wrong, right) in &self.replacements {
            text = text.replace(wrong.as_str(), right.as_str());
        }

        let html = render_html(&text, &self.hosts);

        Transcript { text, html }
    }
}

/// Render the transcript as `<p>` paragraphs, bolding host attribution
/// prefixes like "Jess:".
fn render_html(text: &str, hosts: &[String]) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", attribute_hosts(p, hosts)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn attribute_hosts(paragraph: &str, hosts: &[String]) -> String {
    for host in hosts {
        let prefix = format!("{}:", host);
        if let Some(rest) = paragraph.strip_prefix(&prefix) {
            return format!("<strong>{}:</strong>{}", host, rest);
        }
    }
    paragraph.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBackend {
        /// Delay per index so completion order differs from submission order
        delays_ms: Vec<u64>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranscriptionBackend for FakeBackend {
        async fn transcribe(&self, segment: &AudioSegment) -> Result<String, StageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays_ms.get(segment.index).copied().unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok(format!("segment {} text", segment.index))
        }
    }

    fn segment(index: usize) -> AudioSegment {
        AudioSegment {
            index,
            path: PathBuf::from(format!("/tmp/segment-{:03}.mp3", index)),
            byte_len: 100,
        }
    }

    fn stage(backend: Arc<dyn TranscriptionBackend>) -> TranscriptionStage {
        TranscriptionStage::new(backend, 3, &TranscriptConfig::default())
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            quota_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_merge_preserves_index_order_despite_completion_order() {
        // Segment 0 finishes last; output must still lead with it.
        let backend = Arc::new(FakeBackend {
            delays_ms: vec![50, 20, 0],
            calls: AtomicUsize::new(0),
        });
        let stage = stage(backend);

        let segments = vec![segment(0), segment(1), segment(2)];
        let transcript = stage
            .transcribe_all(&segments, &quick_policy())
            .await
            .unwrap();

        assert_eq!(
            transcript.text,
            "segment 0 text\n\nsegment 1 text\n\nsegment 2 text"
        );
    }

    #[tokio::test]
    async fn test_failing_segment_fails_whole_transcript() {
        struct FailingBackend;

        #[async_trait]
        impl TranscriptionBackend for FailingBackend {
            async fn transcribe(&self, segment: &AudioSegment) -> Result<String, StageError> {
                if segment.index == 1 {
                    Err(StageError::TranscriptionService("boom".into()))
                } else {
                    Ok("ok".into())
                }
            }
        }

        let stage = stage(Arc::new(FailingBackend));
        let segments = vec![segment(0), segment(1), segment(2)];
        let result = stage.transcribe_all(&segments, &quick_policy()).await;

        assert!(matches!(result, Err(StageError::TranscriptionService(_))));
    }

    #[test]
    fn test_merge_applies_replacement_table() {
        let config = TranscriptConfig {
            separator: "\n\n".into(),
            replacements: HashMap::from([("Jesse".to_string(), "Jessie".to_string())]),
            hosts: vec![],
        };
        let stage = TranscriptionStage::new(
            Arc::new(FakeBackend {
                delays_ms: vec![],
                calls: AtomicUsize::new(0),
            }),
            1,
            &config,
        );

        let transcript = stage.merge(&["Jesse said hello".to_string()]);
        assert_eq!(transcript.text, "Jessie said hello");
    }

    #[test]
    fn test_html_rendering_with_host_attribution() {
        let config = TranscriptConfig {
            separator: "\n\n".into(),
            replacements: HashMap::new(),
            hosts: vec!["Jess".to_string()],
        };
        let stage = TranscriptionStage::new(
            Arc::new(FakeBackend {
                delays_ms: vec![],
                calls: AtomicUsize::new(0),
            }),
            1,
            &config,
        );

        let transcript = stage.merge(&[
            "Jess: welcome back".to_string(),
            "And today we talk markets".to_string(),
        ]);
        assert_eq!(
            transcript.html,
            "<p><strong>Jess:</strong> welcome back</p>\n<p>And today we talk markets</p>"
        );
    }
}
