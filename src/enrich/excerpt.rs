//! Short listing excerpt generation.

use std::sync::Arc;

use crate::error::StageError;

use super::Generator;

const SYSTEM_PROMPT: &str =
    "You write short teaser copy for podcast episode listings. Reply with the excerpt only.";

pub struct ExcerptGenerator {
    generator: Arc<dyn Generator>,
    target_len: usize,
    input_budget_chars: usize,
}

impl ExcerptGenerator {
    pub fn new(generator: Arc<dyn Generator>, target_len: usize, input_budget_chars: usize) -> Self {
        Self {
            generator,
            target_len,
            input_budget_chars,
        }
    }

    /// Produce an excerpt at most `target_len` characters long.
    ///
    /// Inputs already under the limit pass through untouched. Model
    /// output that runs long is trimmed at the nearest sentence
    /// boundary at or before the limit, falling back to a hard cut.
    pub async fn generate(&self, transcript: &str, title: &str) -> Result<String, StageError> {
        let transcript = transcript.trim();
        if transcript.chars().count() <= self.target_len {
            return Ok(transcript.to_string());
        }

        let input: String = transcript.chars().take(self.input_budget_chars).collect();
        let prompt = format!(
            "Condense this podcast episode into a single teaser sentence of \
             at most {} characters. No quotes, no hashtags.\n\n\
             Episode Title: {}\n\n\
             Transcript (may be truncated):\n{}",
            self.target_len, title, input
        );

        let output = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        let output = output.trim().trim_matches('"').trim();
        if output.is_empty() {
            return Err(StageError::EnrichmentContract {
                stage: "excerpt_generator".to_string(),
                message: "model returned an empty excerpt".to_string(),
            });
        }

        Ok(trim_to_sentence(output, self.target_len))
    }
}

/// Trim to the last sentence-ending punctuation at or before `limit`
/// characters, or hard-cut when none exists.
pub fn trim_to_sentence(text: &str, limit: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit {
        return text.to_string();
    }

    let head = &chars[..limit];
    let boundary = head
        .iter()
        .rposition(|c| matches!(c, '.' | '!' | '?'))
        .map(|i| i + 1);

    match boundary {
        Some(end) => head[..end].iter().collect::<String>().trim().to_string(),
        None => head.iter().collect::<String>().trim_end().to_string(),
    }
}
