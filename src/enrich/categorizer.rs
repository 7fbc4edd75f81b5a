//! Episode category classification.
//!
//! The answer must be one of the configured category names, exactly as
//! written. Anything else is a contract violation and is not retried:
//! the model deterministically failed the output contract.

use std::sync::Arc;

use crate::error::StageError;

use super::Generator;

const SYSTEM_PROMPT: &str = "You are a podcast categorization assistant.";

/// Transcript input budget for classification; the opening of an episode
/// is enough signal to pick a category.
const INPUT_BUDGET_CHARS: usize = 6_000;

pub struct Categorizer {
    generator: Arc<dyn Generator>,
    categories: Vec<String>,
}

impl Categorizer {
    pub fn new(generator: Arc<dyn Generator>, categories: Vec<String>) -> Self {
        Self {
            generator,
            categories,
        }
    }

    /// Pick the best matching category for the episode.
    pub async fn classify(&self, transcript: &str, title: &str) -> Result<String, StageError> {
        if self.categories.is_empty() {
            return Err(StageError::EnrichmentContract {
                stage: "categorizer".to_string(),
                message: "no categories configured".to_string(),
            });
        }

        let input: String = transcript.chars().take(INPUT_BUDGET_CHARS).collect();
        let prompt = format!(
            "Given the following podcast episode and list of categories, determine \
             the most appropriate category.\n\n\
             Categories: {}\n\n\
             Episode Title: {}\n\n\
             Episode transcript (may be truncated):\n{}\n\n\
             Return only the category name that best matches, exactly as written in \
             the categories list.",
            self.categories.join(", "),
            title,
            input
        );

        let answer = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        let answer = answer.trim().trim_matches('"').to_string();

        if !self.categories.iter().any(|c| c == &answer) {
            return Err(StageError::EnrichmentContract {
                stage: "categorizer".to_string(),
                message: format!("'{}' is not a configured category", answer),
            });
        }

        Ok(answer)
    }
}
