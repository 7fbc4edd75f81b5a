//! Question/answer pair generation from the transcript.
//!
//! The model is asked for a strict `Q:`/`A:` line format; the parser
//! tolerates blank lines and multi-line answers but an output with no
//! parseable pair is a contract violation.

use std::sync::Arc;

use crate::domain::QaPair;
use crate::error::StageError;

use super::Generator;

const SYSTEM_PROMPT: &str =
    "You are a podcast content assistant that writes listener-facing FAQ entries.";

const INPUT_BUDGET_CHARS: usize = 12_000;

/// Minimum pairs a usable output must contain.
const MIN_PAIRS: usize = 3;

pub struct QaGenerator {
    generator: Arc<dyn Generator>,
}

impl QaGenerator {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Generate Q&A pairs for the episode.
    pub async fn generate(&self, transcript: &str, title: &str) -> Result<Vec<QaPair>, StageError> {
        let input: String = transcript.chars().take(INPUT_BUDGET_CHARS).collect();
        let prompt = format!(
            "From this podcast episode transcript, write {} or more question and \
             answer pairs a listener might search for. Answers must be concise \
             (under 150 characters) and grounded in the transcript.\n\n\
             Format strictly as repeated blocks:\n\
             Q: <question>\n\
             A: <answer>\n\n\
             Episode Title: {}\n\n\
             Transcript (may be truncated):\n{}",
            MIN_PAIRS, title, input
        );

        let output = self.generator.generate(SYSTEM_PROMPT, &prompt).await?;
        let pairs = parse_qa(&output);

        if pairs.is_empty() {
            return Err(StageError::EnrichmentContract {
                stage: "qa_generator".to_string(),
                message: "output contained no Q:/A: pairs".to_string(),
            });
        }

        Ok(pairs)
    }
}

/// Parse `Q:`/`A:` blocks. Lines between an `A:` and the next `Q:` are
/// treated as answer continuation.
pub fn parse_qa(output: &str) -> Vec<QaPair> {
    let mut pairs = Vec::new();
    let mut question: Option<String> = None;
    let mut answer: Option<String> = None;

    let mut flush = |q: &mut Option<String>, a: &mut Option<String>, out: &mut Vec<QaPair>| {
        if let (Some(question), Some(answer)) = (q.take(), a.take()) {
            let question = normalize_question(&question);
            let answer = answer.trim().to_string();
            if !question.is_empty() && !answer.is_empty() {
                out.push(QaPair { question, answer });
            }
        }
    };

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Q:") {
            flush(&mut question, &mut answer, &mut pairs);
            question = Some(rest.trim().to_string());
        } else if let Some(rest) = trimmed.strip_prefix("A:") {
            answer = Some(rest.trim().to_string());
        } else if !trimmed.is_empty() {
            if let Some(ref mut a) = answer {
                a.push(' ');
                a.push_str(trimmed);
            }
        }
    }
    flush(&mut question, &mut answer, &mut pairs);

    pairs
}

/// Capitalize and ensure a trailing question mark.
fn normalize_question(question: &str) -> String {
    let mut q = question.trim().to_string();
    if q.is_empty() {
        return q;
    }
    if !q.ends_with('?') {
        q.push('?');
    }
    let mut chars = q.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => q,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn test_parse_simple_pairs() {
        let output = "Q: What is an ETF?\nA: A pooled fund.\n\nQ: what are splits\nA: Share divisions.";
        let pairs = parse_qa(output);

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].question, "What is an ETF?");
        assert_eq!(pairs[0].answer, "A pooled fund.");
        assert_eq!(pairs[1].question, "What are splits?");
    }

    #[test]
    fn test_multiline_answer_continuation() {
        let output = "Q: Why diversify?\nA: It spreads risk\nacross holdings.";
        let pairs = parse_qa(output);

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].answer, "It spreads risk across holdings.");
    }

    #[test]
    fn test_unparseable_output_yields_nothing() {
        assert!(parse_qa("The model rambled with no structure.").is_empty());
    }

    #[tokio::test]
    async fn test_generator_rejects_structureless_output() {
        struct Rambling;

        #[async_trait]
        impl Generator for Rambling {
            async fn generate(&self, _: &str, _: &str) -> Result<String, StageError> {
                Ok("no structure here".into())
            }
        }

        let generator = QaGenerator::new(Arc::new(Rambling));
        let err = generator.generate("transcript", "title").await.unwrap_err();
        assert!(matches!(err, StageError::EnrichmentContract { .. }));
    }
}
