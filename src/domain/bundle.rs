//! Enrichment bundle and publish field-set types.
//!
//! The bundle collects AI-derived and auxiliary fields between the
//! transcript join barrier and publishing. Each field carries its own
//! success/failure outcome so one stage's failure never poisons the rest.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered mapping of CMS field slug → value, validated before transmission.
pub type FieldSet = BTreeMap<String, Value>;

/// Outcome of a single enrichment stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageOutcome<T> {
    /// Stage produced a value
    Produced(T),

    /// Stage failed permanently or exhausted retries; reason recorded
    Unavailable(String),
}

impl<T> StageOutcome<T> {
    pub fn as_produced(&self) -> Option<&T> {
        match self {
            Self::Produced(v) => Some(v),
            Self::Unavailable(_) => None,
        }
    }

    pub fn is_produced(&self) -> bool {
        matches!(self, Self::Produced(_))
    }
}

/// A listen-link platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Apple,
    Spotify,
    Goodpods,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Apple => "apple",
            Platform::Spotify => "spotify",
            Platform::Goodpods => "goodpods",
        };
        f.write_str(name)
    }
}

/// One generated question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// Reference to a CMS image asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(rename = "fileId")]
    pub file_id: String,
    pub url: String,
    #[serde(default)]
    pub alt: Option<String>,
}

/// Merged transcript for an episode. Immutable once assembled;
/// re-transcription produces a new value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Plain merged text in segment order
    pub text: String,

    /// Paragraph-wrapped HTML rendering for the CMS
    pub html: String,
}

/// AI-derived and auxiliary fields attached to an episode before publish.
///
/// "Partial" until every field is produced or explicitly unavailable; the
/// publisher decides whether a missing field is acceptable per the
/// destination schema.
#[derive(Debug, Clone)]
pub struct EnrichmentBundle {
    pub category: StageOutcome<String>,
    pub qa_pairs: StageOutcome<Vec<QaPair>>,
    pub excerpt: StageOutcome<String>,
    pub thumbnail: StageOutcome<ImageRef>,
    pub links: HashMap<Platform, String>,
}

impl EnrichmentBundle {
    /// True when any stage came up unavailable.
    pub fn is_partial(&self) -> bool {
        !(self.category.is_produced()
            && self.qa_pairs.is_produced()
            && self.excerpt.is_produced()
            && self.thumbnail.is_produced())
    }

    /// Q&A pairs rendered as an HTML definition block for the CMS.
    pub fn qa_html(&self) -> Option<String> {
        let pairs = self.qa_pairs.as_produced()?;
        let mut html = String::new();
        for pair in pairs {
            html.push_str(&format!(
                "<p><strong>{}</strong><br />{}</p>\n",
                pair.question, pair.answer
            ));
        }
        Some(html.trim_end().to_string())
    }
}
