//! Episode candidates read from the RSS feed.
//!
//! A candidate is immutable once parsed. Titles in the feed carry a
//! leading `"N."` episode-number prefix which drives slugs, display
//! titles, and cross-platform lookups.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

fn number_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.\s*").expect("static regex"))
}

/// A feed item not yet confirmed as fully processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeCandidate {
    /// Stable identifier, from the feed GUID (falls back to `ep-<number>`)
    pub id: String,

    /// Raw feed title, e.g. "42. Title Words"
    pub title: String,

    /// Raw description, possibly containing markup
    pub description: String,

    /// Enclosure URL for the episode audio
    pub audio_url: String,

    /// Publish timestamp from the feed
    pub published: DateTime<Utc>,
}

impl EpisodeCandidate {
    /// Episode number from the leading `"N."` title prefix, if present.
    pub fn episode_number(&self) -> Option<u32> {
        number_prefix_re()
            .captures(&self.title)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Title without the number prefix.
    pub fn bare_title(&self) -> &str {
        match number_prefix_re().find(&self.title) {
            Some(m) => &self.title[m.end()..],
            None => &self.title,
        }
    }

    /// Display title in `"Ep N: Title"` form.
    pub fn display_title(&self) -> String {
        match self.episode_number() {
            Some(n) => format!("Ep {}: {}", n, self.bare_title()),
            None => self.title.clone(),
        }
    }

    /// URL-friendly slug, `ep-N-kebab-title` when a number is present.
    pub fn slug(&self) -> String {
        let body = slugify(self.bare_title());
        match self.episode_number() {
            Some(n) => format!("ep-{}-{}", n, body),
            None => body,
        }
    }

    /// Description with markup stripped and entities decoded.
    pub fn plain_description(&self) -> String {
        clean_html(&self.description)
    }
}

/// Lowercase, strip non-alphanumerics, collapse whitespace and hyphens.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut last_hyphen = true;

    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_hyphen = false;
        } else if (c.is_whitespace() || c == '-') && !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }

    slug.trim_matches('-').to_string()
}

/// Strip HTML tags and decode the common entities the feed emits.
pub fn clean_html(text: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"));

    let stripped = tag_re.replace_all(text, "");
    stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str) -> EpisodeCandidate {
        EpisodeCandidate {
            id: "guid-1".to_string(),
            title: title.to_string(),
            description: String::new(),
            audio_url: "https://host/audio.mp3".to_string(),
            published: Utc::now(),
        }
    }

    #[test]
    fn test_episode_number_from_prefix() {
        assert_eq!(candidate("42. Stock Splits").episode_number(), Some(42));
        assert_eq!(candidate("7.No space").episode_number(), Some(7));
        assert_eq!(candidate("Bonus episode").episode_number(), None);
    }

    #[test]
    fn test_display_title() {
        assert_eq!(
            candidate("42. Stock Splits").display_title(),
            "Ep 42: Stock Splits"
        );
        assert_eq!(candidate("Bonus episode").display_title(), "Bonus episode");
    }

    #[test]
    fn test_slug_generation() {
        assert_eq!(
            candidate("42. What's an ETF? (Part 2)").slug(),
            "ep-42-whats-an-etf-part-2"
        );
        assert_eq!(candidate("Bonus: Q&A Time").slug(), "bonus-qa-time");
    }

    #[test]
    fn test_slug_collapses_hyphens() {
        assert_eq!(candidate("3. A -- B   C").slug(), "ep-3-a-b-c");
    }

    #[test]
    fn test_clean_html() {
        assert_eq!(
            clean_html("<p>Bulls &amp; bears<br /> explained</p>"),
            "Bulls & bears explained"
        );
    }
}
