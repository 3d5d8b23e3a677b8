/// Job source scrapers
///
/// Every external job board is wrapped in a [`JobScraper`] that fetches raw
/// postings and maps them onto the shared [`JobRecord`] shape. The
/// [`ScraperOrchestrator`] runs sources one at a time and isolates failures.

// Shared exponential back-off
pub mod retry;

// Sequential multi-source orchestration with dedup
pub mod orchestrator;

// Concrete sources
pub mod linkedin;
pub mod remoteok;
pub mod remotive;

pub use orchestrator::{OrchestrationResult, ScraperOrchestrator};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

/// A single job posting in the common shape every source produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Fingerprint of title + company + location + source
    pub uid: String,
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    /// Missing dates sort as oldest
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
    pub url: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl JobRecord {
    /// Build a record and compute its fingerprint.
    pub fn new(
        title: impl Into<String>,
        company: impl Into<String>,
        location: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let mut record = Self {
            uid: String::new(),
            title: title.into(),
            company: company.into(),
            location: location.into(),
            salary: None,
            posted_at: None,
            description: String::new(),
            url: url.into(),
            source: source.into(),
            experience_level: None,
            tags: Vec::new(),
        };
        record.refresh_uid();
        record
    }

    /// Recompute `uid` from the identifying fields.
    pub fn refresh_uid(&mut self) {
        self.uid = fingerprint(&self.title, &self.company, &self.location, &self.source);
    }

    /// Case-insensitive `title+company` key used for deduplication.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}",
            self.title.trim().to_lowercase(),
            self.company.trim().to_lowercase()
        )
    }
}

/// Stable fingerprint: first 16 bytes of SHA-256 over the lower-cased fields.
pub fn fingerprint(title: &str, company: &str, location: &str, source: &str) -> String {
    let input = format!(
        "{}|{}|{}|{}",
        title.trim().to_lowercase(),
        company.trim().to_lowercase(),
        location.trim().to_lowercase(),
        source.trim().to_lowercase()
    );
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..16])
}

/// Per-call scrape parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeConfig {
    pub keywords: String,
    pub location: String,
    pub max_results: usize,
    pub timeout: Duration,
}

/// Outcome of scraping one source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperResult {
    pub jobs: Vec<JobRecord>,
    pub source: String,
    pub total_found: usize,
    pub scraped_at: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub errors: Vec<String>,
}

impl ScraperResult {
    /// Empty result carrying the failure text of an isolated source.
    pub fn failed(source: &str, error: String, duration: Duration) -> Self {
        Self {
            jobs: Vec::new(),
            source: source.to_string(),
            total_found: 0,
            scraped_at: Utc::now(),
            duration,
            errors: vec![error],
        }
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

/// Failure fetching or parsing one source.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("could not parse response: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unknown source '{0}'")]
    UnknownSource(String),
}

/// One external job board.
#[async_trait]
pub trait JobScraper: Send + Sync {
    /// Stable source id used in node configs (e.g. "linkedin").
    fn source_id(&self) -> &str;

    /// Fetch and normalize postings.
    async fn scrape(&self, config: &ScrapeConfig) -> Result<ScraperResult, ScrapeError>;

    /// Upper bound on one `scrape` call when each request is bounded by
    /// `per_attempt`. Sources that retry or fall back widen it.
    fn deadline(&self, per_attempt: Duration) -> Duration {
        per_attempt
    }
}

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

/// Strip markup and decode the common HTML entities.
pub(crate) fn html_to_text(input: &str) -> String {
    let without_tags = TAG_RE.replace_all(input, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-insensitive "every keyword appears somewhere" match.
pub(crate) fn matches_keywords(keywords: &str, haystacks: &[&str]) -> bool {
    let text = haystacks.join(" ").to_lowercase();
    keywords
        .split_whitespace()
        .all(|word| text.contains(&word.to_lowercase()))
}

/// Client-side location match for remote-only boards.
///
/// An empty request or "remote" accepts everything. Otherwise the posting's
/// location must mention the request, or be open to anyone ("Remote",
/// "Worldwide", "Anywhere").
pub(crate) fn matches_location(requested: &str, location: &str) -> bool {
    let requested = requested.trim().to_lowercase();
    if requested.is_empty() || requested == "remote" {
        return true;
    }

    let location = location.trim().to_lowercase();
    matches!(location.as_str(), "" | "remote" | "worldwide" | "anywhere")
        || location.contains(&requested)
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
pub(crate) fn parse_posted_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_case_and_padding() {
        let a = fingerprint("Backend Engineer", "Acme", "Remote", "linkedin");
        let b = fingerprint("  backend engineer ", "ACME", "remote", "LinkedIn");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, fingerprint("Backend Engineer", "Acme", "Remote", "remotive"));
    }

    #[test]
    fn html_is_flattened_to_text() {
        let text = html_to_text("<p>Rust &amp; Go</p>\n<ul><li>Remote&nbsp;first</li></ul>");
        assert_eq!(text, "Rust & Go Remote first");
    }

    #[test]
    fn keyword_match_requires_every_word() {
        assert!(matches_keywords("rust engineer", &["Senior Rust Engineer", ""]));
        assert!(!matches_keywords("rust engineer", &["Senior Go Engineer"]));
        assert!(matches_keywords("", &["anything"]));
    }

    #[test]
    fn location_match_for_remote_boards() {
        assert!(matches_location("", "USA Only"));
        assert!(matches_location("Remote", "USA Only"));
        assert!(matches_location("usa", "USA Only"));
        assert!(matches_location("Germany", "Worldwide"));
        assert!(!matches_location("Germany", "USA Only"));
    }

    #[test]
    fn posted_at_accepts_dates_and_timestamps() {
        assert!(parse_posted_at("2024-03-01").is_some());
        assert!(parse_posted_at("2024-03-01T10:00:00+00:00").is_some());
        assert!(parse_posted_at("2024-03-01T10:00:00").is_some());
        assert!(parse_posted_at("yesterday").is_none());
    }
}
