/// LinkedIn public job search
///
/// Primary fetch goes through the guest job-search endpoint, which returns a
/// fragment of `<li>` job cards. When the retried primary fetch is exhausted
/// the public search page (same card markup) is tried instead.

use crate::scraper::{
    html_to_text, parse_posted_at, JobRecord, JobScraper, RetryPolicy, ScrapeConfig, ScrapeError,
    ScraperResult,
};
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

pub const SOURCE_ID: &str = "linkedin";
pub const GUEST_API_URL: &str = "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search";
pub const SEARCH_PAGE_URL: &str = "https://www.linkedin.com/jobs/search";

static TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="[^"]*base-search-card__title[^"]*"[^>]*>(.*?)</h3>"#).expect("valid regex")
});
static COMPANY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="[^"]*base-search-card__subtitle[^"]*"[^>]*>(.*?)</h4>"#).expect("valid regex")
});
static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="[^"]*job-search-card__location[^"]*"[^>]*>(.*?)</span>"#).expect("valid regex")
});
static SALARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="[^"]*job-search-card__salary-info[^"]*"[^>]*>(.*?)</span>"#).expect("valid regex")
});
static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a[^>]*class="[^"]*base-card__full-link[^"]*"[^>]*href="([^"?]+)[^"]*""#).expect("valid regex")
});
static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<time[^>]*datetime="([^"]+)""#).expect("valid regex")
});

pub struct LinkedInScraper {
    client: reqwest::Client,
    api_url: String,
    search_url: String,
    retry: RetryPolicy,
}

impl LinkedInScraper {
    pub fn new(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self::with_urls(client, retry, GUEST_API_URL, SEARCH_PAGE_URL)
    }

    /// Point both fetch strategies somewhere else (used by tests).
    pub fn with_urls(
        client: reqwest::Client,
        retry: RetryPolicy,
        api_url: impl Into<String>,
        search_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            search_url: search_url.into(),
            retry,
        }
    }

    async fn fetch(&self, url: &str, config: &ScrapeConfig) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .query(&[
                ("keywords", config.keywords.as_str()),
                ("location", config.location.as_str()),
                ("start", "0"),
            ])
            .timeout(config.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ScrapeError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl JobScraper for LinkedInScraper {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    /// Two retried strategies: guest API, then search page.
    fn deadline(&self, per_attempt: Duration) -> Duration {
        self.retry.budget(per_attempt) * 2
    }

    async fn scrape(&self, config: &ScrapeConfig) -> Result<ScraperResult, ScrapeError> {
        let started = std::time::Instant::now();
        let this = self;

        let api_url = self.api_url.as_str();
        let primary = self
            .retry
            .retry("linkedin guest api", move || this.fetch(api_url, config))
            .await;

        let mut errors = Vec::new();
        let html = match primary {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("↩️ LinkedIn guest API exhausted, falling back to search page: {}", e);
                errors.push(format!("guest api: {}", e));
                let search_url = self.search_url.as_str();
                self.retry
                    .retry("linkedin search page", move || this.fetch(search_url, config))
                    .await?
            }
        };

        let parsed = parse_cards(&html);
        let total_found = parsed.len();
        let jobs: Vec<JobRecord> = parsed.into_iter().take(config.max_results).collect();

        tracing::debug!("🔎 LinkedIn: {} card(s) parsed, keeping {}", total_found, jobs.len());

        Ok(ScraperResult {
            jobs,
            source: SOURCE_ID.to_string(),
            total_found,
            scraped_at: Utc::now(),
            duration: Duration::from_millis(started.elapsed().as_millis() as u64),
            errors,
        })
    }
}

/// Extract job cards from a LinkedIn result fragment.
pub fn parse_cards(html: &str) -> Vec<JobRecord> {
    html.split("<li")
        .skip(1)
        .filter_map(parse_card)
        .collect()
}

fn parse_card(chunk: &str) -> Option<JobRecord> {
    let capture = |re: &Regex| {
        re.captures(chunk)
            .and_then(|c| c.get(1))
            .map(|m| html_to_text(m.as_str()))
            .filter(|s| !s.is_empty())
    };

    let title = capture(&TITLE_RE)?;
    let company = capture(&COMPANY_RE).unwrap_or_else(|| "Unknown".to_string());
    let location = capture(&LOCATION_RE).unwrap_or_default();
    let url = LINK_RE
        .captures(chunk)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let mut record = JobRecord::new(title, company, location, url, SOURCE_ID);
    record.salary = capture(&SALARY_RE);
    record.posted_at = DATE_RE
        .captures(chunk)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_posted_at(m.as_str()));
    Some(record)
}
