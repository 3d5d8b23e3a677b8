/// RemoteOK JSON feed
///
/// The feed returns every open posting; keyword and location matching are
/// done client side.
/// The first array element is a legal notice and carries no `position`.

use crate::scraper::{
    html_to_text, matches_keywords, matches_location, parse_posted_at, JobRecord, JobScraper, RetryPolicy,
    ScrapeConfig, ScrapeError, ScraperResult,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;

pub const SOURCE_ID: &str = "remoteok";
pub const API_URL: &str = "https://remoteok.com/api";

pub struct RemoteOkScraper {
    client: reqwest::Client,
    api_url: String,
    retry: RetryPolicy,
}

impl RemoteOkScraper {
    pub fn new(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self::with_url(client, retry, API_URL)
    }

    pub fn with_url(client: reqwest::Client, retry: RetryPolicy, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            retry,
        }
    }

    async fn fetch(&self, config: &ScrapeConfig) -> Result<Vec<Value>, ScrapeError> {
        let response = self
            .client
            .get(&self.api_url)
            .header("Accept", "application/json")
            .timeout(config.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ScrapeError::Status {
                status: response.status().as_u16(),
                url: self.api_url.clone(),
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ScrapeError::Parse(e.to_string()))
    }
}

#[async_trait]
impl JobScraper for RemoteOkScraper {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn deadline(&self, per_attempt: Duration) -> Duration {
        self.retry.budget(per_attempt)
    }

    async fn scrape(&self, config: &ScrapeConfig) -> Result<ScraperResult, ScrapeError> {
        let started = std::time::Instant::now();
        let this = self;
        let items = self
            .retry
            .retry("remoteok feed", move || this.fetch(config))
            .await?;

        let matching: Vec<JobRecord> = items
            .iter()
            .filter_map(to_record)
            .filter(|job| {
                let tags = job.tags.join(" ");
                matches_keywords(
                    &config.keywords,
                    &[job.title.as_str(), job.description.as_str(), tags.as_str()],
                ) && matches_location(&config.location, &job.location)
            })
            .collect();

        let total_found = matching.len();
        let jobs = matching.into_iter().take(config.max_results).collect();

        Ok(ScraperResult {
            jobs,
            source: SOURCE_ID.to_string(),
            total_found,
            scraped_at: Utc::now(),
            duration: Duration::from_millis(started.elapsed().as_millis() as u64),
            errors: Vec::new(),
        })
    }
}

fn to_record(item: &Value) -> Option<JobRecord> {
    let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);

    let title = text("position").filter(|t| !t.trim().is_empty())?;
    let company = text("company").unwrap_or_else(|| "Unknown".to_string());
    let location = text("location")
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| "Remote".to_string());
    let url = text("url").unwrap_or_default();

    let mut record = JobRecord::new(title, company, location, url, SOURCE_ID);
    record.description = text("description").map(|d| html_to_text(&d)).unwrap_or_default();
    record.posted_at = text("date").and_then(|d| parse_posted_at(&d));
    record.tags = item
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let salary_min = item.get("salary_min").and_then(Value::as_u64).filter(|v| *v > 0);
    let salary_max = item.get("salary_max").and_then(Value::as_u64).filter(|v| *v > 0);
    record.salary = match (salary_min, salary_max) {
        (Some(min), Some(max)) => Some(format!("${} - ${}", min, max)),
        (Some(min), None) => Some(format!("${}", min)),
        _ => None,
    };

    Some(record)
}
