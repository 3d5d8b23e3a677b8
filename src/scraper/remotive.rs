/// Remotive remote-jobs search API
///
/// The API searches by keyword only; location is matched client side against
/// `candidate_required_location`.

use crate::scraper::{
    html_to_text, matches_location, parse_posted_at, JobRecord, JobScraper, RetryPolicy, ScrapeConfig, ScrapeError,
    ScraperResult,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

pub const SOURCE_ID: &str = "remotive";
pub const API_URL: &str = "https://remotive.com/api/remote-jobs";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    jobs: Vec<RemotiveJob>,
}

#[derive(Debug, Deserialize)]
struct RemotiveJob {
    title: String,
    #[serde(default)]
    company_name: String,
    #[serde(default)]
    candidate_required_location: String,
    #[serde(default)]
    salary: String,
    #[serde(default)]
    publication_date: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    tags: Vec<String>,
}

pub struct RemotiveScraper {
    client: reqwest::Client,
    api_url: String,
    retry: RetryPolicy,
}

impl RemotiveScraper {
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

    async fn fetch(&self, config: &ScrapeConfig) -> Result<SearchResponse, ScrapeError> {
        let limit = config.max_results.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("search", config.keywords.as_str()), ("limit", limit.as_str())])
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
impl JobScraper for RemotiveScraper {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn deadline(&self, per_attempt: Duration) -> Duration {
        self.retry.budget(per_attempt)
    }

    async fn scrape(&self, config: &ScrapeConfig) -> Result<ScraperResult, ScrapeError> {
        let started = std::time::Instant::now();
        let this = self;
        let response = self
            .retry
            .retry("remotive search", move || this.fetch(config))
            .await?;

        let matching: Vec<JobRecord> = response
            .jobs
            .into_iter()
            .map(|job| {
                let location = if job.candidate_required_location.trim().is_empty() {
                    "Remote".to_string()
                } else {
                    job.candidate_required_location
                };
                let mut record = JobRecord::new(job.title, job.company_name, location, job.url, SOURCE_ID);
                record.salary = Some(job.salary).filter(|s| !s.trim().is_empty());
                record.posted_at = parse_posted_at(&job.publication_date);
                record.description = html_to_text(&job.description);
                record.tags = job.tags;
                record
            })
            .filter(|job| matches_location(&config.location, &job.location))
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
