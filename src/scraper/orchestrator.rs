/// Sequential multi-source scraping
///
/// Sources run one after another with a fixed pause in between so external
/// boards are never hit concurrently. A failing source becomes an empty
/// result carrying its error text; the remaining sources still run.

use crate::scraper::{JobRecord, JobScraper, ScrapeConfig, ScrapeError, ScraperResult};
use std::{collections::HashSet, sync::Arc, time::Duration};

/// Combined output of one orchestration call.
#[derive(Debug, Clone)]
pub struct OrchestrationResult {
    /// Deduplicated jobs, in source order
    pub jobs: Vec<JobRecord>,
    /// One result per requested source
    pub results: Vec<ScraperResult>,
}

impl OrchestrationResult {
    /// Error texts across all sources, prefixed with the source id.
    pub fn errors(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| r.errors.iter().map(move |e| format!("{}: {}", r.source, e)))
            .collect()
    }
}

/// Runs registered scrapers one at a time with rate limiting between them.
pub struct ScraperOrchestrator {
    /// Registered sources, in registration order
    scrapers: Vec<Arc<dyn JobScraper>>,
    /// Pause inserted between two consecutive sources
    inter_source_delay: Duration,
}

impl ScraperOrchestrator {
    pub fn new(inter_source_delay: Duration) -> Self {
        Self {
            scrapers: Vec::new(),
            inter_source_delay,
        }
    }

    /// Register a source; a later registration with the same id replaces it.
    pub fn register(mut self, scraper: Arc<dyn JobScraper>) -> Self {
        self.scrapers.retain(|s| s.source_id() != scraper.source_id());
        self.scrapers.push(scraper);
        self
    }

    pub fn has_source(&self, source_id: &str) -> bool {
        self.find(source_id).is_some()
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.scrapers.iter().map(|s| s.source_id().to_string()).collect()
    }

    fn find(&self, source_id: &str) -> Option<&Arc<dyn JobScraper>> {
        self.scrapers
            .iter()
            .find(|s| s.source_id().eq_ignore_ascii_case(source_id))
    }

    /// Scrape `source_ids` in order, isolating failures, then dedup the
    /// combined list by `title+company` (first occurrence wins).
    pub async fn orchestrate(&self, source_ids: &[String], config: &ScrapeConfig) -> OrchestrationResult {
        tracing::info!("🕸️ Scraping {} source(s) for '{}' in '{}'",
            source_ids.len(), config.keywords, config.location);

        let mut results = Vec::with_capacity(source_ids.len());

        for (i, source_id) in source_ids.iter().enumerate() {
            if i > 0 && !self.inter_source_delay.is_zero() {
                tracing::debug!("⏳ Rate limit pause {:?} before '{}'", self.inter_source_delay, source_id);
                tokio::time::sleep(self.inter_source_delay).await;
            }

            let started = std::time::Instant::now();
            let outcome = match self.find(source_id) {
                Some(scraper) => {
                    // config.timeout bounds each request; the source gets room for its retries
                    let deadline = scraper.deadline(config.timeout);
                    match tokio::time::timeout(deadline, scraper.scrape(config)).await {
                        Ok(result) => result,
                        Err(_) => Err(ScrapeError::Timeout(deadline)),
                    }
                }
                None => Err(ScrapeError::UnknownSource(source_id.clone())),
            };

            let result = match outcome {
                Ok(result) => {
                    tracing::info!("✅ Source '{}' returned {} job(s) in {:?}",
                        source_id, result.jobs.len(), started.elapsed());
                    result
                }
                Err(e) => {
                    tracing::warn!("⚠️ Source '{}' failed, continuing with remaining sources: {}", source_id, e);
                    ScraperResult::failed(source_id, e.to_string(), started.elapsed())
                }
            };
            results.push(result);
        }

        let combined: Vec<JobRecord> = results.iter().flat_map(|r| r.jobs.iter().cloned()).collect();
        let before = combined.len();
        let jobs = dedup_jobs(combined);

        tracing::info!("📦 Orchestration finished: {} job(s), {} after dedup", before, jobs.len());

        OrchestrationResult { jobs, results }
    }
}

/// Drop later records whose case-insensitive `title+company` key was already seen.
pub fn dedup_jobs(jobs: Vec<JobRecord>) -> Vec<JobRecord> {
    let mut seen = HashSet::new();
    jobs.into_iter()
        .filter(|job| seen.insert(job.dedup_key()))
        .collect()
}
