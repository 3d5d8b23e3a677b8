/// Job list normalization
///
/// Collapses whitespace, truncates descriptions, optionally drops duplicate
/// `title+company` records, and re-sorts newest first. Applying it twice gives
/// the same list as applying it once.

use std::cmp::Reverse;

use crate::scraper::{orchestrator::dedup_jobs, JobRecord};

const ELLIPSIS: &str = "...";

/// Normalize `jobs` in place.
pub fn normalize_jobs(jobs: &mut Vec<JobRecord>, dedupe: bool, max_description: usize) {
    for job in jobs.iter_mut() {
        normalize_record(job, max_description);
    }

    if dedupe {
        let taken = std::mem::take(jobs);
        *jobs = dedup_jobs(taken);
    }

    // Stable: equal dates keep their relative order; undated jobs sink to the end
    jobs.sort_by_key(|job| Reverse(job.posted_at));
}

fn normalize_record(job: &mut JobRecord, max_description: usize) {
    job.title = collapse_whitespace(&job.title);
    job.company = collapse_whitespace(&job.company);
    job.location = collapse_whitespace(&job.location);
    job.description = truncate(&collapse_whitespace(&job.description), max_description);
    job.salary = job
        .salary
        .as_deref()
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty());
    job.refresh_uid();
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most `max` characters, marking cut text with a trailing ellipsis.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let head: String = text.chars().take(keep).collect();
    format!("{}{}", head.trim_end(), ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn job(title: &str, company: &str, days_old: Option<i64>) -> JobRecord {
        let mut record = JobRecord::new(title, company, " Remote ", "https://jobs.example", "linkedin");
        record.posted_at = days_old.map(|d| Utc::now() - Duration::days(d));
        record
    }

    #[test]
    fn whitespace_is_collapsed_and_uid_recomputed() {
        let mut jobs = vec![job("  Senior   Rust\nEngineer ", "Acme   Inc", Some(1))];
        let before = jobs[0].uid.clone();
        normalize_jobs(&mut jobs, true, 1000);

        assert_eq!(jobs[0].title, "Senior Rust Engineer");
        assert_eq!(jobs[0].company, "Acme Inc");
        assert_eq!(jobs[0].location, "Remote");
        assert_ne!(jobs[0].uid, before);
    }

    #[test]
    fn long_descriptions_are_truncated() {
        let mut jobs = vec![job("Engineer", "Acme", None)];
        jobs[0].description = "word ".repeat(100);
        normalize_jobs(&mut jobs, false, 20);

        assert!(jobs[0].description.chars().count() <= 20);
        assert!(jobs[0].description.ends_with("..."));
    }

    #[test]
    fn dedup_and_sort_by_date_descending() {
        let mut jobs = vec![
            job("Old", "Acme", Some(10)),
            job("Undated", "Acme", None),
            job("New", "Acme", Some(1)),
            job("new", "ACME", Some(0)),
        ];
        normalize_jobs(&mut jobs, true, 1000);

        let titles: Vec<_> = jobs.iter().map(|j| j.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Old", "Undated"]);
    }

    #[test]
    fn duplicates_survive_when_dedupe_is_off() {
        let mut jobs = vec![job("Engineer", "Acme", Some(1)), job("engineer", "acme", Some(2))];
        normalize_jobs(&mut jobs, false, 1000);
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let mut once = vec![
            job(" Backend  Engineer", "Acme", Some(2)),
            job("backend engineer ", "acme", Some(1)),
            job("Designer", "Globex", None),
            job("Data Engineer", "Initech", Some(5)),
        ];
        once[2].description = "x ".repeat(700);
        normalize_jobs(&mut once, true, 1000);

        let mut twice = once.clone();
        normalize_jobs(&mut twice, true, 1000);
        assert_eq!(once, twice);
    }
}
