//! Structured filter criteria for `filter` nodes.
//!
//! Each configured rule has the form `"Label: v1, v2, ..."`. Rules are parsed
//! once, when the workflow definition is deserialized, into [`FilterCriteria`].
//! Values inside one field are OR-matched; fields are AND-combined.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scraper::JobRecord;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("filter '{0}' is not of the form 'Label: value, value'")]
    Malformed(String),
    #[error("filter '{0}' has no values")]
    EmptyValues(String),
    #[error("unknown filter label '{0}'")]
    UnknownLabel(String),
    #[error("invalid value '{value}' for filter '{label}'")]
    InvalidValue { label: String, value: String },
}

/// Experience bucket derived from fixed keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Entry,
    Mid,
    Senior,
    Any,
}

static SENIOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(senior|sr\.?|lead|principal|staff)\b").expect("valid regex"));
static ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(junior|jr\.?|entry|intern|internship|fresher|graduate)\b").expect("valid regex")
});
static MID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(mid|intermediate)\b").expect("valid regex"));

/// Map free text onto an experience level; senior keywords win over entry, entry over mid.
pub fn detect_experience_level(text: &str) -> ExperienceLevel {
    let text = text.to_lowercase();
    if SENIOR_RE.is_match(&text) {
        ExperienceLevel::Senior
    } else if ENTRY_RE.is_match(&text) {
        ExperienceLevel::Entry
    } else if MID_RE.is_match(&text) {
        ExperienceLevel::Mid
    } else {
        ExperienceLevel::Any
    }
}

/// Level of a job: its explicit level when recognizable, else detected from title + description.
pub fn job_experience_level(job: &JobRecord) -> ExperienceLevel {
    job.experience_level
        .as_deref()
        .map(detect_experience_level)
        .filter(|level| *level != ExperienceLevel::Any)
        .unwrap_or_else(|| detect_experience_level(&format!("{} {}", job.title, job.description)))
}

/// Strip non-digits and expand a trailing `k` (x1000), keeping a decimal part
/// (`"1.5k"` is 1500). Without `k` the decimal part is cents and dropped.
pub fn parse_salary(text: &str) -> Option<u64> {
    let lowered = text.trim().to_lowercase();
    let has_k = lowered
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .ends_with('k');

    let mut parts = lowered.splitn(2, '.');
    let integral: String = parts.next().unwrap_or_default().chars().filter(char::is_ascii_digit).collect();
    let fraction: String = parts.next().unwrap_or_default().chars().take_while(char::is_ascii_digit).collect();
    if integral.is_empty() && fraction.is_empty() {
        return None;
    }

    let whole: u64 = if integral.is_empty() { 0 } else { integral.parse().ok()? };
    if !has_k {
        return Some(whole);
    }

    let thousandths: String = fraction.chars().chain(std::iter::repeat('0')).take(3).collect();
    Some(whole.saturating_mul(1000).saturating_add(thousandths.parse().ok()?))
}

/// Lower bound of a salary range such as `"$120K - $150K"` or `"90k to 110k"`.
pub fn salary_lower_bound(text: &str) -> Option<u64> {
    let lowered = text.to_lowercase();
    let first = lowered
        .split(|c: char| c == '-' || c == '–')
        .next()
        .and_then(|part| part.split(" to ").next())
        .unwrap_or_default();
    parse_salary(first)
}

/// Recency window for the date-posted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    Day,
    Week,
    Month,
}

impl DateWindow {
    fn parse(value: &str) -> Option<Option<Self>> {
        match value.to_lowercase().as_str() {
            "24h" | "day" | "past 24 hours" | "last 24 hours" => Some(Some(Self::Day)),
            "week" | "7d" | "past week" | "last week" => Some(Some(Self::Week)),
            "month" | "30d" | "past month" | "last month" => Some(Some(Self::Month)),
            "any" | "any time" => Some(None),
            _ => None,
        }
    }

    pub fn span(&self) -> Duration {
        match self {
            Self::Day => Duration::hours(24),
            Self::Week => Duration::days(7),
            Self::Month => Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Company,
    Location,
    Salary,
    Source,
    Experience,
    DatePosted,
}

impl Field {
    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "title" | "job title" | "titles" => Some(Self::Title),
            "company" | "companies" => Some(Self::Company),
            "location" | "locations" => Some(Self::Location),
            "salary" | "minimum salary" | "min salary" => Some(Self::Salary),
            "source" | "sources" => Some(Self::Source),
            "experience" | "experience level" | "level" => Some(Self::Experience),
            "date posted" | "posted" | "date" => Some(Self::DatePosted),
            _ => None,
        }
    }
}

/// Parsed filter rules. Empty fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub titles: Vec<String>,
    pub companies: Vec<String>,
    pub locations: Vec<String>,
    pub min_salaries: Vec<u64>,
    pub sources: Vec<String>,
    pub levels: Vec<ExperienceLevel>,
    pub date_windows: Vec<DateWindow>,
    /// Rules as configured, kept for serialization
    raw: Vec<String>,
}

impl FilterCriteria {
    pub fn parse<S: AsRef<str>>(rules: &[S]) -> Result<Self, FilterParseError> {
        let mut criteria = Self::default();

        for rule in rules {
            let rule = rule.as_ref().trim();
            if rule.is_empty() {
                continue;
            }

            let (label, values) = rule
                .split_once(':')
                .ok_or_else(|| FilterParseError::Malformed(rule.to_string()))?;
            if label.trim().is_empty() {
                return Err(FilterParseError::Malformed(rule.to_string()));
            }
            let field = Field::from_label(label)
                .ok_or_else(|| FilterParseError::UnknownLabel(label.trim().to_string()))?;

            let values: Vec<&str> = values.split(',').map(str::trim).filter(|v| !v.is_empty()).collect();
            if values.is_empty() {
                return Err(FilterParseError::EmptyValues(rule.to_string()));
            }

            for value in values {
                criteria.add(field, label.trim(), value)?;
            }
            criteria.raw.push(rule.to_string());
        }

        Ok(criteria)
    }

    fn add(&mut self, field: Field, label: &str, value: &str) -> Result<(), FilterParseError> {
        let invalid = || FilterParseError::InvalidValue {
            label: label.to_string(),
            value: value.to_string(),
        };
        if value.eq_ignore_ascii_case("any") && field != Field::DatePosted {
            return Ok(());
        }

        match field {
            Field::Title => self.titles.push(value.to_lowercase()),
            Field::Company => self.companies.push(value.to_lowercase()),
            Field::Location => self.locations.push(value.to_lowercase()),
            Field::Source => self.sources.push(value.to_lowercase()),
            Field::Salary => self.min_salaries.push(parse_salary(value).ok_or_else(invalid)?),
            Field::Experience => match detect_experience_level(value) {
                ExperienceLevel::Any => return Err(invalid()),
                level => self.levels.push(level),
            },
            Field::DatePosted => {
                if let Some(window) = DateWindow::parse(value).ok_or_else(invalid)? {
                    self.date_windows.push(window);
                }
            }
        }
        Ok(())
    }

    /// Rules as originally written.
    pub fn rules(&self) -> &[String] {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
            && self.companies.is_empty()
            && self.locations.is_empty()
            && self.min_salaries.is_empty()
            && self.sources.is_empty()
            && self.levels.is_empty()
            && self.date_windows.is_empty()
    }

    /// AND across fields, OR within a field.
    pub fn matches(&self, job: &JobRecord, now: DateTime<Utc>) -> bool {
        contains_any(&self.titles, &job.title)
            && contains_any(&self.companies, &job.company)
            && contains_any(&self.locations, &job.location)
            && (self.sources.is_empty() || self.sources.contains(&job.source.to_lowercase()))
            && self.matches_salary(job)
            && (self.levels.is_empty() || self.levels.contains(&job_experience_level(job)))
            && self.matches_date(job, now)
    }

    fn matches_salary(&self, job: &JobRecord) -> bool {
        if self.min_salaries.is_empty() {
            return true;
        }
        match job.salary.as_deref().and_then(salary_lower_bound) {
            Some(salary) => self.min_salaries.iter().any(|min| salary >= *min),
            None => false,
        }
    }

    fn matches_date(&self, job: &JobRecord, now: DateTime<Utc>) -> bool {
        if self.date_windows.is_empty() {
            return true;
        }
        match job.posted_at {
            Some(posted) => self.date_windows.iter().any(|w| posted >= now - w.span()),
            None => false,
        }
    }

    /// Keep only the jobs that satisfy every configured field.
    pub fn apply(&self, jobs: Vec<JobRecord>, now: DateTime<Utc>) -> Vec<JobRecord> {
        jobs.into_iter().filter(|job| self.matches(job, now)).collect()
    }
}

fn contains_any(needles: &[String], haystack: &str) -> bool {
    if needles.is_empty() {
        return true;
    }
    let haystack = haystack.to_lowercase();
    needles.iter().any(|needle| haystack.contains(needle.as_str()))
}
