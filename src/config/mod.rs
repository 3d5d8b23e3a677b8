/// Configuration management for the jobflow engine
///
/// Handles server binding, storage location, scraper tuning, notification
/// delivery and scheduler startup. Every value can be overridden through a
/// `JOBFLOW_*` environment variable.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::runtime::executor::ExecutorSettings;
use crate::scraper::RetryPolicy;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    pub scraper: ScraperConfig,
    pub notify: NotifyConfig,
    pub scheduler: SchedulerConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding `jobflow.db` (default: "data")
    pub data_dir: String,
}

/// Source fetching and normalization knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub timeout_secs: u64,
    /// Pause between two sources in one orchestration
    pub source_delay_ms: u64,
    /// Max records a single source node may add
    pub source_cap: usize,
    pub retry_attempts: u32,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub retry_multiplier: f64,
    /// Descriptions are truncated to this many characters
    pub max_description: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Digest endpoint; digests are only logged when unset
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub autostart: bool,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("JOBFLOW_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("JOBFLOW_PORT", 3004),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("JOBFLOW_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            },
            scraper: ScraperConfig {
                timeout_secs: env_or("JOBFLOW_SCRAPE_TIMEOUT_SECS", 30),
                source_delay_ms: env_or("JOBFLOW_SOURCE_DELAY_MS", 2000),
                source_cap: env_or("JOBFLOW_SOURCE_CAP", 50),
                retry_attempts: env_or("JOBFLOW_RETRY_ATTEMPTS", 3),
                retry_initial_ms: env_or("JOBFLOW_RETRY_INITIAL_MS", 1000),
                retry_max_ms: env_or("JOBFLOW_RETRY_MAX_MS", 10_000),
                retry_multiplier: env_or("JOBFLOW_RETRY_MULTIPLIER", 2.0),
                max_description: env_or("JOBFLOW_MAX_DESCRIPTION", 1000),
            },
            notify: NotifyConfig {
                webhook_url: std::env::var("JOBFLOW_NOTIFY_WEBHOOK")
                    .ok()
                    .filter(|url| !url.trim().is_empty()),
            },
            scheduler: SchedulerConfig {
                autostart: env_or("JOBFLOW_SCHEDULER_AUTOSTART", true),
            },
        }
    }
}

impl ScraperConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry_initial_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
            backoff_multiplier: self.retry_multiplier,
        }
    }

    pub fn source_delay(&self) -> Duration {
        Duration::from_millis(self.source_delay_ms)
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            source_cap: self.source_cap,
            scrape_timeout: Duration::from_secs(self.timeout_secs),
            max_description: self.max_description,
        }
    }
}

/// Parse an env var, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("⚠️ Ignoring invalid {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        std::env::set_var("JOBFLOW_TEST_PORT", "not-a-port");
        assert_eq!(env_or("JOBFLOW_TEST_PORT", 3004u16), 3004);

        std::env::set_var("JOBFLOW_TEST_PORT", " 8080 ");
        assert_eq!(env_or("JOBFLOW_TEST_PORT", 3004u16), 8080);

        assert!(env_or("JOBFLOW_TEST_UNSET_FLAG", true));
    }

    #[test]
    fn scraper_settings_derive_runtime_values() {
        let scraper = ScraperConfig {
            timeout_secs: 5,
            source_delay_ms: 250,
            source_cap: 10,
            retry_attempts: 0,
            retry_initial_ms: 100,
            retry_max_ms: 400,
            retry_multiplier: 3.0,
            max_description: 200,
        };

        let retry = scraper.retry_policy();
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.max_delay, Duration::from_millis(400));
        assert_eq!(scraper.source_delay(), Duration::from_millis(250));

        let settings = scraper.executor_settings();
        assert_eq!(settings.source_cap, 10);
        assert_eq!(settings.scrape_timeout, Duration::from_secs(5));
    }
}
