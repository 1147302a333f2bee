use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Tunables for the matching pipeline and its background tasks.
#[derive(Debug, Clone)]
pub struct MatchingSettings {
    pub search_ttl: Duration,
    pub default_proximity_km: f64,
    pub decision_timeout: Duration,
    pub sweep_interval: Duration,
    pub poll_interval: Duration,
    pub poll_batch_size: i64,
    pub poll_lookback: Duration,
    pub retention: Duration,
    /// Timeout for account, venue and notifier calls.
    pub collaborator_timeout: Duration,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            search_ttl: Duration::from_secs(20),
            default_proximity_km: 2.0,
            decision_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(2),
            poll_interval: Duration::from_secs(10),
            poll_batch_size: 5,
            poll_lookback: Duration::from_secs(300),
            retention: Duration::from_secs(3600),
            collaborator_timeout: Duration::from_secs(10),
        }
    }
}

impl MatchingSettings {
    pub fn search_ttl(&self) -> chrono::Duration {
        to_chrono(self.search_ttl)
    }

    pub fn decision_timeout(&self) -> chrono::Duration {
        to_chrono(self.decision_timeout)
    }

    pub fn retention(&self) -> chrono::Duration {
        to_chrono(self.retention)
    }
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Unset runs on the in-memory store.
    pub database_url: Option<String>,
    /// Unset disables JetStream; the poller drives background matching.
    pub nats_url: Option<String>,
    pub port: u16,
    pub account_service_url: Option<String>,
    pub venue_service_url: Option<String>,
    pub matching: MatchingSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = MatchingSettings::default();

        let matching = MatchingSettings {
            search_ttl: secs_var("SEARCH_TTL_SECS", defaults.search_ttl)?,
            default_proximity_km: parsed_var("DEFAULT_PROXIMITY_KM", defaults.default_proximity_km)?,
            decision_timeout: secs_var("DECISION_TIMEOUT_SECS", defaults.decision_timeout)?,
            sweep_interval: secs_var("SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            poll_interval: secs_var("POLL_INTERVAL_SECS", defaults.poll_interval)?,
            poll_batch_size: parsed_var("POLL_BATCH_SIZE", defaults.poll_batch_size)?,
            poll_lookback: secs_var("POLL_LOOKBACK_SECS", defaults.poll_lookback)?,
            retention: secs_var("RETENTION_SECS", defaults.retention)?,
            collaborator_timeout: secs_var(
                "COLLABORATOR_TIMEOUT_SECS",
                defaults.collaborator_timeout,
            )?,
        };

        Ok(Self {
            database_url: optional_var("DATABASE_URL"),
            nats_url: optional_var("NATS_URL"),
            port: parsed_var("PORT", 8080)?,
            account_service_url: optional_var("ACCOUNT_SERVICE_URL"),
            venue_service_url: optional_var("VENUE_SERVICE_URL"),
            matching,
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", name)),
        None => Ok(default),
    }
}

fn secs_var(name: &str, default: Duration) -> Result<Duration> {
    parsed_var(name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = MatchingSettings::default();
        assert_eq!(settings.search_ttl(), chrono::Duration::seconds(20));
        assert_eq!(settings.decision_timeout(), chrono::Duration::seconds(30));
        assert_eq!(settings.default_proximity_km, 2.0);
        assert_eq!(settings.poll_batch_size, 5);
        assert_eq!(settings.retention(), chrono::Duration::hours(1));
    }
}
