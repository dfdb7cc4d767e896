//! Service configuration loaded from environment variables.
//!
//! All settings come from the environment (or a `.env` file via `dotenvy`).
//! Only the database URL and the API token are required.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::tag::validate_tag;
use crate::services::coc_api::{CocApiConfig, DEFAULT_BASE_URL};
use crate::services::job_runs::intervals;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub database_url: String,
    pub api_token: String,
    pub api_base_url: String,
    /// Normalized clan tags, one war pipeline each.
    pub clan_tags: Vec<String>,
    pub war_check_interval: Duration,
    pub building_check_interval: Duration,
    pub failure_backoff: Duration,
    pub upstream_timeout: Duration,
    pub upstream_max_retries: u32,
    pub donation_snapshot_interval_secs: i64,
    pub league_group_cache_ttl: Duration,
    pub event_bus_capacity: usize,
    pub listen_addr: SocketAddr,
}

impl WatchConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key -> value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let database_url = required("DATABASE_URL")?;
        let api_token = required("COC_API_TOKEN")?;
        let api_base_url = lookup("COC_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let clan_tags = parse_clan_tags(lookup("CLAN_TAGS").as_deref().unwrap_or(""))?;

        let listen_addr: SocketAddr =
            parse_or(&lookup, "LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        Ok(Self {
            database_url,
            api_token,
            api_base_url,
            clan_tags,
            war_check_interval: nonzero_secs(&lookup, "WAR_CHECK_INTERVAL_SECS", intervals::WAR_ARCHIVER)?,
            building_check_interval: nonzero_secs(
                &lookup,
                "BUILDING_CHECK_INTERVAL_SECS",
                intervals::BUILDING_MONITOR,
            )?,
            failure_backoff: secs(parse_or(&lookup, "FAILURE_BACKOFF_SECS", intervals::FAILURE_BACKOFF)?),
            upstream_timeout: secs(parse_or(&lookup, "UPSTREAM_TIMEOUT_SECS", 30)?),
            upstream_max_retries: parse_or(&lookup, "UPSTREAM_MAX_RETRIES", 3)?,
            donation_snapshot_interval_secs: parse_or(
                &lookup,
                "DONATION_SNAPSHOT_INTERVAL_SECS",
                intervals::DONATION_SNAPSHOT,
            )?,
            league_group_cache_ttl: secs(parse_or(&lookup, "LEAGUE_GROUP_CACHE_SECS", 300)?),
            event_bus_capacity: parse_or(&lookup, "EVENT_BUS_CAPACITY", 1024)?,
            listen_addr,
        })
    }

    pub fn coc_api_config(&self) -> CocApiConfig {
        CocApiConfig {
            api_token: self.api_token.clone(),
            base_url: self.api_base_url.clone(),
            timeout: self.upstream_timeout,
            max_retries: self.upstream_max_retries,
            league_group_ttl: self.league_group_cache_ttl,
            ..CocApiConfig::new(self.api_token.clone())
        }
    }
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

/// Tick periods must be at least one second.
fn nonzero_secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        value => Ok(secs(value)),
    }
}

/// Parses a variable as `T`, returning `default` when unset.
fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: format!("'{}': {}", raw, e),
        }),
    }
}

fn parse_clan_tags(raw: &str) -> Result<Vec<String>, ConfigError> {
    let mut tags = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let tag = validate_tag(part).map_err(|reason| ConfigError::Invalid {
            key: "CLAN_TAGS",
            reason,
        })?;
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WatchConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/clanwatch"),
            ("COC_API_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
        assert!(config.clan_tags.is_empty());
        assert_eq!(config.war_check_interval, Duration::from_secs(900));
        assert_eq!(config.building_check_interval, Duration::from_secs(90));
        assert_eq!(config.failure_backoff, Duration::from_secs(60));
        assert_eq!(config.upstream_max_retries, 3);
        assert_eq!(config.donation_snapshot_interval_secs, 21600);
        assert_eq!(config.event_bus_capacity, 1024);
        assert_eq!(config.listen_addr.port(), 3000);
    }

    #[test]
    fn test_missing_token() {
        let err = WatchConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("COC_API_TOKEN")));
    }

    #[test]
    fn test_clan_tags_are_normalized_and_deduplicated() {
        let config = WatchConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("COC_API_TOKEN", "secret"),
            ("CLAN_TAGS", " 2ppyqovu , #2PPYQ0VU,#9Q8RLLJ2 "),
        ]))
        .unwrap();
        assert_eq!(config.clan_tags, vec!["#2PPYQ0VU", "#9Q8RLLJ2"]);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = WatchConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("COC_API_TOKEN", "secret"),
            ("CLAN_TAGS", "#ABC"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CLAN_TAGS", .. }));

        let err = WatchConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("COC_API_TOKEN", "secret"),
            ("WAR_CHECK_INTERVAL_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WAR_CHECK_INTERVAL_SECS", .. }));
    }

    #[test]
    fn test_zero_tick_interval_is_rejected() {
        for key in ["WAR_CHECK_INTERVAL_SECS", "BUILDING_CHECK_INTERVAL_SECS"] {
            let err = WatchConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://x"),
                ("COC_API_TOKEN", "secret"),
                (key, "0"),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: k, .. } if k == key));
        }
    }
}
