use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::MergeStrategy;
use crate::providers::RetryPolicy;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/statline.sqlite3";
pub const DEFAULT_NBA_BASE: &str = "https://api.balldontlie.io/v1";
pub const DEFAULT_MLB_BASE: &str = "https://statsapi.mlb.com/api/v1";
pub const DEFAULT_NHL_BASE: &str = "https://statsapi.web.nhl.com/api/v1";

/// Runtime settings, read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub nba_base_url: String,
    pub mlb_base_url: String,
    pub nhl_base_url: String,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub page_size: u32,
    pub page_delay: Duration,
    pub merge_strategy: MergeStrategy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            nba_base_url: DEFAULT_NBA_BASE.to_string(),
            mlb_base_url: DEFAULT_MLB_BASE.to_string(),
            nhl_base_url: DEFAULT_NHL_BASE.to_string(),
            http_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            page_size: 100,
            page_delay: Duration::from_millis(200),
            merge_strategy: MergeStrategy::FirstWriteWins,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            nba_base_url: env::var("NBA_API_BASE").unwrap_or(defaults.nba_base_url),
            mlb_base_url: env::var("MLB_API_BASE").unwrap_or(defaults.mlb_base_url),
            nhl_base_url: env::var("NHL_API_BASE").unwrap_or(defaults.nhl_base_url),
            http_timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECS", 15u64)?),
            retry: RetryPolicy {
                max_attempts: parse_var("HTTP_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                backoff_factor: Duration::from_millis(parse_var("HTTP_BACKOFF_FACTOR_MS", 800u64)?),
            },
            page_size: parse_var("PAGE_SIZE", defaults.page_size)?,
            page_delay: Duration::from_millis(parse_var("PAGE_DELAY_MS", 200u64)?),
            merge_strategy: parse_var("MERGE_STRATEGY", defaults.merge_strategy)?,
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
