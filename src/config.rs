use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::guard::rate_limit::RateLimitConfig;
use crate::guard::FailurePolicy;
use crate::processor::ProcessorConfig;

pub mod assets;

pub const DEFAULT_ALLOWED_ASSETS: &str = "USD,EUR,GBP,USDC";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub idempotency_ttl: Duration,
    pub idempotency_failure_policy: FailurePolicy,
    pub rate_limit: RateLimitConfig,
    pub rate_limit_failure_policy: FailurePolicy,
    pub allowed_assets: Vec<String>,
    /// How often the asset allow-list is re-read; `None` disables refresh.
    pub assets_refresh: Option<Duration>,
    pub trusted_proxy_depth: usize,
    pub processor: ProcessorConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        let processor_base_url = match env::var("PROCESSOR_BASE_URL").ok() {
            Some(raw) => Some(
                Url::parse(&raw).with_context(|| format!("PROCESSOR_BASE_URL is not a URL: {}", raw))?,
            ),
            None => None,
        };

        Ok(Config {
            server_port: parse_var("SERVER_PORT", 3000)?,
            database_url: env::var("DATABASE_URL").ok(),
            redis_url: env::var("REDIS_URL").ok(),
            idempotency_ttl: Duration::from_secs(parse_var("IDEMPOTENCY_TTL_SECS", 600)?),
            idempotency_failure_policy: parse_var(
                "IDEMPOTENCY_FAILURE_POLICY",
                FailurePolicy::FailOpen,
            )?,
            rate_limit: RateLimitConfig {
                max_requests: parse_var("RATE_LIMIT_MAX", 100)?,
                window: Duration::from_millis(parse_var("RATE_LIMIT_WINDOW_MS", 60_000)?),
            },
            rate_limit_failure_policy: parse_var(
                "RATE_LIMIT_FAILURE_POLICY",
                FailurePolicy::FailOpen,
            )?,
            allowed_assets: parse_list(
                &env::var("ALLOWED_ASSETS").unwrap_or_else(|_| DEFAULT_ALLOWED_ASSETS.to_string()),
            )?,
            assets_refresh: match parse_var("ASSETS_REFRESH_SECS", 30u64)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            trusted_proxy_depth: parse_var("TRUSTED_PROXY_DEPTH", 1)?,
            processor: ProcessorConfig {
                base_url: processor_base_url,
                api_key: env::var("PROCESSOR_API_KEY").ok(),
                timeout: Duration::from_millis(parse_var("PROCESSOR_TIMEOUT_MS", 10_000)?),
            },
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

/// Current `ALLOWED_ASSETS` setting. The `.env` file wins over the process
/// environment, since it is the only source that can change while running.
pub fn allowed_assets_setting() -> Result<Vec<String>> {
    let from_file = match dotenvy::dotenv_iter() {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .find(|(name, _)| name == "ALLOWED_ASSETS")
            .map(|(_, value)| value),
        Err(_) => None,
    };

    let raw = from_file
        .or_else(|| env::var("ALLOWED_ASSETS").ok())
        .unwrap_or_else(|| DEFAULT_ALLOWED_ASSETS.to_string());
    parse_list(&raw)
}

fn parse_list(raw: &str) -> Result<Vec<String>> {
    let codes: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect();

    if codes.is_empty() {
        anyhow::bail!("ALLOWED_ASSETS must list at least one asset code");
    }

    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_asset_list() {
        assert_eq!(
            parse_list(" USD, EUR ,,GBP ").unwrap(),
            vec!["USD".to_string(), "EUR".to_string(), "GBP".to_string()]
        );
        assert!(parse_list(" , ").is_err());
    }

    #[test]
    fn unset_variable_falls_back_to_default() {
        let port: u16 = parse_var("TREASURY_TEST_UNSET_VARIABLE", 3000).unwrap();
        assert_eq!(port, 3000);
    }
}
