use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use coinpulse_core::cache::CachePolicy;
use coinpulse_core::resources::{
    ProviderEndpoints, DEFAULT_COINGECKO_BASE_URL, DEFAULT_CRYPTOCOMPARE_BASE_URL,
    DEFAULT_FEAR_GREED_BASE_URL,
};
use coinpulse_upstream::RetryPolicy;

/// Where cached responses and cooldowns are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    /// Lost on restart. Useful for local runs and tests.
    Memory,
}

pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    pub storage: StorageBackend,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub static_dir: String,
    pub admin_token: Option<String>,
    pub tracked_coins: Vec<String>,
    pub vs_currencies: Vec<String>,
    pub history_days: Vec<u32>,
    pub news_categories: Vec<String>,
    pub retired_sources: Vec<String>,
    pub endpoints: ProviderEndpoints,
    pub retry_policy: RetryPolicy,
    pub cache_policy: CachePolicy,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let listen_addr: SocketAddr = env_or("CP_LISTEN_ADDR", "0.0.0.0:8080")
            .parse()
            .context("Invalid CP_LISTEN_ADDR")?;
        let db_path = env_or("CP_DB_PATH", "./db/coinpulse.db");
        let storage = match env_or("CP_STORAGE", "sqlite").to_ascii_lowercase().as_str() {
            "sqlite" => StorageBackend::Sqlite,
            "memory" => StorageBackend::Memory,
            other => anyhow::bail!("Invalid CP_STORAGE '{}': expected sqlite or memory", other),
        };
        let static_dir = env_or("CP_STATIC_DIR", "dist");
        let admin_token = std::env::var("CP_ADMIN_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let history_days = list("CP_HISTORY_DAYS", "1,7,30")
            .iter()
            .map(|d| d.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid CP_HISTORY_DAYS")?;

        let endpoints = ProviderEndpoints {
            coingecko_base_url: env_or("CP_COINGECKO_BASE_URL", DEFAULT_COINGECKO_BASE_URL),
            cryptocompare_base_url: env_or(
                "CP_CRYPTOCOMPARE_BASE_URL",
                DEFAULT_CRYPTOCOMPARE_BASE_URL,
            ),
            fear_greed_base_url: env_or("CP_FEAR_GREED_BASE_URL", DEFAULT_FEAR_GREED_BASE_URL),
            coingecko_api_key: optional("CP_COINGECKO_API_KEY"),
            cryptocompare_api_key: optional("CP_CRYPTOCOMPARE_API_KEY"),
        };

        let defaults = RetryPolicy::default();
        let retry_policy = defaults
            .clone()
            .with_max_attempts(parse_or("CP_MAX_ATTEMPTS", defaults.max_attempts)?)
            .with_attempt_timeout(Duration::from_millis(parse_or(
                "CP_ATTEMPT_TIMEOUT_MS",
                8000u64,
            )?));
        let request_timeout = Duration::from_millis(parse_or(
            "CP_REQUEST_TIMEOUT_MS",
            default_request_timeout(&retry_policy).as_millis() as u64,
        )?);

        let cache_defaults = CachePolicy::default();
        let cache_policy = CachePolicy {
            price_ttl: secs_or("CP_PRICE_TTL_SECS", cache_defaults.price_ttl)?,
            history_ttl: secs_or("CP_HISTORY_TTL_SECS", cache_defaults.history_ttl)?,
            news_ttl: secs_or("CP_NEWS_TTL_SECS", cache_defaults.news_ttl)?,
            sentiment_ttl: secs_or("CP_SENTIMENT_TTL_SECS", cache_defaults.sentiment_ttl)?,
            stale_retention: cache_defaults.stale_retention,
        };

        Ok(Self {
            listen_addr,
            db_path,
            storage,
            cors_allow: list("CP_CORS_ALLOW_ORIGINS", "*"),
            request_timeout,
            static_dir,
            admin_token,
            tracked_coins: list("CP_TRACKED_COINS", "bitcoin,ethereum"),
            vs_currencies: list("CP_VS_CURRENCIES", "usd"),
            history_days,
            news_categories: list("CP_NEWS_CATEGORIES", ""),
            retired_sources: list("CP_RETIRED_SOURCES", "coincap"),
            endpoints,
            retry_policy,
            cache_policy,
        })
    }
}

/// Headroom on top of the slowest fetch before the HTTP layer gives up.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// A request that outlives the retry policy's worst case is cut by the HTTP
/// layer instead of ending with a coordinator error, so the default covers it.
fn default_request_timeout(policy: &RetryPolicy) -> Duration {
    policy.worst_case_latency() + REQUEST_TIMEOUT_MARGIN
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn list(name: &str, default: &str) -> Vec<String> {
    env_or(name, default)
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

fn secs_or(name: &str, default: Duration) -> anyhow::Result<Duration> {
    parse_or(name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_request_timeout_outlasts_retries() {
        let policy = RetryPolicy::default();
        assert!(default_request_timeout(&policy) > policy.worst_case_latency());

        let slow = RetryPolicy::default()
            .with_max_attempts(6)
            .with_attempt_timeout(Duration::from_secs(20));
        assert!(default_request_timeout(&slow) > slow.worst_case_latency());
        assert!(default_request_timeout(&slow) > default_request_timeout(&policy));
    }
}
