//! Resource descriptors and upstream payload validation.
//!
//! Each [`Resource`] knows its cache key, its upstream request, its freshness
//! window and how to turn the provider's raw body into the normalized `data`
//! returned to clients. Validation is deliberately minimal: just enough to
//! refuse caching a body that is obviously not what was asked for.

use std::collections::HashMap;
use std::num::{IntErrorKind, ParseIntError};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use coinpulse_upstream::{ResourceKey, UpstreamRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::endpoints::ProviderEndpoints;
use crate::cache::{CachePolicy, CacheStatus};
use crate::errors::Result;

pub const SOURCE_COINGECKO: &str = "coingecko";
pub const SOURCE_CRYPTOCOMPARE: &str = "cryptocompare";
pub const SOURCE_FEAR_GREED: &str = "alternative.me";

/// Key segment used for news requests without a category filter.
pub const ALL_CATEGORIES: &str = "all";

/// A logical upstream resource the service can serve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    Price {
        coin: String,
        vs: String,
    },
    History {
        coin: String,
        vs: String,
        days: u32,
    },
    /// `categories` is sorted and upper-cased; empty means all categories.
    News {
        categories: Vec<String>,
    },
    Sentiment,
}

impl Resource {
    pub fn resource_key(&self) -> Result<ResourceKey> {
        let key = match self {
            Resource::Price { coin, vs } => {
                ResourceKey::from_segments(&["price", coin.as_str(), vs.as_str()])?
            }
            Resource::History { coin, vs, days } => ResourceKey::from_segments(&[
                "history",
                coin.as_str(),
                vs.as_str(),
                days.to_string().as_str(),
            ])?,
            Resource::News { categories } => {
                ResourceKey::from_segments(&["news", categories_segment(categories).as_str()])?
            }
            Resource::Sentiment => ResourceKey::new("sentiment:fear-greed")?,
        };
        Ok(key)
    }

    /// Name of the provider serving this resource, recorded on cache entries.
    pub fn source(&self) -> &'static str {
        match self {
            Resource::Price { .. } | Resource::History { .. } => SOURCE_COINGECKO,
            Resource::News { .. } => SOURCE_CRYPTOCOMPARE,
            Resource::Sentiment => SOURCE_FEAR_GREED,
        }
    }

    pub fn ttl(&self, policy: &CachePolicy) -> Duration {
        match self {
            Resource::Price { .. } => policy.price_ttl,
            Resource::History { .. } => policy.history_ttl,
            Resource::News { .. } => policy.news_ttl,
            Resource::Sentiment => policy.sentiment_ttl,
        }
    }

    pub fn request(&self, endpoints: &ProviderEndpoints) -> Result<UpstreamRequest> {
        let key = self.resource_key()?;
        match self {
            Resource::Price { coin, vs } => endpoints.coingecko_price(key, coin, vs),
            Resource::History { coin, vs, days } => {
                endpoints.coingecko_market_chart(key, coin, vs, *days)
            }
            Resource::News { categories } => endpoints.cryptocompare_news(key, categories),
            Resource::Sentiment => endpoints.fear_greed(key),
        }
    }

    /// Validate the provider body and normalize it into client-facing `data`.
    ///
    /// The error string describes what was wrong with the payload.
    pub fn parse_payload(&self, body: &str) -> std::result::Result<Value, String> {
        match self {
            Resource::Price { coin, vs } => parse_price(body, coin, vs),
            Resource::History { coin, vs, days } => parse_history(body, coin, vs, *days),
            Resource::News { categories } => parse_news(body, categories),
            Resource::Sentiment => parse_sentiment(body),
        }
    }
}

fn categories_segment(categories: &[String]) -> String {
    if categories.is_empty() {
        ALL_CATEGORIES.to_string()
    } else {
        categories.join(",")
    }
}

fn to_value<T: Serialize>(data: &T) -> std::result::Result<Value, String> {
    serde_json::to_value(data).map_err(|e| e.to_string())
}

// =============================================================================
// Price
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PriceData<'a> {
    coin: &'a str,
    vs: &'a str,
    price: Decimal,
}

fn parse_price(body: &str, coin: &str, vs: &str) -> std::result::Result<Value, String> {
    let quotes: HashMap<String, HashMap<String, Decimal>> =
        serde_json::from_str(body).map_err(|e| format!("unexpected price payload: {}", e))?;

    let price = quotes
        .get(coin)
        .and_then(|by_currency| by_currency.get(vs))
        .copied()
        .ok_or_else(|| format!("no {} price for {}", vs, coin))?;

    if price <= Decimal::ZERO {
        return Err(format!("non-positive price {} for {}", price, coin));
    }

    to_value(&PriceData { coin, vs, price })
}

// =============================================================================
// History
// =============================================================================

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(i64, Decimal)>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPoint {
    timestamp: i64,
    price: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryData<'a> {
    coin: &'a str,
    vs: &'a str,
    days: u32,
    points: Vec<HistoryPoint>,
}

fn parse_history(body: &str, coin: &str, vs: &str, days: u32) -> std::result::Result<Value, String> {
    let chart: MarketChart =
        serde_json::from_str(body).map_err(|e| format!("unexpected market chart payload: {}", e))?;

    if chart.prices.is_empty() {
        return Err(format!("empty price series for {}", coin));
    }
    if let Some((timestamp, price)) = chart.prices.iter().find(|(_, p)| *p < Decimal::ZERO) {
        return Err(format!("negative price {} at {}", price, timestamp));
    }

    let points = chart
        .prices
        .into_iter()
        .map(|(timestamp, price)| HistoryPoint { timestamp, price })
        .collect();

    to_value(&HistoryData {
        coin,
        vs,
        days,
        points,
    })
}

// =============================================================================
// News
// =============================================================================

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(rename = "Data")]
    data: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    #[serde(default)]
    id: Option<String>,
    title: String,
    url: String,
    #[serde(default)]
    source: String,
    published_on: i64,
    #[serde(default)]
    categories: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    id: Option<String>,
    title: String,
    url: String,
    source: String,
    published_at: DateTime<Utc>,
    categories: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewsData<'a> {
    categories: &'a [String],
    articles: Vec<Article>,
}

fn parse_news(body: &str, categories: &[String]) -> std::result::Result<Value, String> {
    let response: NewsResponse =
        serde_json::from_str(body).map_err(|e| format!("unexpected news payload: {}", e))?;

    let articles = response
        .data
        .into_iter()
        .map(|raw| {
            let published_at = Utc
                .timestamp_opt(raw.published_on, 0)
                .single()
                .ok_or_else(|| format!("invalid publish time {}", raw.published_on))?;
            Ok(Article {
                id: raw.id,
                title: raw.title,
                url: raw.url,
                source: raw.source,
                published_at,
                categories: raw
                    .categories
                    .split('|')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect(),
            })
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;

    to_value(&NewsData {
        categories,
        articles,
    })
}

// =============================================================================
// Sentiment
// =============================================================================

#[derive(Debug, Deserialize)]
struct FearGreedResponse {
    data: Vec<FearGreedReading>,
}

#[derive(Debug, Deserialize)]
struct FearGreedReading {
    value: String,
    value_classification: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SentimentData {
    value: u8,
    classification: String,
    timestamp: DateTime<Utc>,
}

fn parse_sentiment(body: &str) -> std::result::Result<Value, String> {
    let response: FearGreedResponse =
        serde_json::from_str(body).map_err(|e| format!("unexpected sentiment payload: {}", e))?;

    let reading = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| "no sentiment reading".to_string())?;

    let raw_value = reading.value.trim();
    let value: u8 = raw_value.parse().map_err(|e: ParseIntError| match e.kind() {
        IntErrorKind::PosOverflow => format!("index value {} out of range", raw_value),
        _ => format!("non-numeric index value '{}'", reading.value),
    })?;
    if value > 100 {
        return Err(format!("index value {} out of range", value));
    }

    let seconds: i64 = reading
        .timestamp
        .trim()
        .parse()
        .map_err(|_| format!("invalid timestamp '{}'", reading.timestamp))?;
    let timestamp = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| format!("invalid timestamp '{}'", reading.timestamp))?;

    to_value(&SentimentData {
        value,
        classification: reading.value_classification,
        timestamp,
    })
}

// =============================================================================
// Served
// =============================================================================

/// A resource as returned to the client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Served {
    pub data: Value,
    pub source: String,
    #[serde(rename = "timestamp")]
    pub fetched_at: DateTime<Utc>,
    pub cache_status: CacheStatus,
}
