//! Provider endpoint configuration and request construction.

use coinpulse_upstream::{ResourceKey, UpstreamRequest};
use url::Url;

use crate::errors::{Error, Result};

pub const DEFAULT_COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_CRYPTOCOMPARE_BASE_URL: &str = "https://min-api.cryptocompare.com";
pub const DEFAULT_FEAR_GREED_BASE_URL: &str = "https://api.alternative.me";

/// Base URLs and credentials for the upstream providers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub coingecko_base_url: String,
    pub cryptocompare_base_url: String,
    pub fear_greed_base_url: String,
    pub coingecko_api_key: Option<String>,
    pub cryptocompare_api_key: Option<String>,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            coingecko_base_url: DEFAULT_COINGECKO_BASE_URL.to_string(),
            cryptocompare_base_url: DEFAULT_CRYPTOCOMPARE_BASE_URL.to_string(),
            fear_greed_base_url: DEFAULT_FEAR_GREED_BASE_URL.to_string(),
            coingecko_api_key: None,
            cryptocompare_api_key: None,
        }
    }
}

impl ProviderEndpoints {
    /// Check that every base URL parses.
    pub fn validate(&self) -> Result<()> {
        for base in [
            &self.coingecko_base_url,
            &self.cryptocompare_base_url,
            &self.fear_greed_base_url,
        ] {
            endpoint(base, "")?;
        }
        Ok(())
    }

    pub fn coingecko_price(&self, key: ResourceKey, coin: &str, vs: &str) -> Result<UpstreamRequest> {
        let mut url = endpoint(&self.coingecko_base_url, "/simple/price")?;
        url.query_pairs_mut()
            .append_pair("ids", coin)
            .append_pair("vs_currencies", vs);
        Ok(self.coingecko_request(key, url))
    }

    pub fn coingecko_market_chart(
        &self,
        key: ResourceKey,
        coin: &str,
        vs: &str,
        days: u32,
    ) -> Result<UpstreamRequest> {
        let mut url = endpoint(
            &self.coingecko_base_url,
            &format!("/coins/{}/market_chart", coin),
        )?;
        url.query_pairs_mut()
            .append_pair("vs_currency", vs)
            .append_pair("days", &days.to_string());
        Ok(self.coingecko_request(key, url))
    }

    pub fn cryptocompare_news(&self, key: ResourceKey, categories: &[String]) -> Result<UpstreamRequest> {
        let mut url = endpoint(&self.cryptocompare_base_url, "/data/v2/news/")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("lang", "EN");
            if !categories.is_empty() {
                query.append_pair("categories", &categories.join(","));
            }
        }

        let mut request = json_request(key, url);
        if let Some(api_key) = &self.cryptocompare_api_key {
            request = request.with_header("authorization", format!("Apikey {}", api_key));
        }
        Ok(request)
    }

    pub fn fear_greed(&self, key: ResourceKey) -> Result<UpstreamRequest> {
        let mut url = endpoint(&self.fear_greed_base_url, "/fng/")?;
        url.query_pairs_mut().append_pair("limit", "1");
        Ok(json_request(key, url))
    }

    fn coingecko_request(&self, key: ResourceKey, url: Url) -> UpstreamRequest {
        let request = json_request(key, url);
        match &self.coingecko_api_key {
            // Pro keys only work against the pro host and use their own header.
            Some(api_key) if self.coingecko_base_url.contains("pro-api") => {
                request.with_header("x-cg-pro-api-key", api_key.clone())
            }
            Some(api_key) => request.with_header("x-cg-demo-api-key", api_key.clone()),
            None => request,
        }
    }
}

fn endpoint(base: &str, path: &str) -> Result<Url> {
    let raw = format!("{}{}", base.trim_end_matches('/'), path);
    Url::parse(&raw)
        .map_err(|e| Error::InvalidConfigValue(format!("invalid provider URL '{}': {}", raw, e)))
}

fn json_request(key: ResourceKey, url: Url) -> UpstreamRequest {
    UpstreamRequest::get(key, url.to_string()).with_header("accept", "application/json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> ResourceKey {
        ResourceKey::new(raw).unwrap()
    }

    #[test]
    fn test_price_request() {
        let endpoints = ProviderEndpoints {
            coingecko_api_key: Some("demo-key".to_string()),
            ..Default::default()
        };

        let request = endpoints
            .coingecko_price(key("price:bitcoin:usd"), "bitcoin", "usd")
            .unwrap();

        assert_eq!(
            request.url,
            "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd"
        );
        assert!(request
            .headers
            .contains(&("x-cg-demo-api-key".to_string(), "demo-key".to_string())));
    }

    #[test]
    fn test_pro_key_header() {
        let endpoints = ProviderEndpoints {
            coingecko_base_url: "https://pro-api.coingecko.com/api/v3/".to_string(),
            coingecko_api_key: Some("pro-key".to_string()),
            ..Default::default()
        };

        let request = endpoints
            .coingecko_market_chart(key("history:bitcoin:usd:7"), "bitcoin", "usd", 7)
            .unwrap();

        assert_eq!(
            request.url,
            "https://pro-api.coingecko.com/api/v3/coins/bitcoin/market_chart?vs_currency=usd&days=7"
        );
        assert!(request
            .headers
            .iter()
            .any(|(name, _)| name == "x-cg-pro-api-key"));
    }

    #[test]
    fn test_news_request_with_categories() {
        let endpoints = ProviderEndpoints::default();
        let request = endpoints
            .cryptocompare_news(key("news:btc,eth"), &["BTC".to_string(), "ETH".to_string()])
            .unwrap();

        assert_eq!(
            request.url,
            "https://min-api.cryptocompare.com/data/v2/news/?lang=EN&categories=BTC%2CETH"
        );
    }

    #[test]
    fn test_invalid_base_url_is_a_config_error() {
        let endpoints = ProviderEndpoints {
            fear_greed_base_url: "not a url".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            endpoints.validate(),
            Err(Error::InvalidConfigValue(_))
        ));
    }
}
