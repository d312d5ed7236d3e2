//! Catalog of servable resources.
//!
//! Client input is only accepted for coins, currencies, history windows and
//! news categories named in configuration. That keeps the set of cache keys
//! finite, so an administrative sweep can enumerate every one of them.

use coinpulse_upstream::ResourceKey;

use super::resources_model::Resource;
use crate::errors::{Error, Result, ValidationError};

pub const DEFAULT_TRACKED_COINS: &[&str] = &["bitcoin", "ethereum"];
pub const DEFAULT_VS_CURRENCIES: &[&str] = &["usd"];
pub const DEFAULT_HISTORY_DAYS: &[u32] = &[1, 7, 30];

/// News category combinations are enumerated, so their count is bounded.
pub const MAX_NEWS_CATEGORIES: usize = 8;

const MAX_HISTORY_DAYS: u32 = 365;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceCatalog {
    tracked_coins: Vec<String>,
    vs_currencies: Vec<String>,
    history_days: Vec<u32>,
    news_categories: Vec<String>,
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        Self {
            tracked_coins: DEFAULT_TRACKED_COINS.iter().map(|s| s.to_string()).collect(),
            vs_currencies: DEFAULT_VS_CURRENCIES.iter().map(|s| s.to_string()).collect(),
            history_days: DEFAULT_HISTORY_DAYS.to_vec(),
            news_categories: Vec::new(),
        }
    }
}

impl ResourceCatalog {
    /// Build a catalog from configuration, normalizing and validating entries.
    pub fn new<C, V, N>(
        tracked_coins: C,
        vs_currencies: V,
        history_days: Vec<u32>,
        news_categories: N,
    ) -> Result<Self>
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        V: IntoIterator,
        V::Item: AsRef<str>,
        N: IntoIterator,
        N::Item: AsRef<str>,
    {
        let tracked_coins = normalize_list(tracked_coins, str::to_ascii_lowercase);
        let vs_currencies = normalize_list(vs_currencies, str::to_ascii_lowercase);
        let mut news_categories = normalize_list(news_categories, str::to_ascii_uppercase);
        news_categories.sort();

        let mut history_days = history_days;
        history_days.sort_unstable();
        history_days.dedup();

        if tracked_coins.is_empty() {
            return Err(Error::InvalidConfigValue(
                "at least one tracked coin is required".to_string(),
            ));
        }
        if vs_currencies.is_empty() {
            return Err(Error::InvalidConfigValue(
                "at least one vs currency is required".to_string(),
            ));
        }
        if history_days.is_empty() || history_days.iter().any(|d| *d == 0 || *d > MAX_HISTORY_DAYS) {
            return Err(Error::InvalidConfigValue(format!(
                "history windows must be between 1 and {} days",
                MAX_HISTORY_DAYS
            )));
        }
        if news_categories.len() > MAX_NEWS_CATEGORIES {
            return Err(Error::InvalidConfigValue(format!(
                "at most {} news categories can be configured",
                MAX_NEWS_CATEGORIES
            )));
        }
        for value in tracked_coins.iter().chain(&vs_currencies).chain(&news_categories) {
            if !is_identifier(value) {
                return Err(Error::InvalidConfigValue(format!(
                    "'{}' is not a valid identifier",
                    value
                )));
            }
        }

        Ok(Self {
            tracked_coins,
            vs_currencies,
            history_days,
            news_categories,
        })
    }

    pub fn tracked_coins(&self) -> &[String] {
        &self.tracked_coins
    }

    pub fn vs_currencies(&self) -> &[String] {
        &self.vs_currencies
    }

    pub fn history_days(&self) -> &[u32] {
        &self.history_days
    }

    pub fn news_categories(&self) -> &[String] {
        &self.news_categories
    }

    pub fn price(&self, coin: &str, vs: Option<&str>) -> Result<Resource> {
        Ok(Resource::Price {
            coin: self.coin(coin)?,
            vs: self.vs(vs)?,
        })
    }

    /// Defaults to a 7-day window when configured, else the shortest one.
    pub fn history(&self, coin: &str, vs: Option<&str>, days: Option<u32>) -> Result<Resource> {
        let days = match days {
            Some(days) if self.history_days.contains(&days) => days,
            Some(days) => return Err(unsupported("days", days.to_string())),
            None if self.history_days.contains(&7) => 7,
            None => self.history_days[0],
        };

        Ok(Resource::History {
            coin: self.coin(coin)?,
            vs: self.vs(vs)?,
            days,
        })
    }

    /// `categories` is a comma-separated list; absent or empty means all.
    pub fn news(&self, categories: Option<&str>) -> Result<Resource> {
        let mut requested: Vec<String> = categories
            .unwrap_or_default()
            .split(',')
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        requested.sort();
        requested.dedup();

        if let Some(unknown) = requested
            .iter()
            .find(|c| !self.news_categories.contains(*c))
        {
            return Err(unsupported("news category", unknown.clone()));
        }

        Ok(Resource::News {
            categories: requested,
        })
    }

    pub fn sentiment(&self) -> Resource {
        Resource::Sentiment
    }

    /// Every resource a client can request.
    pub fn resources(&self) -> Vec<Resource> {
        let mut resources = Vec::new();

        for coin in &self.tracked_coins {
            for vs in &self.vs_currencies {
                resources.push(Resource::Price {
                    coin: coin.clone(),
                    vs: vs.clone(),
                });
                for days in &self.history_days {
                    resources.push(Resource::History {
                        coin: coin.clone(),
                        vs: vs.clone(),
                        days: *days,
                    });
                }
            }
        }

        // Every subset of the configured categories, the empty one meaning "all".
        let subsets = 1usize << self.news_categories.len();
        for mask in 0..subsets {
            let categories = self
                .news_categories
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << *i) != 0)
                .map(|(_, c)| c.clone())
                .collect();
            resources.push(Resource::News { categories });
        }

        resources.push(Resource::Sentiment);
        resources
    }

    /// Cache keys of every servable resource.
    pub fn keys(&self) -> Result<Vec<ResourceKey>> {
        self.resources().iter().map(Resource::resource_key).collect()
    }

    fn coin(&self, coin: &str) -> Result<String> {
        let coin = coin.trim().to_ascii_lowercase();
        if self.tracked_coins.contains(&coin) {
            Ok(coin)
        } else {
            Err(unsupported("coin", coin))
        }
    }

    fn vs(&self, vs: Option<&str>) -> Result<String> {
        let Some(vs) = vs.map(|v| v.trim().to_ascii_lowercase()).filter(|v| !v.is_empty()) else {
            return Ok(self.vs_currencies[0].clone());
        };
        if self.vs_currencies.contains(&vs) {
            Ok(vs)
        } else {
            Err(unsupported("currency", vs))
        }
    }
}

fn unsupported(field: &'static str, value: String) -> Error {
    Error::Validation(ValidationError::Unsupported { field, value })
}

fn normalize_list<I>(values: I, normalize: fn(&str) -> String) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut list: Vec<String> = Vec::new();
    for value in values {
        let value = normalize(value.as_ref().trim());
        if !value.is_empty() && !list.contains(&value) {
            list.push(value);
        }
    }
    list
}

fn is_identifier(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ResourceCatalog {
        ResourceCatalog::new(
            ["Bitcoin", "ethereum", "bitcoin"],
            ["usd", "eur"],
            vec![30, 7, 1],
            ["btc", "ETH"],
        )
        .unwrap()
    }

    #[test]
    fn test_normalizes_configuration() {
        let catalog = catalog();
        assert_eq!(catalog.tracked_coins(), &["bitcoin", "ethereum"]);
        assert_eq!(catalog.history_days(), &[1, 7, 30]);
        assert_eq!(catalog.news_categories(), &["BTC", "ETH"]);
    }

    #[test]
    fn test_rejects_untracked_input() {
        let catalog = catalog();

        assert!(catalog.price("dogecoin", None).is_err());
        assert!(catalog.price("bitcoin", Some("jpy")).is_err());
        assert!(catalog.history("bitcoin", None, Some(90)).is_err());
        assert!(catalog.news(Some("SOL")).is_err());
    }

    #[test]
    fn test_defaults() {
        let catalog = catalog();

        assert_eq!(
            catalog.price(" BITCOIN ", None).unwrap(),
            Resource::Price {
                coin: "bitcoin".to_string(),
                vs: "usd".to_string()
            }
        );
        assert_eq!(
            catalog.history("ethereum", Some("EUR"), None).unwrap(),
            Resource::History {
                coin: "ethereum".to_string(),
                vs: "eur".to_string(),
                days: 7
            }
        );
        assert_eq!(
            catalog.news(Some("eth, btc,eth")).unwrap(),
            Resource::News {
                categories: vec!["BTC".to_string(), "ETH".to_string()]
            }
        );
        assert_eq!(
            catalog.news(None).unwrap(),
            Resource::News { categories: vec![] }
        );
    }

    #[test]
    fn test_keys_cover_every_requestable_resource() {
        let catalog = catalog();
        let keys = catalog.keys().unwrap();

        // 2 coins × 2 currencies × (1 price + 3 windows) + 4 news subsets + sentiment
        assert_eq!(keys.len(), 16 + 4 + 1);

        let requested = catalog.news(Some("ETH,BTC")).unwrap().resource_key().unwrap();
        assert!(keys.contains(&requested));
        assert!(keys.contains(&ResourceKey::new("news:all").unwrap()));
        assert!(keys.contains(&ResourceKey::new("history:ethereum:eur:30").unwrap()));
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(
            ResourceCatalog::new(Vec::<String>::new(), ["usd"], vec![1], Vec::<String>::new())
                .is_err()
        );
        assert!(ResourceCatalog::new(["bitcoin"], ["usd"], vec![0], Vec::<String>::new()).is_err());
        assert!(ResourceCatalog::new(["bit coin"], ["usd"], vec![1], Vec::<String>::new()).is_err());
    }
}
