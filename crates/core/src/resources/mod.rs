//! Servable resources.
//!
//! - **Models** (`resources_model.rs`) - Resource descriptors, payload validation, Served
//! - **Endpoints** (`endpoints.rs`) - Provider base URLs, credentials and request building
//! - **Catalog** (`catalog.rs`) - Configured coins/currencies/windows/categories and key enumeration
//! - **Service** (`service.rs`) - Cache-first orchestration with stale fallback

mod catalog;
mod endpoints;
mod resources_model;
mod service;

#[cfg(test)]
mod service_tests;

pub use catalog::{
    ResourceCatalog, DEFAULT_HISTORY_DAYS, DEFAULT_TRACKED_COINS, DEFAULT_VS_CURRENCIES,
    MAX_NEWS_CATEGORIES,
};
pub use endpoints::{
    ProviderEndpoints, DEFAULT_COINGECKO_BASE_URL, DEFAULT_CRYPTOCOMPARE_BASE_URL,
    DEFAULT_FEAR_GREED_BASE_URL,
};
pub use resources_model::{
    Resource, Served, ALL_CATEGORIES, SOURCE_COINGECKO, SOURCE_CRYPTOCOMPARE, SOURCE_FEAR_GREED,
};
pub use service::{ResourceService, ResourceServiceTrait, ServiceStats};
