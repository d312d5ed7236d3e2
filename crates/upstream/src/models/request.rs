use std::fmt;

use super::ResourceKey;

/// HTTP methods the coordinator issues. Market-data APIs are read-only,
/// so only idempotent methods are modelled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor of one logical upstream call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub resource_key: ResourceKey,
}

impl UpstreamRequest {
    /// Create a GET request for a fully resolved URL.
    pub fn get(resource_key: ResourceKey, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            resource_key,
        }
    }

    /// Add a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Coalescing signature.
    ///
    /// Includes the resource key as well as the resolved URL, so two keys that
    /// happen to hit the same URL still never share an in-flight operation.
    /// Headers are excluded: they carry credentials, not resource identity.
    pub fn signature(&self) -> String {
        format!("{} {} {}", self.resource_key, self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> ResourceKey {
        ResourceKey::new(raw).unwrap()
    }

    #[test]
    fn test_signature_ignores_headers() {
        let a = UpstreamRequest::get(key("price:bitcoin"), "https://api.example/p?ids=bitcoin");
        let b = a.clone().with_header("x-api-key", "secret");
        assert_eq!(a.signature(), b.signature());
        assert!(!a.signature().contains("secret"));
    }

    #[test]
    fn test_signature_separates_resource_keys() {
        let url = "https://api.example/p?ids=bitcoin";
        let a = UpstreamRequest::get(key("price:bitcoin"), url);
        let b = UpstreamRequest::get(key("price:bitcoin:usd"), url);
        assert_ne!(a.signature(), b.signature());
    }
}
