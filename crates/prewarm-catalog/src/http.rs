//! Registry v2 catalog over HTTP

use crate::traits::CatalogSource;
use async_trait::async_trait;
use prewarm_core::{Credentials, Error, Result};
use reqwest::header::LINK;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

/// Reads `/v2/_catalog`, following `Link` pagination
pub struct HttpCatalog {
    client: reqwest::Client,
    registry: String,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl HttpCatalog {
    /// Create a catalog client for a registry host (`registry.example.com`)
    /// or URL (`http://localhost:5000`). Hosts without scheme use https.
    pub fn new(registry: impl Into<String>, tls_verify: bool) -> Result<Self> {
        let registry = registry.into();
        let base_url = registry_base_url(&registry)?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("prewarm/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!tls_verify)
            .build()
            .map_err(|e| Error::request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            registry,
            base_url,
            credentials: None,
        })
    }

    /// Authenticate catalog requests with basic auth
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn catalog_url(&self) -> Result<Url> {
        self.base_url
            .join("v2/_catalog")
            .map_err(|e| Error::request(format!("Invalid catalog URL: {}", e)))
    }

    async fn fetch_page(&self, url: &Url) -> Result<(Vec<String>, Option<Url>)> {
        debug!("Reading catalog from: {}", url);

        let mut request = self.client.get(url.clone());
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::request(format!("Failed to handle request {}: {}", url, e)))?;

        let next = response
            .headers()
            .get(LINK)
            .and_then(|h| h.to_str().ok())
            .and_then(|link| parse_link_header(link, url));

        let body = response
            .text()
            .await
            .map_err(|e| Error::request(format!("Failed to read response from {}: {}", url, e)))?;
        let catalog: Value = serde_json::from_str(&body)?;

        let repositories = catalog
            .get("repositories")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::catalog(body.trim().to_string()))?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();

        Ok((repositories, next))
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    fn name(&self) -> &'static str {
        "http"
    }

    fn registry(&self) -> &str {
        &self.registry
    }

    async fn list_repositories(&self) -> Result<Vec<String>> {
        let mut repositories = Vec::new();
        let mut url = self.catalog_url()?;

        loop {
            let (page, next) = self.fetch_page(&url).await?;
            repositories.extend(page);

            match next {
                Some(next) => url = next,
                None => break,
            }
        }

        trace!("Found {} repositories total", repositories.len());
        Ok(repositories)
    }
}

/// Base URL of a registry given as host or URL
pub fn registry_base_url(registry: &str) -> Result<Url> {
    let with_scheme = if registry.contains("://") {
        registry.to_string()
    } else {
        format!("https://{}", registry)
    };
    let with_slash = if with_scheme.ends_with('/') {
        with_scheme
    } else {
        format!("{}/", with_scheme)
    };
    Url::parse(&with_slash)
        .map_err(|e| Error::configuration(format!("Invalid registry location '{}': {}", registry, e)))
}

/// Parse a `Link` header for the next page
/// Format: `</v2/_catalog?last=b&n=100>; rel="next"`
fn parse_link_header(link: &str, current: &Url) -> Option<Url> {
    link.split(',')
        .map(str::trim)
        .filter(|part| part.contains("rel=\"next\""))
        .find_map(|part| {
            let start = part.find('<')?;
            let end = part.find('>')?;
            current.join(&part[start + 1..end]).ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_base_url() {
        assert_eq!(
            registry_base_url("registry.opensuse.org").unwrap().as_str(),
            "https://registry.opensuse.org/"
        );
        assert_eq!(
            registry_base_url("http://localhost:5000").unwrap().as_str(),
            "http://localhost:5000/"
        );
    }

    #[test]
    fn test_catalog_url() {
        let catalog = HttpCatalog::new("registry.opensuse.org", true).unwrap();
        assert_eq!(
            catalog.catalog_url().unwrap().as_str(),
            "https://registry.opensuse.org/v2/_catalog"
        );
        assert_eq!(catalog.name(), "http");
    }

    #[test]
    fn test_parse_link_header() {
        let current = Url::parse("https://reg.example.com/v2/_catalog").unwrap();
        let next = parse_link_header("</v2/_catalog?last=b&n=2>; rel=\"next\"", &current).unwrap();
        assert_eq!(
            next.as_str(),
            "https://reg.example.com/v2/_catalog?last=b&n=2"
        );
        assert!(parse_link_header("</x>; rel=\"prev\"", &current).is_none());
    }
}
