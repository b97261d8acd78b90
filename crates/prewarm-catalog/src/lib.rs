//! Repository catalog sources for prewarm
//!
//! ```text
//! CatalogSource (trait)
//! ├── HttpCatalog    GET /v2/_catalog with Link pagination
//! └── SearchCatalog  podman search <registry>/
//! ```

pub mod http;
pub mod search;
pub mod traits;

pub use http::{registry_base_url, HttpCatalog};
pub use search::{parse_search_output, SearchCatalog, DEFAULT_SEARCH_LIMIT};
pub use traits::CatalogSource;

use prewarm_core::{CatalogStrategy, Credentials, Result};

/// Create the catalog source for a resolved strategy
///
/// `Auto` is resolved here as well, from the presence of credentials and the
/// TLS verification flag.
pub fn create_catalog_source(
    strategy: CatalogStrategy,
    registry: &str,
    tls_verify: bool,
    credentials: Option<Credentials>,
    podman: &str,
) -> Result<Box<dyn CatalogSource>> {
    match strategy.resolve(credentials.is_some(), tls_verify) {
        CatalogStrategy::Search => Ok(Box::new(
            SearchCatalog::new(registry, tls_verify)
                .with_binary(podman)
                .with_credentials(credentials),
        )),
        _ => Ok(Box::new(
            HttpCatalog::new(registry, tls_verify)?.with_credentials(credentials),
        )),
    }
}
