//! Catalog source trait definitions

use async_trait::async_trait;
use prewarm_core::Result;

/// Something that can enumerate the repositories of a registry
///
/// Two strategies exist: [`HttpCatalog`](crate::HttpCatalog) reads the
/// registry's `/v2/_catalog` endpoint and [`SearchCatalog`](crate::SearchCatalog)
/// asks the container tool's registry search. The run picks one from
/// configuration and only ever talks to this trait.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Strategy name (e.g., "http", "search")
    fn name(&self) -> &'static str;

    /// Registry being listed
    fn registry(&self) -> &str;

    /// Repository names in the order the registry reports them
    async fn list_repositories(&self) -> Result<Vec<String>>;
}
