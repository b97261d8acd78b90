//! Run configuration
//!
//! [`RunConfig`] is the validated combination of command line options and
//! [`Settings`]. It is built once, checked with [`RunConfig::validate`], and
//! then threaded through every component; no component reads global state.

mod settings;

pub use settings::{
    LocalRegistrySettings, Settings, ToolSettings, DEFAULT_LOG_DIR, DEFAULT_MAX_REQUESTS,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_TAG_STORE,
};

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::types::{ArchSelection, Destination};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of the proxy value that requests an ephemeral local registry
pub const LOCAL_DISTRIBUTION_PREFIX: &str = "local://distribution:";

/// Registry whose cache is being primed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyTarget {
    /// An already running proxy registry
    Remote(String),
    /// Start a local distribution registry storing its cache below `data_dir`
    LocalDistribution { data_dir: Utf8PathBuf },
}

impl ProxyTarget {
    pub fn parse(value: &str) -> Result<Self> {
        if let Some(dir) = value.strip_prefix(LOCAL_DISTRIBUTION_PREFIX) {
            if dir.is_empty() {
                return Err(Error::configuration(format!(
                    "{}DIR requires a data directory",
                    LOCAL_DISTRIBUTION_PREFIX
                )));
            }
            return Ok(ProxyTarget::LocalDistribution {
                data_dir: Utf8PathBuf::from(dir),
            });
        }
        if value.is_empty() {
            return Err(Error::configuration("proxy location must not be empty"));
        }
        Ok(ProxyTarget::Remote(value.to_string()))
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyTarget::Remote(url) => f.write_str(url),
            ProxyTarget::LocalDistribution { data_dir } => {
                write!(f, "{}{}", LOCAL_DISTRIBUTION_PREFIX, data_dir)
            }
        }
    }
}

/// How the source registry's repository list is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogStrategy {
    /// Search when credentials are given or TLS verification is on, else HTTP
    #[default]
    Auto,
    /// Query `/v2/_catalog` directly
    Http,
    /// Use the container tool's registry search
    Search,
}

impl CatalogStrategy {
    /// Resolve `Auto` into a concrete strategy
    pub fn resolve(self, has_credentials: bool, tls_verify: bool) -> CatalogStrategy {
        match self {
            CatalogStrategy::Auto if has_credentials || tls_verify => CatalogStrategy::Search,
            CatalogStrategy::Auto => CatalogStrategy::Http,
            other => other,
        }
    }
}

impl FromStr for CatalogStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(CatalogStrategy::Auto),
            "http" => Ok(CatalogStrategy::Http),
            "search" => Ok(CatalogStrategy::Search),
            other => Err(Error::configuration(format!(
                "Unknown catalog source '{}'. Valid sources: auto, http, search",
                other
            ))),
        }
    }
}

impl Destination {
    /// Build the destination from the mutually exclusive store/push options
    pub fn from_options(
        store_oci: Option<Utf8PathBuf>,
        push_oci: Option<String>,
        push_oci_creds: Option<Credentials>,
    ) -> Result<Self> {
        match (store_oci, push_oci) {
            (Some(_), Some(_)) => Err(Error::configuration(
                "--store-oci and --push-oci cannot be used together",
            )),
            (Some(dir), None) => {
                if push_oci_creds.is_some() {
                    return Err(Error::configuration("--push-oci-creds requires --push-oci"));
                }
                Ok(Destination::OciDir(dir))
            }
            (None, Some(repository)) => Ok(Destination::Push {
                repository,
                credentials: push_oci_creds,
            }),
            (None, None) => {
                if push_oci_creds.is_some() {
                    return Err(Error::configuration("--push-oci-creds requires --push-oci"));
                }
                Ok(Destination::Discard)
            }
        }
    }
}

/// Fully resolved options of one cache update run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub proxy: ProxyTarget,
    pub from_registry: String,
    /// Without `apply` the run only lists what it would do
    pub apply: bool,
    pub filter: Option<String>,
    pub policy: Option<Utf8PathBuf>,
    pub skip_policy_sections: Vec<String>,
    pub arches: ArchSelection,
    pub registry_creds: Option<Credentials>,
    pub proxy_creds: Option<Credentials>,
    pub destination: Destination,
    pub tls_verify_proxy: bool,
    pub tls_verify_registry: bool,
    pub remove_signatures: bool,
    pub catalog_strategy: CatalogStrategy,
    pub settings: Settings,
}

impl RunConfig {
    pub fn is_dry_run(&self) -> bool {
        !self.apply
    }

    /// Check option combinations before any network activity
    pub fn validate(&self) -> Result<()> {
        if self.from_registry.trim().is_empty() {
            return Err(Error::configuration("--from must name a registry"));
        }
        if self.settings.max_requests == 0 {
            return Err(Error::configuration("--max-requests must be at least 1"));
        }
        if self.settings.poll_interval_secs == 0 {
            return Err(Error::configuration("poll interval must be at least 1 second"));
        }
        if !self.skip_policy_sections.is_empty() && self.policy.is_none() {
            return Err(Error::configuration(
                "--skip-policy-section requires --filter-policy",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> RunConfig {
        RunConfig {
            proxy: ProxyTarget::Remote("proxy.example.com".to_string()),
            from_registry: "registry.example.com".to_string(),
            apply: false,
            filter: None,
            policy: None,
            skip_policy_sections: Vec::new(),
            arches: ArchSelection::All,
            registry_creds: None,
            proxy_creds: None,
            destination: Destination::Discard,
            tls_verify_proxy: true,
            tls_verify_registry: true,
            remove_signatures: false,
            catalog_strategy: CatalogStrategy::Auto,
            settings: Settings::default(),
        }
    }

    #[test]
    fn test_proxy_target_parse() {
        assert_eq!(
            ProxyTarget::parse("local://distribution:/srv/cache").unwrap(),
            ProxyTarget::LocalDistribution {
                data_dir: Utf8PathBuf::from("/srv/cache")
            }
        );
        assert_eq!(
            ProxyTarget::parse("proxy:5000").unwrap(),
            ProxyTarget::Remote("proxy:5000".to_string())
        );
        assert!(ProxyTarget::parse("local://distribution:").is_err());
    }

    #[test]
    fn test_catalog_strategy_resolve() {
        assert_eq!(
            CatalogStrategy::Auto.resolve(false, false),
            CatalogStrategy::Http
        );
        assert_eq!(
            CatalogStrategy::Auto.resolve(true, false),
            CatalogStrategy::Search
        );
        assert_eq!(
            CatalogStrategy::Auto.resolve(false, true),
            CatalogStrategy::Search
        );
        assert_eq!(
            CatalogStrategy::Http.resolve(true, true),
            CatalogStrategy::Http
        );
    }

    #[test]
    fn test_destination_options_are_exclusive() {
        let err = Destination::from_options(
            Some(Utf8PathBuf::from("/oci")),
            Some("reg/repo".to_string()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));

        let err = Destination::from_options(None, None, Some(Credentials::new("a", "b")))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));

        assert_eq!(
            Destination::from_options(None, None, None).unwrap(),
            Destination::Discard
        );
    }

    #[test]
    fn test_validate() {
        assert!(base_config().validate().is_ok());

        let mut config = base_config();
        config.settings.max_requests = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.skip_policy_sections = vec!["base".to_string()];
        assert!(config.validate().is_err());
        config.policy = Some(Utf8PathBuf::from("policy.yaml"));
        assert!(config.validate().is_ok());
    }
}
