//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{ArgAction, Args, Parser, Subcommand};
use prewarm_core::CatalogStrategy;

/// prewarm - prime pull-through registry caches
#[derive(Parser, Debug)]
#[command(name = "prewarm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a prewarm.yaml settings file
    #[arg(short, long, global = true, env = "PREWARM_CONFIG")]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fill a proxy registry's cache from the source registry catalog
    Update(UpdateArgs),

    /// List the accepted --arch values
    Archs,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Proxy registry to prime, or local://distribution:DIR to run a
    /// temporary distribution registry storing its data in DIR
    #[arg(long = "updatecache", value_name = "PROXY")]
    pub updatecache: String,

    /// Source registry whose catalog is read
    #[arg(long = "from", value_name = "REGISTRY")]
    pub from: String,

    /// Transfer images; without this only the candidates are listed
    #[arg(long)]
    pub apply: bool,

    /// Only repositories matching this regular expression (anchored at the start)
    #[arg(long, value_name = "REGEX")]
    pub filter: Option<String>,

    /// Policy file with repository allow-list patterns
    #[arg(long = "filter-policy", value_name = "FILE")]
    pub filter_policy: Option<Utf8PathBuf>,

    /// Ignore a policy section (repeatable)
    #[arg(long = "skip-policy-section", value_name = "NAME")]
    pub skip_policy_section: Vec<String>,

    /// Architecture to transfer (repeatable), see `prewarm archs`
    #[arg(long, value_name = "ARCH")]
    pub arch: Vec<String>,

    /// Source registry credentials as user:password or a credentials file
    #[arg(long = "registry-creds", value_name = "CREDS", env = "PREWARM_REGISTRY_CREDS", hide_env_values = true)]
    pub registry_creds: Option<String>,

    /// Proxy registry credentials as user:password or a credentials file
    #[arg(long = "proxy-creds", value_name = "CREDS", env = "PREWARM_PROXY_CREDS", hide_env_values = true)]
    pub proxy_creds: Option<String>,

    /// Keep transferred images as OCI layouts below DIR
    #[arg(long = "store-oci", value_name = "DIR")]
    pub store_oci: Option<Utf8PathBuf>,

    /// Push transferred images into this repository
    #[arg(long = "push-oci", value_name = "REPO")]
    pub push_oci: Option<String>,

    /// Credentials for --push-oci as user:password or a credentials file
    #[arg(long = "push-oci-creds", value_name = "CREDS", env = "PREWARM_PUSH_OCI_CREDS", hide_env_values = true)]
    pub push_oci_creds: Option<String>,

    /// Verify the proxy registry's TLS certificate
    #[arg(long = "tls-verify-proxy", value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub tls_verify_proxy: bool,

    /// Verify the source registry's TLS certificate
    #[arg(long = "tls-verify-registry", value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub tls_verify_registry: bool,

    /// Maximum number of concurrent transfers
    #[arg(long = "max-requests", value_name = "N")]
    pub max_requests: Option<usize>,

    /// Drop image signatures while transferring
    #[arg(long = "remove-signatures")]
    pub remove_signatures: bool,

    /// How to read the source catalog: auto, http or search
    #[arg(long = "catalog-source", value_name = "STRATEGY", default_value = "auto")]
    pub catalog_source: CatalogStrategy,

    /// Directory for per-job transfer logs
    #[arg(long = "log-dir", value_name = "DIR")]
    pub log_dir: Option<Utf8PathBuf>,

    /// Directory for per-repository tag records
    #[arg(long = "tag-store", value_name = "DIR")]
    pub tag_store: Option<Utf8PathBuf>,

    /// Seconds between liveness polls of running transfers
    #[arg(long = "poll-interval", value_name = "SECS")]
    pub poll_interval: Option<u64>,
}
