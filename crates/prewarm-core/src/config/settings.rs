//! Settings file loading
//!
//! Everything here has a built-in default. A `prewarm.yaml` only needs to
//! name the values it changes; command line flags override both.

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::debug;

/// Default directory for per-job transfer logs
pub const DEFAULT_LOG_DIR: &str = "/var/log/prewarm";

/// Default directory for per-repository tag records
pub const DEFAULT_TAG_STORE: &str = "/var/lib/prewarm/tags";

/// Default number of concurrently running transfer processes
pub const DEFAULT_MAX_REQUESTS: usize = 10;

/// Default liveness polling interval of the dispatcher, in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Tunables shared by every run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Settings {
    /// Per-job logs live below this directory; the consolidated log is `<log_dir>.log`
    pub log_dir: Utf8PathBuf,

    /// Root of the tag records
    pub tag_store: Utf8PathBuf,

    /// Dispatch ceiling
    pub max_requests: usize,

    /// Seconds between liveness polls while at the ceiling or draining
    pub poll_interval_secs: u64,

    /// External tool locations
    pub tools: ToolSettings,

    /// Ephemeral local registry
    pub local_registry: LocalRegistrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_dir: Utf8PathBuf::from(DEFAULT_LOG_DIR),
            tag_store: Utf8PathBuf::from(DEFAULT_TAG_STORE),
            max_requests: DEFAULT_MAX_REQUESTS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            tools: ToolSettings::default(),
            local_registry: LocalRegistrySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file, or return the defaults when no path is given
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::configuration(format!("Settings file not found: {}", path))
            } else {
                Error::Io(e)
            }
        })?;

        let settings: Settings = serde_yaml_ng::from_str(&content)?;
        debug!("Loaded settings from {}", path);
        Ok(settings)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Path of the cumulative failure log next to the log directory
    pub fn consolidated_log(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.log", self.log_dir.as_str().trim_end_matches('/')))
    }
}

/// Names or paths of the external tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub skopeo: String,
    pub podman: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            skopeo: "skopeo".to_string(),
            podman: "podman".to_string(),
        }
    }
}

/// Settings for the ephemeral distribution registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalRegistrySettings {
    pub image: String,
    pub port: u16,
    /// Readiness probes before giving up
    pub ready_attempts: u32,
    /// Seconds between readiness probes
    pub ready_interval_secs: u64,
}

impl Default for LocalRegistrySettings {
    fn default() -> Self {
        Self {
            image: "docker.io/library/registry:latest".to_string(),
            port: 5000,
            ready_attempts: 30,
            ready_interval_secs: 2,
        }
    }
}
