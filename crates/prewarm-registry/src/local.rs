//! Ephemeral distribution registry managed through podman

use crate::config::{DistributionConfig, CONTAINER_CONFIG_PATH, CONTAINER_STORAGE_DIR};
use camino::{Utf8Path, Utf8PathBuf};
use prewarm_catalog::{CatalogSource, HttpCatalog};
use prewarm_core::config::LocalRegistrySettings;
use prewarm_core::{Credentials, Error, Result};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of container and config file names
pub const CONTAINER_PREFIX: &str = "prewarm_local_dist_";

/// Host paths shared with the registry container when present, so it trusts
/// the same certificate authorities and resolves the same hosts
const HOST_MOUNTS: &[&str] = &[
    "/etc/pki/",
    "/etc/hosts",
    "/etc/ssl/",
    "/var/lib/ca-certificates/",
];

struct RunningRegistry {
    name: String,
    // The container reads this file for as long as it runs
    _config: NamedTempFile,
}

/// A distribution registry container acting as pull-through proxy
pub struct LocalDistribution {
    podman: String,
    image: String,
    port: u16,
    ready_attempts: u32,
    ready_interval: Duration,
    running: Option<RunningRegistry>,
}

impl LocalDistribution {
    pub fn new(settings: &LocalRegistrySettings) -> Self {
        Self {
            podman: "podman".to_string(),
            image: settings.image.clone(),
            port: settings.port,
            ready_attempts: settings.ready_attempts.max(1),
            ready_interval: Duration::from_secs(settings.ready_interval_secs),
            running: None,
        }
    }

    pub fn with_podman(mut self, podman: impl Into<String>) -> Self {
        self.podman = podman.into();
        self
    }

    /// Override the readiness probe cadence
    pub fn with_readiness(mut self, attempts: u32, interval: Duration) -> Self {
        self.ready_attempts = attempts.max(1);
        self.ready_interval = interval;
        self
    }

    /// Proxy location transfers should use once the registry is up
    pub fn local_url(&self) -> String {
        format!("localhost:{}", self.port)
    }

    /// Name of the running container, if any
    pub fn container_name(&self) -> Option<&str> {
        self.running.as_ref().map(|r| r.name.as_str())
    }

    /// Start the registry and wait until it answers catalog requests
    ///
    /// Returns the proxy location to use instead of the `local://` value. A
    /// container that started but never became ready is still tracked, so
    /// [`LocalDistribution::stop`] removes it.
    pub async fn start(
        &mut self,
        data_dir: &Utf8Path,
        remote: &str,
        credentials: Option<&Credentials>,
    ) -> Result<String> {
        if self.running.is_some() {
            return Ok(self.local_url());
        }

        which::which(&self.podman).map_err(|_| {
            Error::command(format!(
                "{} is required to run a local distribution registry",
                self.podman
            ))
        })?;

        std::fs::create_dir_all(data_dir)?;
        let data_dir = Utf8PathBuf::try_from(std::fs::canonicalize(data_dir)?).map_err(|e| {
            Error::configuration(format!("Data directory is not valid UTF-8: {}", e))
        })?;

        let mut config = tempfile::Builder::new()
            .prefix(CONTAINER_PREFIX)
            .suffix(".yml")
            .tempfile()?;
        config.write_all(
            DistributionConfig::proxy_for(remote, self.port, credentials)
                .to_yaml()?
                .as_bytes(),
        )?;
        config.flush()?;

        let name = format!("{}{}", CONTAINER_PREFIX, Uuid::new_v4().simple());
        let args = run_args(&name, &data_dir, config.path(), &self.image, existing_host_mounts());
        debug!("{} {}", self.podman, args.join(" "));

        info!("Starting local distribution registry {} for {}", name, remote);
        // Tracked before podman runs, so stop() removes a container whose
        // start was cancelled halfway
        self.running = Some(RunningRegistry {
            name,
            _config: config,
        });

        let output = match Command::new(&self.podman).args(&args).output().await {
            Ok(output) => output,
            Err(e) => {
                self.running = None;
                return Err(Error::command(format!(
                    "Failed to run {}: {}",
                    self.podman, e
                )));
            }
        };

        if !output.status.success() {
            self.running = None;
            return Err(Error::command(format!(
                "Failed to start local distribution registry: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        self.wait_ready().await?;
        Ok(self.local_url())
    }

    async fn wait_ready(&self) -> Result<()> {
        let catalog = HttpCatalog::new(format!("http://{}", self.local_url()), false)?;

        for attempt in 1..=self.ready_attempts {
            match catalog.list_repositories().await {
                Ok(_) => {
                    info!("Local distribution registry ready at {}", self.local_url());
                    return Ok(());
                }
                Err(e) => {
                    debug!(
                        "Registry not ready ({}/{}): {}",
                        attempt, self.ready_attempts, e
                    );
                }
            }
            if attempt < self.ready_attempts {
                tokio::time::sleep(self.ready_interval).await;
            }
        }

        Err(Error::command(format!(
            "Local distribution registry did not become ready after {} attempts",
            self.ready_attempts
        )))
    }

    /// Remove the container; calling this again, or without a prior start, does nothing
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        info!("Removing local distribution registry {}", running.name);
        let output = Command::new(&self.podman)
            .args(["rm", "--force", running.name.as_str()])
            .output()
            .await
            .map_err(|e| Error::command(format!("Failed to run {}: {}", self.podman, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Failed to remove {}: {}", running.name, stderr.trim());
            return Err(Error::command(format!(
                "Failed to remove local distribution registry {}: {}",
                running.name,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

fn existing_host_mounts() -> Vec<&'static str> {
    HOST_MOUNTS
        .iter()
        .copied()
        .filter(|p| Path::new(p).exists())
        .collect()
}

/// Arguments of `podman run` for the registry container
pub fn run_args(
    name: &str,
    data_dir: &Utf8Path,
    config_file: &Path,
    image: &str,
    host_mounts: Vec<&str>,
) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        "--name".to_string(),
        name.to_string(),
        "--net".to_string(),
        "host".to_string(),
        "-v".to_string(),
        format!(
            "{}/:{}/",
            data_dir.as_str().trim_end_matches('/'),
            CONTAINER_STORAGE_DIR
        ),
        "-v".to_string(),
        format!("{}:{}", config_file.display(), CONTAINER_CONFIG_PATH),
    ];
    for mount in host_mounts {
        args.push("-v".to_string());
        args.push(format!("{}:{}", mount, mount));
    }
    args.push(image.to_string());
    args
}
