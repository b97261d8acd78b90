//! Repository listing through the container tool's registry search
//!
//! Used where the registry's catalog endpoint needs authentication or TLS
//! handling that `podman` already knows how to do.

use crate::traits::CatalogSource;
use async_trait::async_trait;
use prewarm_core::{Credentials, Error, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Upper bound on search results requested from the registry
pub const DEFAULT_SEARCH_LIMIT: usize = 100_000;

/// Lists repositories with `podman search`
pub struct SearchCatalog {
    podman: String,
    registry: String,
    tls_verify: bool,
    credentials: Option<Credentials>,
    limit: usize,
}

impl SearchCatalog {
    pub fn new(registry: impl Into<String>, tls_verify: bool) -> Self {
        Self {
            podman: "podman".to_string(),
            registry: registry.into(),
            tls_verify,
            credentials: None,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Use a specific podman binary
    pub fn with_binary(mut self, podman: impl Into<String>) -> Self {
        self.podman = podman.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Registry host without scheme or trailing slash, as podman expects it
    fn search_host(&self) -> &str {
        let host = self
            .registry
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.registry);
        host.trim_end_matches('/')
    }

    fn search_args(&self) -> Vec<String> {
        let mut args = vec![
            "search".to_string(),
            "--limit".to_string(),
            self.limit.to_string(),
            "--format".to_string(),
            "{{.Name}}".to_string(),
            format!("--tls-verify={}", self.tls_verify),
        ];
        if let Some(creds) = &self.credentials {
            args.push("--creds".to_string());
            args.push(creds.to_arg());
        }
        args.push(format!("{}/", self.search_host()));
        args
    }
}

#[async_trait]
impl CatalogSource for SearchCatalog {
    fn name(&self) -> &'static str {
        "search"
    }

    fn registry(&self) -> &str {
        &self.registry
    }

    async fn list_repositories(&self) -> Result<Vec<String>> {
        debug!("Searching repositories on {} via {}", self.search_host(), self.podman);

        let output = Command::new(&self.podman)
            .args(self.search_args())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::command(format!("Failed to run {} search: {}", self.podman, e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(Error::command(format!(
                "{} search on {} failed ({}): {}",
                self.podman,
                self.search_host(),
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_search_output(self.search_host(), &stdout))
    }
}

/// Strip the `<registry>/` prefix from each search result line
pub fn parse_search_output(registry: &str, stdout: &str) -> Vec<String> {
    let prefix = format!("{}/", registry);
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_prefix(&prefix).unwrap_or(line).to_string())
        .collect()
}
