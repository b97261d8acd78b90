//! Upstream tag lookup
//!
//! Tags are read with `skopeo inspect`, which also reports the image
//! architecture. When inspection fails (typically because the repository
//! has no `latest` tag) the lookup falls back to `podman search --list-tags`,
//! which lists tags but knows nothing about architectures.

use async_trait::async_trait;
use prewarm_core::types::JobArch;
use prewarm_core::{Credentials, Error, Result};
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

/// Upper bound on tags requested from the registry search
const SEARCH_TAG_LIMIT: usize = 100_000;

/// Tags reported by the source registry for one repository
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpstreamTags {
    /// Tags in registry order
    pub tags: Vec<String>,
    /// Architecture of the inspected image, when the lookup could tell
    pub architecture: Option<String>,
}

/// Lookup of a repository's upstream tags
#[async_trait]
pub trait TagLookup: Send + Sync {
    async fn upstream_tags(&self, repository: &str, arch: JobArch) -> Result<UpstreamTags>;
}

/// [`TagLookup`] backed by skopeo with a podman search fallback
pub struct SkopeoLookup {
    skopeo: String,
    podman: String,
    registry: String,
    tls_verify: bool,
    credentials: Option<Credentials>,
}

impl SkopeoLookup {
    pub fn new(registry: impl Into<String>, tls_verify: bool) -> Self {
        Self {
            skopeo: "skopeo".to_string(),
            podman: "podman".to_string(),
            registry: registry.into(),
            tls_verify,
            credentials: None,
        }
    }

    pub fn with_binaries(mut self, skopeo: impl Into<String>, podman: impl Into<String>) -> Self {
        self.skopeo = skopeo.into();
        self.podman = podman.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    fn host(&self) -> &str {
        let host = self
            .registry
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.registry);
        host.trim_end_matches('/')
    }

    fn inspect_args(&self, repository: &str, arch: JobArch) -> Vec<String> {
        let mut args = vec![
            "inspect".to_string(),
            format!("--tls-verify={}", self.tls_verify),
        ];
        if let Some(creds) = &self.credentials {
            args.push("--creds".to_string());
            args.push(creds.to_arg());
        }
        if let Some(token) = arch.token() {
            args.push("--override-arch".to_string());
            args.push(token.oci_name().to_string());
        }
        args.push(format!("docker://{}/{}", self.host(), repository));
        args
    }

    fn search_args(&self, repository: &str) -> Vec<String> {
        let mut args = vec![
            "search".to_string(),
            "--list-tags".to_string(),
            "--limit".to_string(),
            SEARCH_TAG_LIMIT.to_string(),
            "--format".to_string(),
            "{{.Tag}}".to_string(),
            format!("--tls-verify={}", self.tls_verify),
        ];
        if let Some(creds) = &self.credentials {
            args.push("--creds".to_string());
            args.push(creds.to_arg());
        }
        args.push(format!("{}/{}", self.host(), repository));
        args
    }

    async fn inspect(&self, repository: &str, arch: JobArch) -> Result<UpstreamTags> {
        let output = run(&self.skopeo, self.inspect_args(repository, arch)).await?;
        if !output.status.success() {
            return Err(Error::command(format!(
                "{} inspect {} failed: {}",
                self.skopeo,
                repository,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let inspected: InspectOutput = serde_json::from_slice(&output.stdout)?;
        Ok(UpstreamTags {
            tags: inspected.repo_tags,
            architecture: inspected.architecture.filter(|a| !a.is_empty()),
        })
    }

    async fn search(&self, repository: &str) -> Result<UpstreamTags> {
        let output = run(&self.podman, self.search_args(repository)).await?;
        if !output.status.success() {
            return Err(Error::command(format!(
                "{} search --list-tags {} failed: {}",
                self.podman,
                repository,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let tags = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(UpstreamTags {
            tags,
            architecture: None,
        })
    }
}

#[async_trait]
impl TagLookup for SkopeoLookup {
    async fn upstream_tags(&self, repository: &str, arch: JobArch) -> Result<UpstreamTags> {
        match self.inspect(repository, arch).await {
            Ok(upstream) => {
                trace!("{}: inspect reported {} tags", repository, upstream.tags.len());
                Ok(upstream)
            }
            Err(inspect_err) => {
                debug!("{}: {}, falling back to search", repository, inspect_err);
                self.search(repository).await.map_err(|search_err| {
                    Error::command(format!(
                        "Failed to read tags of {}: {}; {}",
                        repository, inspect_err, search_err
                    ))
                })
            }
        }
    }
}

async fn run(program: &str, args: Vec<String>) -> Result<std::process::Output> {
    Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::command(format!("Failed to run {}: {}", program, e)))
}

#[derive(Debug, Deserialize)]
struct InspectOutput {
    #[serde(rename = "RepoTags", default)]
    repo_tags: Vec<String>,
    #[serde(rename = "Architecture", default)]
    architecture: Option<String>,
}
