//! Transfer process construction
//!
//! A transfer pulls one tag through the proxy with `skopeo copy`. Pulling is
//! what fills the cache; the destination only decides whether the copy is
//! thrown away, kept as an OCI layout or pushed somewhere else.

use prewarm_core::types::{Destination, Job, JobArch};
use prewarm_core::{Credentials, Result};
use std::process::Stdio;
use tokio::process::Command;

/// Sink for discarded copies; the archive is written straight into it
pub const DISCARD_SINK: &str = "/dev/null";

/// A ready-to-spawn transfer
pub struct PreparedJob {
    /// Output redirection is left to the dispatcher
    pub command: Command,
    /// Human readable command line for the job log header
    pub display: String,
}

/// Builds the process for a job
///
/// The dispatcher only needs something that turns a [`Job`] into a command.
pub trait JobLauncher: Send + Sync {
    fn prepare(&self, job: &Job) -> Result<PreparedJob>;
}

/// `skopeo copy` from the proxy into the configured destination
pub struct SkopeoTransfer {
    skopeo: String,
    proxy: String,
    tls_verify: bool,
    credentials: Option<Credentials>,
    destination: Destination,
    remove_signatures: bool,
}

impl SkopeoTransfer {
    pub fn new(proxy: impl Into<String>, destination: Destination) -> Self {
        Self {
            skopeo: "skopeo".to_string(),
            proxy: proxy.into(),
            tls_verify: true,
            credentials: None,
            destination,
            remove_signatures: false,
        }
    }

    pub fn with_binary(mut self, skopeo: impl Into<String>) -> Self {
        self.skopeo = skopeo.into();
        self
    }

    pub fn with_tls_verify(mut self, tls_verify: bool) -> Self {
        self.tls_verify = tls_verify;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_remove_signatures(mut self, remove_signatures: bool) -> Self {
        self.remove_signatures = remove_signatures;
        self
    }

    fn proxy_host(&self) -> &str {
        let host = self
            .proxy
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.proxy);
        host.trim_end_matches('/')
    }

    /// Source reference on the proxy
    pub fn source_ref(&self, job: &Job) -> String {
        format!("docker://{}/{}:{}", self.proxy_host(), job.repository, job.tag)
    }

    /// Destination reference
    pub fn destination_ref(&self, job: &Job) -> String {
        match &self.destination {
            Destination::Discard => format!("oci-archive:{}:{}", DISCARD_SINK, job.tag),
            Destination::OciDir(root) => match job.arch {
                JobArch::All => format!("oci:{}/{}:{}", root, job.repository, job.tag),
                JobArch::Single(arch) => {
                    format!("oci:{}/{}:{}-{}", root, job.repository, job.tag, arch)
                }
            },
            Destination::Push { repository, .. } => match job.arch {
                JobArch::All => format!(
                    "docker://{}:{}-{}",
                    repository.trim_end_matches('/'),
                    job.basename(),
                    job.tag
                ),
                JobArch::Single(arch) => format!(
                    "docker://{}:{}-{}-{}",
                    repository.trim_end_matches('/'),
                    job.basename(),
                    job.tag,
                    arch
                ),
            },
        }
    }

    /// Arguments of `skopeo copy` for a job
    pub fn copy_args(&self, job: &Job) -> Vec<String> {
        let mut args = vec!["copy".to_string()];

        match job.arch.token() {
            Some(arch) => {
                args.push("--override-arch".to_string());
                args.push(arch.oci_name().to_string());
            }
            None => {
                args.push("--multi-arch".to_string());
                args.push("all".to_string());
            }
        }

        args.push(format!("--src-tls-verify={}", self.tls_verify));
        if let Some(creds) = &self.credentials {
            args.push("--src-creds".to_string());
            args.push(creds.to_arg());
        }

        if let Destination::Push {
            credentials: Some(creds),
            ..
        } = &self.destination
        {
            args.push("--dest-creds".to_string());
            args.push(creds.to_arg());
        }

        if self.remove_signatures {
            args.push("--remove-signatures".to_string());
        }

        args.push(self.source_ref(job));
        args.push(self.destination_ref(job));
        args
    }
}

impl JobLauncher for SkopeoTransfer {
    fn prepare(&self, job: &Job) -> Result<PreparedJob> {
        if let Destination::OciDir(root) = &self.destination {
            let layout = root.join(&job.repository);
            let parent = layout.parent().unwrap_or(root.as_path());
            std::fs::create_dir_all(parent)?;
        }

        let args = self.copy_args(job);
        let display = redact(&self.skopeo, &args);

        let mut command = Command::new(&self.skopeo);
        command.args(&args).stdin(Stdio::null());

        Ok(PreparedJob { command, display })
    }
}

/// Command line with credential values masked
fn redact(program: &str, args: &[String]) -> String {
    let mut parts = vec![program.to_string()];
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            parts.push("***".to_string());
            mask_next = false;
            continue;
        }
        mask_next = matches!(arg.as_str(), "--src-creds" | "--dest-creds");
        parts.push(arg.clone());
    }
    parts.join(" ")
}
