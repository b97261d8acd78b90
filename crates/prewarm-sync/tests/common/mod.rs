//! Common test helpers for prewarm-sync integration tests
//!
//! - A tag lookup serving fixed upstream tag lists
//! - A job launcher running small shell scripts instead of skopeo
//! - Dispatcher option fixtures with short poll intervals

#![allow(dead_code)]

use async_trait::async_trait;
use prewarm_core::types::{Job, JobArch};
use prewarm_core::{Error, Result};
use prewarm_sync::{DispatchOptions, JobLauncher, PreparedJob, TagLookup, UpstreamTags};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;

// ─── Tag lookup ──────────────────────────────────────────────────────────────

/// Serves upstream tags from a map; unknown repositories fail the lookup
#[derive(Default)]
pub struct StaticLookup {
    repos: HashMap<String, UpstreamTags>,
    pub calls: Arc<Mutex<Vec<(String, JobArch)>>>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(mut self, repository: &str, tags: &[&str]) -> Self {
        self.repos.insert(
            repository.to_string(),
            UpstreamTags {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                architecture: None,
            },
        );
        self
    }

    pub fn with_architecture(mut self, repository: &str, tags: &[&str], arch: &str) -> Self {
        self.repos.insert(
            repository.to_string(),
            UpstreamTags {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                architecture: Some(arch.to_string()),
            },
        );
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TagLookup for StaticLookup {
    async fn upstream_tags(&self, repository: &str, arch: JobArch) -> Result<UpstreamTags> {
        self.calls
            .lock()
            .unwrap()
            .push((repository.to_string(), arch));
        self.repos
            .get(repository)
            .cloned()
            .ok_or_else(|| Error::command(format!("no such repository: {}", repository)))
    }
}

// ─── Job launcher ────────────────────────────────────────────────────────────

/// Runs `sh -c <script>` per job, with per-tag and per-job overrides
pub struct ShellLauncher {
    program: String,
    default_script: String,
    scripts: HashMap<String, String>,
    seq_scripts: HashMap<usize, String>,
    pub launched: Arc<Mutex<Vec<Job>>>,
}

impl ShellLauncher {
    pub fn new(default_script: &str) -> Self {
        Self {
            program: "sh".to_string(),
            default_script: default_script.to_string(),
            scripts: HashMap::new(),
            seq_scripts: HashMap::new(),
            launched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Use a different script for one tag
    pub fn with_tag_script(mut self, tag: &str, script: &str) -> Self {
        self.scripts.insert(tag.to_string(), script.to_string());
        self
    }

    /// Use a different script for the job admitted as `seq`; wins over tag scripts
    pub fn with_seq_script(mut self, seq: usize, script: &str) -> Self {
        self.seq_scripts.insert(seq, script.to_string());
        self
    }

    /// Launch a program that does not exist
    pub fn missing_program() -> Self {
        let mut launcher = Self::new("true");
        launcher.program = "/nonexistent/prewarm-transfer".to_string();
        launcher
    }

    pub fn launched_tags(&self) -> Vec<String> {
        self.launched
            .lock()
            .unwrap()
            .iter()
            .map(|job| job.tag.clone())
            .collect()
    }
}

impl JobLauncher for ShellLauncher {
    fn prepare(&self, job: &Job) -> Result<PreparedJob> {
        self.launched.lock().unwrap().push(job.clone());

        let script = self
            .seq_scripts
            .get(&job.seq)
            .or_else(|| self.scripts.get(&job.tag))
            .unwrap_or(&self.default_script)
            .clone();
        let mut command = Command::new(&self.program);
        command.arg("-c").arg(&script).stdin(Stdio::null());

        Ok(PreparedJob {
            command,
            display: format!("{} -c '{}'", self.program, script),
        })
    }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

pub fn options(log_dir: &Path, max_requests: usize) -> DispatchOptions {
    DispatchOptions::new(log_dir)
        .with_max_requests(max_requests)
        .with_poll_interval(Duration::from_millis(20))
}

pub fn selection(repos: &[&str]) -> Vec<String> {
    repos.iter().map(|r| r.to_string()).collect()
}
