//! Bounded transfer dispatch
//!
//! Jobs are admitted in selection order, one per pending (repository, tag,
//! arch). While the number of live transfers is at the ceiling the dispatcher
//! polls the children it owns and sleeps between polls. The dispatcher is the
//! only writer of tag records while transfers run, so reverting a failed tag
//! never races another job on the same record.

use crate::inspect::TagLookup;
use crate::tags::{TagDiffer, TagStore};
use crate::transfer::JobLauncher;
use chrono::Utc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use prewarm_core::config::{DEFAULT_MAX_REQUESTS, DEFAULT_POLL_INTERVAL_SECS};
use prewarm_core::types::{Job, JobArch, JobOutcome};
use prewarm_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, error, info, warn};

/// Last header line of a job log; the transfer output follows it
pub const LOG_OUTPUT_MARKER: &str = "# --- output ---";

/// Future that resolves when the run should stop
pub type ShutdownSignal<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Dispatch tunables
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Ceiling on live transfer processes
    pub max_requests: usize,
    /// Sleep between liveness polls while at the ceiling or draining
    pub poll_interval: Duration,
    /// Per-job logs are written below this directory
    pub log_dir: PathBuf,
    /// Only list candidates, touch nothing
    pub dry_run: bool,
}

impl DispatchOptions {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            log_dir: log_dir.into(),
            dry_run: false,
        }
    }

    pub fn with_max_requests(mut self, max_requests: usize) -> Self {
        self.max_requests = max_requests.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// What a dispatch run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// (repository, arch) pairs listed by a dry run
    pub candidates: usize,
    /// Transfer processes started
    pub admitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub interrupted: usize,
    /// Pairs skipped because their upstream tags could not be read
    pub skipped: usize,
    /// Highest number of simultaneously live transfers
    pub peak_live: usize,
    /// Jobs that exited unsuccessfully, in completion order
    pub failed_jobs: Vec<Job>,
}

impl DispatchReport {
    /// No failed transfers and no skipped pairs
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

struct RunningJob {
    job: Job,
    child: Child,
    log_path: PathBuf,
}

/// Admits transfer jobs under a concurrency ceiling
pub struct Dispatcher<'a> {
    options: DispatchOptions,
    store: &'a TagStore,
    lookup: &'a dyn TagLookup,
    launcher: &'a dyn JobLauncher,
    shutdown: ShutdownSignal<'a>,
    running: Vec<RunningJob>,
    report: DispatchReport,
    next_seq: usize,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        options: DispatchOptions,
        store: &'a TagStore,
        lookup: &'a dyn TagLookup,
        launcher: &'a dyn JobLauncher,
    ) -> Self {
        Self {
            options,
            store,
            lookup,
            launcher,
            shutdown: Box::pin(std::future::pending()),
            running: Vec::new(),
            report: DispatchReport::default(),
            next_seq: 0,
        }
    }

    /// Stop the run when `signal` resolves
    ///
    /// Live transfers are sent SIGTERM, awaited and their tags reverted; the
    /// run then fails with [`Error::Interrupted`].
    pub fn with_shutdown(mut self, signal: impl Future<Output = ()> + Send + 'a) -> Self {
        self.shutdown = Box::pin(signal);
        self
    }

    /// Per-job log location: `<log_dir>/<repository>/<tag>-<arch>.log`
    ///
    /// A repository listed twice can queue the same tag again while the first
    /// transfer is still live. That job logs to `<tag>-<arch>.<seq>.log` so
    /// neither job truncates or removes the other's log.
    pub fn job_log_path(&self, job: &Job) -> PathBuf {
        let dir = self
            .options
            .log_dir
            .join(job.repository.trim_start_matches('/'));
        let path = dir.join(format!("{}-{}.log", job.tag, job.arch));
        if self.running.iter().any(|r| r.log_path == path) {
            return dir.join(format!("{}-{}.{}.log", job.tag, job.arch, job.seq));
        }
        path
    }

    /// Dispatch every pending tag of every selected repository
    ///
    /// Transfer failures and unreadable upstream tags are recorded in the
    /// report. An interrupt, a transfer process that cannot be started or a
    /// tag record that cannot be read or written end the run early.
    pub async fn run(mut self, selection: &[String], arches: &[JobArch]) -> Result<DispatchReport> {
        if self.options.dry_run {
            self.list_candidates(selection, arches);
            return Ok(self.report);
        }

        let differ = TagDiffer::new(self.store, self.lookup);
        for repository in selection {
            for &arch in arches {
                let lookup = differ.pending_tags(repository, arch);
                let pending = tokio::select! {
                    result = lookup => result,
                    _ = &mut self.shutdown => return Err(self.interrupt().await),
                };

                let pending = match pending {
                    Ok(tags) => tags,
                    Err(e @ Error::Command { .. }) => {
                        warn!("Skipping {} [{}]: {}", repository, arch, e);
                        self.report.skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        error!("Tag record of {} [{}] unusable: {}", repository, arch, e);
                        self.terminate_all().await;
                        return Err(e);
                    }
                };

                let mut remaining = pending.into_iter();
                while let Some(tag) = remaining.next() {
                    if let Err(e) = self.wait_below(self.options.max_requests).await {
                        let unadmitted: Vec<String> =
                            std::iter::once(tag).chain(remaining).collect();
                        self.revert_unadmitted(repository, arch, &unadmitted);
                        return Err(e);
                    }

                    self.next_seq += 1;
                    let job = Job::new(self.next_seq, repository.as_str(), tag, arch);
                    if let Err(e) = self.launch(&job) {
                        error!("Failed to start transfer of {}: {}", job, e);
                        let unadmitted: Vec<String> =
                            std::iter::once(job.tag.clone()).chain(remaining).collect();
                        self.revert_unadmitted(repository, arch, &unadmitted);
                        self.terminate_all().await;
                        return Err(e);
                    }
                }
            }
        }

        self.wait_below(1).await?;
        Ok(self.report)
    }

    fn list_candidates(&mut self, selection: &[String], arches: &[JobArch]) {
        for repository in selection {
            for arch in arches {
                self.next_seq += 1;
                self.report.candidates += 1;
                info!("  ({}) - {} [{}]", self.next_seq, repository, arch);
            }
        }
    }

    fn launch(&mut self, job: &Job) -> Result<()> {
        let prepared = self.launcher.prepare(job)?;
        let log_path = self.job_log_path(job);
        let log = open_job_log(&log_path, job, &prepared.display)?;

        let mut command = prepared.command;
        command
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| Error::command(format!("Failed to spawn transfer for {}: {}", job, e)))?;

        info!("({}) Transferring {}", job.seq, job);
        self.running.push(RunningJob {
            job: job.clone(),
            child,
            log_path,
        });
        self.report.admitted += 1;
        self.report.peak_live = self.report.peak_live.max(self.running.len());
        Ok(())
    }

    /// Poll until fewer than `limit` transfers are live
    async fn wait_below(&mut self, limit: usize) -> Result<()> {
        loop {
            self.reap();
            if self.running.len() < limit {
                return Ok(());
            }

            let poll = tokio::time::sleep(self.options.poll_interval);
            tokio::select! {
                _ = poll => {}
                _ = &mut self.shutdown => return Err(self.interrupt().await),
            }
        }
    }

    /// Collect every child that has exited
    fn reap(&mut self) {
        let mut index = 0;
        while index < self.running.len() {
            match self.running[index].child.try_wait() {
                Ok(None) => index += 1,
                Ok(Some(status)) => {
                    let finished = self.running.remove(index);
                    let outcome = if status.success() {
                        JobOutcome::Succeeded
                    } else {
                        debug!("{} exited with {}", finished.job, status);
                        JobOutcome::Failed
                    };
                    self.finish(finished, outcome);
                }
                Err(e) => {
                    let finished = self.running.remove(index);
                    warn!("Lost track of transfer {}: {}", finished.job, e);
                    self.finish(finished, JobOutcome::Failed);
                }
            }
        }
    }

    fn finish(&mut self, finished: RunningJob, outcome: JobOutcome) {
        let RunningJob { job, log_path, .. } = finished;
        match outcome {
            JobOutcome::Succeeded => {
                self.report.succeeded += 1;
                debug!("({}) Finished {}", job.seq, job);
                if let Err(e) = std::fs::remove_file(&log_path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove {}: {}", log_path.display(), e);
                    }
                }
            }
            JobOutcome::Failed => {
                self.report.failed += 1;
                warn!(
                    "({}) Transfer of {} failed, see {}",
                    job.seq,
                    job,
                    log_path.display()
                );
                self.revert(&job);
                self.report.failed_jobs.push(job);
            }
            JobOutcome::Interrupted => {
                self.report.interrupted += 1;
                self.revert(&job);
            }
        }
    }

    fn revert(&self, job: &Job) {
        if let Err(e) = self.store.revert(&job.repository, job.arch, &job.tag) {
            error!("Failed to revert {} in tag record: {}", job, e);
        }
    }

    /// Tags recorded as attempted whose job never started
    fn revert_unadmitted(&self, repository: &str, arch: JobArch, tags: &[String]) {
        if let Err(e) = self.store.revert_all(repository, arch, tags) {
            error!(
                "Failed to revert {} unstarted tags of {} [{}]: {}",
                tags.len(),
                repository,
                arch,
                e
            );
        }
    }

    async fn interrupt(&mut self) -> Error {
        warn!(
            "Interrupted, terminating {} running transfers",
            self.running.len()
        );
        self.terminate_all().await;
        Error::Interrupted
    }

    /// SIGTERM every live child, wait for all of them and settle their tags
    async fn terminate_all(&mut self) {
        let running = std::mem::take(&mut self.running);

        for entry in &running {
            if let Some(pid) = entry.child.id() {
                if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    debug!("SIGTERM to {} ({}) failed: {}", entry.job, pid, e);
                }
            }
        }

        for mut entry in running {
            let outcome = match entry.child.wait().await {
                Ok(status) if status.success() => JobOutcome::Succeeded,
                Ok(_) => JobOutcome::Interrupted,
                Err(e) => {
                    warn!("Failed to wait for {}: {}", entry.job, e);
                    JobOutcome::Interrupted
                }
            };
            self.finish(entry, outcome);
        }
    }
}

fn open_job_log(path: &Path, job: &Job, command: &str) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    writeln!(file, "# Job: {}", job)?;
    writeln!(
        file,
        "# Started: {}",
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    )?;
    writeln!(file, "# Command: {}", command)?;
    writeln!(file, "{}", LOG_OUTPUT_MARKER)?;
    Ok(file)
}
