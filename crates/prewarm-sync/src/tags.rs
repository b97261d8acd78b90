//! Tag records and the upstream delta
//!
//! Every (repository, architecture) pair owns one record file at
//! `<root>/<repository>/<arch>.tags`, one tag per line. A record lists the
//! tags that were already attempted, so the next run only transfers what
//! upstream added since. `latest` is never recorded because it moves.

use crate::inspect::TagLookup;
use prewarm_core::types::{JobArch, LATEST_TAG};
use prewarm_core::Result;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Durable per-(repository, arch) tag records
#[derive(Debug, Clone)]
pub struct TagStore {
    root: PathBuf,
}

impl TagStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the record for one pair
    pub fn record_path(&self, repository: &str, arch: JobArch) -> PathBuf {
        self.root
            .join(repository.trim_start_matches('/'))
            .join(format!("{}.tags", arch))
    }

    /// Recorded tags in file order; an absent record is empty
    pub fn load(&self, repository: &str, arch: JobArch) -> Result<Vec<String>> {
        let path = self.record_path(repository, arch);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the record for one pair
    ///
    /// The file is written next to its final location and renamed into place,
    /// so a crash never leaves a truncated record behind.
    pub fn save(&self, repository: &str, arch: JobArch, tags: &[String]) -> Result<()> {
        let path = self.record_path(repository, arch);
        let dir = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        for tag in tags {
            writeln!(file, "{}", tag)?;
        }
        file.flush()?;
        file.persist(&path).map_err(|e| e.error)?;
        debug!("Recorded {} tags in {}", tags.len(), path.display());
        Ok(())
    }

    /// Record every upstream tag as attempted, keeping earlier entries
    pub fn record_attempted(
        &self,
        repository: &str,
        arch: JobArch,
        recorded: &[String],
        upstream: &[String],
    ) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        let merged: Vec<String> = recorded
            .iter()
            .chain(upstream.iter())
            .filter(|tag| tag.as_str() != LATEST_TAG)
            .filter(|tag| seen.insert(tag.as_str()))
            .cloned()
            .collect();
        self.save(repository, arch, &merged)
    }

    /// Drop one tag from a record so the next run retries it
    ///
    /// Returns whether the tag was present.
    pub fn revert(&self, repository: &str, arch: JobArch, tag: &str) -> Result<bool> {
        Ok(self.revert_all(repository, arch, &[tag.to_string()])? > 0)
    }

    /// Drop several tags from a record in one rewrite, returning how many were present
    pub fn revert_all(&self, repository: &str, arch: JobArch, tags: &[String]) -> Result<usize> {
        let recorded = self.load(repository, arch)?;
        let remaining: Vec<String> = recorded
            .iter()
            .filter(|t| !tags.contains(t))
            .cloned()
            .collect();
        let removed = recorded.len() - remaining.len();
        if removed > 0 {
            self.save(repository, arch, &remaining)?;
            debug!("Reverted {} tags of {} [{}]", removed, repository, arch);
        }
        Ok(removed)
    }
}

/// Computes the tags still to transfer for one pair
pub struct TagDiffer<'a> {
    store: &'a TagStore,
    lookup: &'a dyn TagLookup,
}

impl<'a> TagDiffer<'a> {
    pub fn new(store: &'a TagStore, lookup: &'a dyn TagLookup) -> Self {
        Self { store, lookup }
    }

    /// Upstream tags not yet recorded, in upstream order
    ///
    /// Every upstream tag is recorded as attempted before this returns; the
    /// dispatcher reverts the ones whose transfer does not succeed. When the
    /// inspected image reports a different architecture than requested the
    /// pair has nothing to do and the record is left alone.
    pub async fn pending_tags(&self, repository: &str, arch: JobArch) -> Result<Vec<String>> {
        let upstream = self.lookup.upstream_tags(repository, arch).await?;

        if let (Some(token), Some(reported)) = (arch.token(), upstream.architecture.as_deref()) {
            if reported != token.oci_name() {
                info!(
                    "{}: image is {} but {} was requested, skipping",
                    repository,
                    reported,
                    token.oci_name()
                );
                return Ok(Vec::new());
            }
        }

        let recorded = self.store.load(repository, arch)?;
        let known: HashSet<&str> = recorded.iter().map(String::as_str).collect();

        let mut queued: HashSet<&str> = HashSet::new();
        let pending: Vec<String> = upstream
            .tags
            .iter()
            .filter(|tag| !known.contains(tag.as_str()))
            .filter(|tag| queued.insert(tag.as_str()))
            .cloned()
            .collect();

        self.store
            .record_attempted(repository, arch, &recorded, &upstream.tags)?;

        debug!(
            "{} [{}]: {} upstream, {} recorded, {} pending",
            repository,
            arch,
            upstream.tags.len(),
            recorded.len(),
            pending.len()
        );
        Ok(pending)
    }
}
