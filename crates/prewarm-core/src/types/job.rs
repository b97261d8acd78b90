//! Transfer jobs

use super::arch::JobArch;
use crate::credentials::Credentials;
use camino::Utf8PathBuf;
use std::fmt;

/// The literal tag that always points at the newest image
pub const LATEST_TAG: &str = "latest";

/// Where a transferred image ends up
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Destination {
    /// Pull through the proxy and write the image to `/dev/null`.
    /// The proxy cache fill is the only lasting effect.
    #[default]
    Discard,

    /// Store as an OCI layout below the given directory
    OciDir(Utf8PathBuf),

    /// Push into a repository as `<basename>-<tag>-<arch>`
    Push {
        repository: String,
        credentials: Option<Credentials>,
    },
}

/// One unit of transfer work: a single tag of a single repository for one architecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Admission sequence number, starting at 1
    pub seq: usize,
    pub repository: String,
    pub tag: String,
    pub arch: JobArch,
}

impl Job {
    pub fn new(
        seq: usize,
        repository: impl Into<String>,
        tag: impl Into<String>,
        arch: JobArch,
    ) -> Self {
        Self {
            seq,
            repository: repository.into(),
            tag: tag.into(),
            arch,
        }
    }

    /// Last path segment of the repository
    pub fn basename(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} [{}]", self.repository, self.tag, self.arch)
    }
}

/// How a job finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Transfer tool exited zero
    Succeeded,
    /// Transfer tool exited non-zero or was killed by a signal it did not expect
    Failed,
    /// Terminated by prewarm because the run was interrupted
    Interrupted,
}
