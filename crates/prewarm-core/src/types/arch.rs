//! Architecture tokens and the per-run architecture selection

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Special architecture value asking the transfer tool for every platform variant
pub const ALL_ARCHES: &str = "all";

/// Architecture names prewarm can match in policy paths and pass to the transfer tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArchToken {
    #[serde(rename = "amd64")]
    Amd64,
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "aarch64")]
    Aarch64,
    #[serde(rename = "s390x")]
    S390x,
    #[serde(rename = "ppc64el")]
    Ppc64el,
    #[serde(rename = "ppc64le")]
    Ppc64le,
}

impl ArchToken {
    /// Every known token, in the order they are listed to users
    pub const KNOWN: [ArchToken; 7] = [
        ArchToken::Amd64,
        ArchToken::X86_64,
        ArchToken::Arm64,
        ArchToken::Aarch64,
        ArchToken::S390x,
        ArchToken::Ppc64el,
        ArchToken::Ppc64le,
    ];

    /// Token as it appears in repository paths and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchToken::Amd64 => "amd64",
            ArchToken::X86_64 => "x86_64",
            ArchToken::Arm64 => "arm64",
            ArchToken::Aarch64 => "aarch64",
            ArchToken::S390x => "s390x",
            ArchToken::Ppc64el => "ppc64el",
            ArchToken::Ppc64le => "ppc64le",
        }
    }

    /// Platform name understood by OCI tooling (`--override-arch`, image config)
    pub fn oci_name(&self) -> &'static str {
        match self {
            ArchToken::Amd64 | ArchToken::X86_64 => "amd64",
            ArchToken::Arm64 | ArchToken::Aarch64 => "arm64",
            ArchToken::S390x => "s390x",
            ArchToken::Ppc64el | ArchToken::Ppc64le => "ppc64le",
        }
    }

    /// Names of all known tokens
    pub fn names() -> Vec<&'static str> {
        Self::KNOWN.iter().map(|a| a.as_str()).collect()
    }
}

impl fmt::Display for ArchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::KNOWN
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                Error::configuration(format!(
                    "Unknown architecture '{}'. Valid architectures: {}, {}",
                    s,
                    Self::names().join(", "),
                    ALL_ARCHES
                ))
            })
    }
}

/// Architecture a single job runs for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobArch {
    /// Let the transfer tool copy every platform variant in one call
    All,
    /// One specific platform
    Single(ArchToken),
}

impl JobArch {
    /// Name used in tag store and log file paths
    pub fn as_str(&self) -> &'static str {
        match self {
            JobArch::All => ALL_ARCHES,
            JobArch::Single(arch) => arch.as_str(),
        }
    }

    /// The specific token, if any
    pub fn token(&self) -> Option<ArchToken> {
        match self {
            JobArch::All => None,
            JobArch::Single(arch) => Some(*arch),
        }
    }
}

impl fmt::Display for JobArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architectures requested for a run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArchSelection {
    /// No `--arch` given, or `--arch all`
    #[default]
    All,
    /// One or more specific architectures
    Only(Vec<ArchToken>),
}

impl ArchSelection {
    /// Build a selection from raw `--arch` values
    ///
    /// `all` must stand alone; mixing it with a specific token is rejected.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        if names.is_empty() {
            return Ok(ArchSelection::All);
        }

        let has_all = names.iter().any(|n| n.as_ref() == ALL_ARCHES);
        if has_all {
            if names.len() > 1 {
                return Err(Error::configuration(
                    "--arch all cannot be combined with a specific architecture",
                ));
            }
            return Ok(ArchSelection::All);
        }

        let mut arches = Vec::with_capacity(names.len());
        for name in names {
            let arch: ArchToken = name.as_ref().parse()?;
            if !arches.contains(&arch) {
                arches.push(arch);
            }
        }
        Ok(ArchSelection::Only(arches))
    }

    /// Allow-list for policy path pruning, `None` when every arch is allowed
    pub fn allow_list(&self) -> Option<&[ArchToken]> {
        match self {
            ArchSelection::All => None,
            ArchSelection::Only(arches) => Some(arches),
        }
    }

    /// One entry per job architecture
    pub fn job_arches(&self) -> Vec<JobArch> {
        match self {
            ArchSelection::All => vec![JobArch::All],
            ArchSelection::Only(arches) => arches.iter().copied().map(JobArch::Single).collect(),
        }
    }
}
