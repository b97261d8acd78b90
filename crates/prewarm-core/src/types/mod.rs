//! Shared domain types

mod arch;
mod job;

pub use arch::{ArchSelection, ArchToken, JobArch, ALL_ARCHES};
pub use job::{Destination, Job, JobOutcome, LATEST_TAG};
