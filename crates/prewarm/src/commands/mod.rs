//! CLI command implementations

pub mod archs;
pub mod update;
