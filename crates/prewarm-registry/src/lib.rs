//! Ephemeral pull-through registry for prewarm
//!
//! `--updatecache local://distribution:<DIR>` primes a registry that does not
//! exist yet: a distribution container is started with its storage in `DIR`,
//! proxying the source registry, and removed again when the run ends.

pub mod config;
pub mod local;

pub use config::DistributionConfig;
pub use local::{run_args, LocalDistribution, CONTAINER_PREFIX};
