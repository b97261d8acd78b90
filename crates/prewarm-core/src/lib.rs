//! # prewarm-core
//!
//! Core library for prewarm providing:
//! - The error taxonomy shared by every crate
//! - Architecture tokens, selections and transfer job types
//! - Credential parsing
//! - Settings file loading and the validated run configuration

pub mod config;
pub mod credentials;
pub mod error;
pub mod types;

pub use config::{CatalogStrategy, ProxyTarget, RunConfig, Settings};
pub use credentials::Credentials;
pub use error::{Error, Result};
