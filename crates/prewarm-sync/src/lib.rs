//! Cache update engine for prewarm
//!
//! ```text
//! TagLookup ──> TagDiffer ──> Dispatcher ──> JobLauncher (skopeo copy)
//!                  │              │
//!                  └── TagStore <─┘ revert on failure
//!
//! LogConsolidator: leftover job logs ──> <log_dir>.log
//! ```

pub mod consolidate;
pub mod dispatcher;
pub mod inspect;
pub mod tags;
pub mod transfer;

pub use consolidate::{LogConsolidator, EMPTY_LOG_MARKER};
pub use dispatcher::{
    DispatchOptions, DispatchReport, Dispatcher, ShutdownSignal, LOG_OUTPUT_MARKER,
};
pub use inspect::{SkopeoLookup, TagLookup, UpstreamTags};
pub use tags::{TagDiffer, TagStore};
pub use transfer::{JobLauncher, PreparedJob, SkopeoTransfer, DISCARD_SINK};
