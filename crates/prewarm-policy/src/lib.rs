//! Catalog policy handling for prewarm
//!
//! - [`PolicyDocument`] parses the allow-list YAML
//! - [`PolicyCompiler`] turns it into anchored matchers, pruning rules for
//!   architectures the run does not cover
//! - [`SelectionFilter`] applies the policy and an ad-hoc expression to the
//!   raw catalog

pub mod compiler;
pub mod selection;

pub use compiler::{
    translate_glob, CompiledPolicy, CompiledRule, PolicyCompiler, PolicyDocument, PolicySection,
};
pub use selection::SelectionFilter;
