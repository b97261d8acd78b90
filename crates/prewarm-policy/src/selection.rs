//! Repository selection
//!
//! Narrows the raw catalog down to the run's work list. The compiled policy
//! is applied first, the ad-hoc expression second, and the result is sorted
//! so runs are admitted in a deterministic order.

use crate::compiler::CompiledPolicy;
use prewarm_core::{Error, Result};
use regex::Regex;
use tracing::debug;

/// Policy and ad-hoc pattern filters for one run
#[derive(Debug, Clone, Default)]
pub struct SelectionFilter {
    policy: Option<CompiledPolicy>,
    pattern: Option<Regex>,
}

impl SelectionFilter {
    /// Build a filter; an invalid ad-hoc expression fails the whole run
    ///
    /// The expression must match at the start of the repository name.
    pub fn new(policy: Option<CompiledPolicy>, pattern: Option<&str>) -> Result<Self> {
        let pattern = pattern
            .map(|expr| {
                Regex::new(&format!("^(?:{})", expr))
                    .map_err(|e| Error::filter_expression(expr, e.to_string()))
            })
            .transpose()?;

        Ok(Self { policy, pattern })
    }

    /// Apply the filters to a raw repository list
    ///
    /// Duplicates are kept; each occurrence is processed on its own.
    pub fn apply(&self, repositories: Vec<String>) -> Vec<String> {
        let total = repositories.len();
        let mut selected: Vec<String> = repositories
            .into_iter()
            .map(|name| match name.strip_prefix('/') {
                Some(stripped) => stripped.to_string(),
                None => name,
            })
            .collect();

        if let Some(policy) = &self.policy {
            selected.retain(|name| policy.first_match(name).is_some());
            debug!("After policy filter: {} repositories", selected.len());
        }

        if let Some(pattern) = &self.pattern {
            selected.retain(|name| pattern.is_match(name));
            debug!("After expression filter: {} repositories", selected.len());
        }

        selected.sort();
        debug!("Selected {} of {} repositories", selected.len(), total);
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{PolicyCompiler, PolicyDocument};

    fn repos(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_pattern_scenario() {
        let filter = SelectionFilter::new(None, Some("a/.*")).unwrap();
        assert_eq!(filter.apply(repos(&["b/y", "a/x"])), repos(&["a/x"]));
    }

    #[test]
    fn test_pattern_is_anchored_at_start() {
        let filter = SelectionFilter::new(None, Some("a/.*")).unwrap();
        assert!(filter.apply(repos(&["ba/x"])).is_empty());
    }

    #[test]
    fn test_invalid_pattern_fails() {
        let err = SelectionFilter::new(None, Some("a/(")).unwrap_err();
        assert!(matches!(err, Error::FilterExpression { .. }));
    }

    #[test]
    fn test_no_filters_sorts_and_keeps_duplicates() {
        let filter = SelectionFilter::new(None, None).unwrap();
        assert_eq!(
            filter.apply(repos(&["c", "/a", "b", "a"])),
            repos(&["a", "a", "b", "c"])
        );
    }

    #[test]
    fn test_policy_then_pattern() {
        let doc = PolicyDocument::from_yaml("t", "base:\n  - \"*\"\nimages:\n  - foo/**\n").unwrap();
        let policy = PolicyCompiler::new().compile(&doc).unwrap();

        let filter = SelectionFilter::new(Some(policy.clone()), None).unwrap();
        assert_eq!(
            filter.apply(repos(&["foo/x86_64/qux", "bar", "foo/baz/qux", "x/y"])),
            repos(&["bar", "foo/baz/qux", "foo/x86_64/qux"])
        );

        let filter = SelectionFilter::new(Some(policy), Some("foo/")).unwrap();
        assert_eq!(
            filter.apply(repos(&["foo/x86_64/qux", "bar", "foo/baz/qux"])),
            repos(&["foo/baz/qux", "foo/x86_64/qux"])
        );
    }

    #[test]
    fn test_empty_policy_selects_nothing() {
        let filter = SelectionFilter::new(Some(CompiledPolicy::default()), None).unwrap();
        assert!(filter.apply(repos(&["a", "b"])).is_empty());
    }
}
