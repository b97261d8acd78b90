//! Policy compiler
//!
//! A policy is a YAML mapping from section name to a list of glob patterns
//! over repository names:
//!
//! ```yaml
//! base:
//!   - "*"
//! images:
//!   - "suse/sle15/**"
//!   - "suse/manager/5.0/x86_64/*"
//! ```
//!
//! `*` matches within one path segment, `**` matches across segments. Every
//! other character is literal. Patterns naming an architecture outside the
//! run's allow-list are pruned before compilation.

use camino::Utf8Path;
use prewarm_core::types::ArchToken;
use prewarm_core::{Error, Result};
use regex::Regex;
use serde_yaml_ng::Value;
use tracing::{debug, trace};

/// A named group of raw patterns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySection {
    pub name: String,
    pub patterns: Vec<String>,
}

/// Parsed, not yet compiled, policy document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicyDocument {
    pub sections: Vec<PolicySection>,
}

impl PolicyDocument {
    /// Read and parse a policy file
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::policy_parse(path.as_str(), e.to_string()))?;
        Self::from_yaml(path.as_str(), &content)
    }

    /// Parse a policy document, keeping section and pattern order
    pub fn from_yaml(source_name: &str, content: &str) -> Result<Self> {
        let value: Value = serde_yaml_ng::from_str(content)
            .map_err(|e| Error::policy_parse(source_name, e.to_string()))?;

        let mapping = match value {
            Value::Mapping(mapping) => mapping,
            Value::Null => {
                return Err(Error::policy_parse(source_name, "policy document is empty"))
            }
            _ => {
                return Err(Error::policy_parse(
                    source_name,
                    "expected a mapping of section names to pattern lists",
                ))
            }
        };

        let mut sections = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let name = match key {
                Value::String(name) => name,
                other => {
                    return Err(Error::policy_parse(
                        source_name,
                        format!("section name must be a string, got {:?}", other),
                    ))
                }
            };

            let patterns = match value {
                Value::Null => Vec::new(),
                Value::Sequence(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(pattern) => Ok(pattern),
                        other => Err(Error::policy_parse(
                            source_name,
                            format!("section '{}': pattern must be a string, got {:?}", name, other),
                        )),
                    })
                    .collect::<Result<Vec<_>>>()?,
                _ => {
                    return Err(Error::policy_parse(
                        source_name,
                        format!("section '{}' must be a list of patterns", name),
                    ))
                }
            };

            sections.push(PolicySection { name, patterns });
        }

        Ok(Self { sections })
    }
}

/// One compiled matcher, with the section and glob it came from
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub section: String,
    pub pattern: String,
    regex: Regex,
}

impl CompiledRule {
    pub fn is_match(&self, repository: &str) -> bool {
        self.regex.is_match(repository)
    }

    /// The anchored regular expression this rule compiled to
    pub fn as_regex(&self) -> &str {
        self.regex.as_str()
    }
}

/// Ordered sequence of compiled rules
#[derive(Debug, Clone, Default)]
pub struct CompiledPolicy {
    rules: Vec<CompiledRule>,
}

impl CompiledPolicy {
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule matching the repository, in document order
    pub fn first_match(&self, repository: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.is_match(repository))
    }
}

/// Compiles policy documents for one run
#[derive(Debug, Clone, Default)]
pub struct PolicyCompiler {
    skip_sections: Vec<String>,
    allow_list: Option<Vec<ArchToken>>,
}

impl PolicyCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sections to leave out entirely
    pub fn with_skip_sections(mut self, sections: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.skip_sections = sections.into_iter().map(Into::into).collect();
        self
    }

    /// Architectures to keep; patterns naming any other known architecture are dropped
    pub fn with_allowed_arches(mut self, arches: Option<&[ArchToken]>) -> Self {
        self.allow_list = arches.map(|a| a.to_vec());
        self
    }

    pub fn compile(&self, document: &PolicyDocument) -> Result<CompiledPolicy> {
        let mut rules = Vec::new();

        for section in &document.sections {
            if self.skip_sections.iter().any(|s| s == &section.name) {
                debug!("Skipping policy section: {}", section.name);
                continue;
            }

            for pattern in &section.patterns {
                if let Some(arch) = self.disallowed_arch(pattern) {
                    trace!("Pruning policy rule {} (architecture {})", pattern, arch);
                    continue;
                }

                let expression = translate_glob(pattern);
                let regex = Regex::new(&expression)
                    .map_err(|e| Error::filter_expression(pattern.as_str(), e.to_string()))?;

                rules.push(CompiledRule {
                    section: section.name.clone(),
                    pattern: pattern.clone(),
                    regex,
                });
            }
        }

        debug!("Compiled {} policy rules", rules.len());
        Ok(CompiledPolicy { rules })
    }

    fn disallowed_arch(&self, pattern: &str) -> Option<ArchToken> {
        let allowed = self.allow_list.as_ref()?;
        ArchToken::KNOWN
            .iter()
            .copied()
            .filter(|arch| !allowed.contains(arch))
            .find(|arch| pattern.contains(arch.as_str()))
    }
}

/// Translate a policy glob into an anchored regular expression
pub fn translate_glob(pattern: &str) -> String {
    let mut expression = String::with_capacity(pattern.len() + 8);
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    expression.push('^');
    while let Some(c) = chars.next() {
        if c != '*' {
            literal.push(c);
            continue;
        }

        expression.push_str(&regex::escape(&literal));
        literal.clear();

        if chars.peek() == Some(&'*') {
            chars.next();
            // runs of three or more stars collapse into one multi-segment wildcard
            while chars.peek() == Some(&'*') {
                chars.next();
            }
            expression.push_str(".*");
        } else {
            expression.push_str("[^/]*");
        }
    }
    expression.push_str(&regex::escape(&literal));
    expression.push('$');

    expression
}
