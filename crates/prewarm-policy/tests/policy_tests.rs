//! Integration tests for policy compilation and selection

use camino::Utf8PathBuf;
use prewarm_core::types::ArchToken;
use prewarm_core::Error;
use prewarm_policy::{PolicyCompiler, PolicyDocument, SelectionFilter};
use tempfile::TempDir;

const POLICY: &str = r#"
base:
  - "*"
  - "bci/*"
manager:
  - "suse/manager/5.0/x86_64/**"
  - "suse/manager/5.0/aarch64/**"
  - "suse/manager/5.0/s390x/server"
  - "suse/manager/5.0/ppc64le/*"
sle:
  - "suse/sle15/**"
  - "suse/sle15/*/amd64/*"
"#;

/// Replace wildcards with legal literal text
fn example_paths(pattern: &str) -> Vec<String> {
    let multi = ["x", "x/y", "x/y/z"];
    multi
        .iter()
        .map(|fill| pattern.replace("**", fill).replace('*', "seg"))
        .collect()
}

fn write_policy(dir: &TempDir) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(dir.path().join("policy.yaml")).unwrap();
    std::fs::write(&path, POLICY).unwrap();
    path
}

#[test]
fn test_every_pattern_matches_its_own_examples() {
    let doc = PolicyDocument::from_yaml("policy", POLICY).unwrap();
    let policy = PolicyCompiler::new().compile(&doc).unwrap();

    for section in &doc.sections {
        for pattern in &section.patterns {
            for path in example_paths(pattern) {
                assert!(
                    policy.first_match(&path).is_some(),
                    "{} should match an example of {}",
                    path,
                    pattern
                );
            }
        }
    }
}

#[test]
fn test_arch_pruning_drops_exactly_the_referencing_rules() {
    let doc = PolicyDocument::from_yaml("policy", POLICY).unwrap();
    let all_rules: Vec<String> = PolicyCompiler::new()
        .compile(&doc)
        .unwrap()
        .rules()
        .iter()
        .map(|r| r.pattern.clone())
        .collect();

    for allowed in ArchToken::KNOWN {
        let pruned: Vec<String> = PolicyCompiler::new()
            .with_allowed_arches(Some(&[allowed]))
            .compile(&doc)
            .unwrap()
            .rules()
            .iter()
            .map(|r| r.pattern.clone())
            .collect();

        let expected: Vec<String> = all_rules
            .iter()
            .filter(|pattern| {
                !ArchToken::KNOWN
                    .iter()
                    .any(|arch| *arch != allowed && pattern.contains(arch.as_str()))
            })
            .cloned()
            .collect();

        assert_eq!(pruned, expected, "allow-list [{}]", allowed);
    }
}

#[test]
fn test_single_segment_wildcard_does_not_cross_slashes() {
    let doc = PolicyDocument::from_yaml("policy", "base:\n  - \"bci/*\"\n").unwrap();
    let policy = PolicyCompiler::new().compile(&doc).unwrap();
    assert!(policy.first_match("bci/python").is_some());
    assert!(policy.first_match("bci/python/3.12").is_none());
    assert!(policy.first_match("bci").is_none());
}

#[test]
fn test_load_from_file_and_select() {
    let temp = TempDir::new().unwrap();
    let path = write_policy(&temp);

    let doc = PolicyDocument::load(&path).unwrap();
    let policy = PolicyCompiler::new()
        .with_skip_sections(["base"])
        .with_allowed_arches(Some(&[ArchToken::X86_64]))
        .compile(&doc)
        .unwrap();

    let catalog = vec![
        "suse/manager/5.0/x86_64/server".to_string(),
        "suse/manager/5.0/aarch64/server".to_string(),
        "suse/sle15/bci".to_string(),
        "busybox".to_string(),
    ];
    let selected = SelectionFilter::new(Some(policy), None)
        .unwrap()
        .apply(catalog);

    assert_eq!(
        selected,
        vec![
            "suse/manager/5.0/x86_64/server".to_string(),
            "suse/sle15/bci".to_string(),
        ]
    );
}

#[test]
fn test_missing_policy_file_is_parse_error() {
    let err = PolicyDocument::load(&Utf8PathBuf::from("/nonexistent/policy.yaml")).unwrap_err();
    assert!(matches!(err, Error::PolicyParse { .. }));
}
