//! Integration tests for the ephemeral local registry
//!
//! The container lifecycle test needs podman and network access and is
//! ignored by default: `cargo test -p prewarm-registry -- --ignored`

use prewarm_core::config::LocalRegistrySettings;
use prewarm_core::Error;
use prewarm_registry::LocalDistribution;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use tempfile::TempDir;

fn fake_podman(dir: &TempDir, body: &str) -> String {
    let script = dir.path().join("podman");
    std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script.to_string_lossy().to_string()
}

fn settings_on_unused_port() -> LocalRegistrySettings {
    LocalRegistrySettings {
        port: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_failed_podman_run_is_command_error() {
    let temp = TempDir::new().unwrap();
    let podman = fake_podman(&temp, "echo 'image not known' >&2; exit 125");
    let data_dir = camino::Utf8PathBuf::try_from(temp.path().join("data")).unwrap();

    let mut registry = LocalDistribution::new(&settings_on_unused_port()).with_podman(podman);
    let err = registry
        .start(&data_dir, "registry.example.com", None)
        .await
        .unwrap_err();

    match err {
        Error::Command { message } => assert!(message.contains("image not known")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(data_dir.is_dir());
    assert!(registry.container_name().is_none());
}

#[tokio::test]
async fn test_unready_registry_is_removed_on_stop() {
    let temp = TempDir::new().unwrap();
    let calls = temp.path().join("calls");
    let podman = fake_podman(&temp, &format!("echo \"$@\" >> {}", calls.display()));
    let data_dir = camino::Utf8PathBuf::try_from(temp.path().join("data")).unwrap();

    let mut registry = LocalDistribution::new(&settings_on_unused_port())
        .with_podman(podman)
        .with_readiness(2, Duration::from_millis(10));
    let err = registry
        .start(&data_dir, "registry.example.com", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Command { .. }));

    let name = registry.container_name().unwrap().to_string();
    registry.stop().await.unwrap();
    registry.stop().await.unwrap();

    let recorded = std::fs::read_to_string(&calls).unwrap();
    let lines: Vec<&str> = recorded.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("run --detach --name prewarm_local_dist_"));
    assert_eq!(lines[1], format!("rm --force {}", name));
}

#[tokio::test]
async fn test_cancelled_start_is_removed_on_stop() {
    let temp = TempDir::new().unwrap();
    let calls = temp.path().join("calls");
    let podman = fake_podman(
        &temp,
        &format!(
            "echo \"$@\" >> {}\nif [ \"$1\" = run ]; then sleep 5; fi",
            calls.display()
        ),
    );
    let data_dir = camino::Utf8PathBuf::try_from(temp.path().join("data")).unwrap();

    let mut registry = LocalDistribution::new(&settings_on_unused_port()).with_podman(podman);
    let cancelled = tokio::time::timeout(
        Duration::from_millis(300),
        registry.start(&data_dir, "registry.example.com", None),
    )
    .await;
    assert!(cancelled.is_err());

    let name = registry.container_name().unwrap().to_string();
    registry.stop().await.unwrap();
    assert!(registry.container_name().is_none());

    let recorded = std::fs::read_to_string(&calls).unwrap();
    assert!(recorded
        .lines()
        .any(|line| line == format!("rm --force {}", name)));
}

#[tokio::test]
#[ignore = "requires podman and network access"]
async fn test_local_registry_lifecycle() {
    let temp = TempDir::new().unwrap();
    let data_dir = camino::Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();

    let mut registry = LocalDistribution::new(&LocalRegistrySettings::default());
    let url = registry
        .start(&data_dir, "registry.opensuse.org", None)
        .await
        .unwrap();
    assert_eq!(url, "localhost:5000");
    registry.stop().await.unwrap();
}
