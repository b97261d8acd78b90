//! Integration tests for catalog sources

use prewarm_catalog::{CatalogSource, HttpCatalog, SearchCatalog};
use prewarm_core::{Credentials, Error};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Write an executable shell script standing in for podman
fn fake_podman(dir: &TempDir, body: &str) -> PathBuf {
    let script = dir.path().join("podman");
    std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[tokio::test]
async fn test_http_catalog_single_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/_catalog"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"repositories": ["b/y", "a/x"]})),
        )
        .mount(&server)
        .await;

    let catalog = HttpCatalog::new(server.uri(), false).unwrap();
    let repos = catalog.list_repositories().await.unwrap();
    assert_eq!(repos, vec!["b/y".to_string(), "a/x".to_string()]);
}

#[tokio::test]
async fn test_http_catalog_follows_link_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/_catalog"))
        .and(query_param("last", "b"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"repositories": ["c"]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/_catalog"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", "</v2/_catalog?last=b&n=2>; rel=\"next\"")
                .set_body_json(serde_json::json!({"repositories": ["a", "b"]})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let catalog = HttpCatalog::new(server.uri(), false).unwrap();
    let repos = catalog.list_repositories().await.unwrap();
    assert_eq!(repos, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_http_catalog_sends_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/_catalog"))
        .and(header_exists("authorization"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"repositories": ["x"]})),
        )
        .mount(&server)
        .await;

    let catalog = HttpCatalog::new(server.uri(), false)
        .unwrap()
        .with_credentials(Some(Credentials::new("user", "pass")));
    assert_eq!(catalog.list_repositories().await.unwrap(), vec!["x"]);
}

#[tokio::test]
async fn test_http_catalog_without_repositories_is_catalog_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/_catalog"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"errors": ["denied"]})),
        )
        .mount(&server)
        .await;

    let catalog = HttpCatalog::new(server.uri(), false).unwrap();
    let err = catalog.list_repositories().await.unwrap_err();
    assert!(matches!(err, Error::Catalog { .. }));
}

#[tokio::test]
async fn test_http_catalog_non_json_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/_catalog"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let catalog = HttpCatalog::new(server.uri(), false).unwrap();
    let err = catalog.list_repositories().await.unwrap_err();
    assert!(matches!(err, Error::Json(_)));
}

#[tokio::test]
async fn test_search_catalog_strips_registry_prefix() {
    let temp = TempDir::new().unwrap();
    let podman = fake_podman(
        &temp,
        "printf 'registry.example.com/suse/a\\nregistry.example.com/suse/b\\n'",
    );

    let catalog = SearchCatalog::new("registry.example.com", true)
        .with_binary(podman.to_string_lossy().to_string());
    let repos = catalog.list_repositories().await.unwrap();
    assert_eq!(repos, vec!["suse/a", "suse/b"]);
}

#[tokio::test]
async fn test_search_catalog_failure_is_command_error() {
    let temp = TempDir::new().unwrap();
    let podman = fake_podman(&temp, "echo 'unauthorized' >&2; exit 125");

    let catalog = SearchCatalog::new("registry.example.com", true)
        .with_binary(podman.to_string_lossy().to_string());
    let err = catalog.list_repositories().await.unwrap_err();
    match err {
        Error::Command { message } => assert!(message.contains("unauthorized")),
        other => panic!("unexpected error: {other:?}"),
    }
}
