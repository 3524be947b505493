//! Integration tests for the GitHub contents store
//!
//! Runs the store against a mock contents API and checks:
//! - Base64 reads, raw refetch of large files, and directory listings
//! - Create and replace requests carry the branch and version
//! - HTTP failures map onto the store error vocabulary

use odp_common::config::RemoteSettings;
use odp_common::Secret;
use odp_ingest::store::{EntryKind, GitHubStore, RemoteStore, StoreError, VersionHandle};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const FILE_PATH: &str = "/repos/evensrii/Telemark/contents/Data/09/bosatt.csv";

fn store(server: &MockServer) -> GitHubStore {
    GitHubStore::new(&RemoteSettings {
        api_base: server.uri(),
        repository: "evensrii/Telemark".into(),
        branch: "main".into(),
        token: Secret::new("ghp_test"),
    })
    .unwrap()
}

fn file_body(content: serde_json::Value, encoding: &str) -> serde_json::Value {
    json!({
        "type": "file",
        "name": "bosatt.csv",
        "path": "Data/09/bosatt.csv",
        "sha": "3d21ec53a331a6f037a91c368710b99387d012c1",
        "encoding": encoding,
        "content": content
    })
}

#[tokio::test]
async fn test_read_base64_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .and(query_param("ref", "main"))
        .and(header("authorization", "Bearer ghp_test"))
        .and(header("x-github-api-version", "2022-11-28"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(file_body(json!("S29tbXVuZSxB\nbnRhbGwK\n"), "base64")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let object = store(&server).read("Data/09/bosatt.csv").await.unwrap();

    assert_eq!(object.content, b"Kommune,Antall\n");
    assert_eq!(object.version.as_str(), "3d21ec53a331a6f037a91c368710b99387d012c1");
}

#[tokio::test]
async fn test_large_file_is_refetched_raw() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .and(header("accept", "application/vnd.github.raw"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Kommune,Antall\nSkien,4\n"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_body(json!(""), "none")))
        .mount(&server)
        .await;

    let object = store(&server).read("Data/09/bosatt.csv").await.unwrap();

    assert_eq!(object.content, b"Kommune,Antall\nSkien,4\n");
    assert_eq!(object.version.as_str(), "3d21ec53a331a6f037a91c368710b99387d012c1");
}

#[tokio::test]
async fn test_path_segments_are_percent_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/repos/evensrii/Telemark/contents/Data/09_Innvandrere%20og%20inkludering/bosatt.csv",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_body(json!("YQo="), "base64")))
        .expect(1)
        .mount(&server)
        .await;

    let object = store(&server)
        .read("Data/09_Innvandrere og inkludering/bosatt.csv")
        .await
        .unwrap();
    assert_eq!(object.content, b"a\n");
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;

    let err = store(&server).read("Data/09/bosatt.csv").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_sends_branch_without_sha() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(FILE_PATH))
        .and(body_partial_json(json!({
            "message": "Adding bosatt.csv",
            "content": "S29tbXVuZSxBbnRhbGwK",
            "branch": "main"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "content": {"sha": "aaa111", "path": "Data/09/bosatt.csv"},
            "commit": {"sha": "ccc"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let version = store(&server)
        .write("Data/09/bosatt.csv", b"Kommune,Antall\n", "Adding bosatt.csv", None)
        .await
        .unwrap();

    assert_eq!(version, VersionHandle::new("aaa111"));
    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("sha").is_none());
}

#[tokio::test]
async fn test_replace_sends_sha() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(FILE_PATH))
        .and(body_partial_json(json!({"sha": "old222", "message": "Updating bosatt.csv"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": {"sha": "new333"}})))
        .expect(1)
        .mount(&server)
        .await;

    let version = store(&server)
        .write(
            "Data/09/bosatt.csv",
            b"Kommune,Antall\n",
            "Updating bosatt.csv",
            Some(&VersionHandle::new("old222")),
        )
        .await
        .unwrap();
    assert_eq!(version.as_str(), "new333");
}

#[tokio::test]
async fn test_stale_sha_is_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "is at abc but expected old222"})),
        )
        .mount(&server)
        .await;

    let err = store(&server)
        .write("Data/09/bosatt.csv", b"x", "Updating bosatt.csv", Some(&VersionHandle::new("old222")))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}

#[tokio::test]
async fn test_missing_sha_on_existing_file_is_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "Invalid request.\n\n\"sha\" wasn't supplied."
        })))
        .mount(&server)
        .await;

    let err = store(&server)
        .write("Data/09/bosatt.csv", b"x", "Adding bosatt.csv", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}

#[tokio::test]
async fn test_rate_limits_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "0"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let store = store(&server);
    let err = store.read("Data/09/bosatt.csv").await.unwrap_err();
    assert!(matches!(err, StoreError::RateLimited { .. }));
    assert!(err.is_transient());

    let err = store.read("Data/other.csv").await.unwrap_err();
    assert!(matches!(err, StoreError::RateLimited { .. }));
}

#[tokio::test]
async fn test_bad_token_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
        .mount(&server)
        .await;

    let err = store(&server).read("Data/09/bosatt.csv").await.unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = store(&server).read("Data/09/bosatt.csv").await.unwrap_err();
    assert!(matches!(err, StoreError::Network { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_list_folder() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/evensrii/Telemark/contents/Data/09"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"type": "file", "name": "bosatt.csv", "path": "Data/09/bosatt.csv", "sha": "a"},
            {"type": "dir", "name": "Arkiv", "path": "Data/09/Arkiv", "sha": "b"}
        ])))
        .mount(&server)
        .await;

    let entries = store(&server).list("Data/09").await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "bosatt.csv");
    assert_eq!(entries[0].kind, EntryKind::File);
    assert_eq!(entries[1].path, "Data/09/Arkiv");
    assert_eq!(entries[1].kind, EntryKind::Directory);
}

#[tokio::test]
async fn test_reading_a_folder_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = store(&server).read("Data/09").await.unwrap_err();
    assert!(matches!(err, StoreError::MalformedResponse { .. }));
}
