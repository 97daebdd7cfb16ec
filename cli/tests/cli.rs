//! End-to-end tests of the `w2f` binary.
//!
//! ## Exit Codes
//! - 0: success
//! - 1: backend or precondition failure
//! - 2: configuration failure

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::Output;

use anyhow::Result;
use assert_cmd::assert::OutputAssertExt;
use predicates::str::contains;
use serde_json::Value as JsonValue;
use serde_json::json;
use tempfile::TempDir;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

/// `w2f` with an isolated config location and no ambient token.
fn w2f_command(home: &Path) -> Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("w2f")?;
    cmd.env("HOME", home);
    cmd.env("W2F_SYNC_CONFIG", home.join("sync.toml"));
    cmd.env_remove("W2F_AUTH_TOKEN");
    cmd.env_remove("W2F_API_BASE_URL");
    cmd.env_remove("W2F_DEFAULT_PROJECT_ID");
    cmd.env("RUST_LOG", "off");
    Ok(cmd)
}

async fn run(mut cmd: assert_cmd::Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.output())
        .await
        .expect("join")
        .expect("run w2f")
}

async fn backend_with_pilot() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1, "name": "Pilot", "description": "", "budget": 5000.0
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/1/snapshot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project": { "id": 1, "name": "Pilot" },
            "scriptData": {
                "uploadedScript": { "name": "pilot.pdf" },
                "sceneData": [{ "scene": "Cold open", "location": "Street" }]
            }
        })))
        .mount(&server)
        .await;
    server
}

#[test]
fn missing_token_is_a_precondition_failure() -> Result<()> {
    let home = TempDir::new()?;

    w2f_command(home.path())?
        .arg("snapshot")
        .assert()
        .code(1)
        .stderr(contains("Authentication required"));
    Ok(())
}

#[test]
fn invalid_config_exits_with_config_code() -> Result<()> {
    let home = TempDir::new()?;
    std::fs::write(home.path().join("sync.toml"), "api_base_url = \"ftp://example.com\"\n")?;

    w2f_command(home.path())?
        .args(["--token", "abc", "projects"])
        .assert()
        .code(2)
        .stderr(contains("config error"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn projects_json_lists_backend_projects() -> Result<()> {
    let server = backend_with_pilot().await;
    Mock::given(method("GET"))
        .and(path("/projects/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "Pilot" },
            { "id": 2, "name": "Sequel" }
        ])))
        .mount(&server)
        .await;
    let home = TempDir::new()?;
    let mut cmd = w2f_command(home.path())?;
    cmd.env("W2F_API_BASE_URL", server.uri())
        .args(["--json", "--token", "abc", "projects"]);

    let output = run(cmd).await;
    output.clone().assert().code(0);

    let stdout: JsonValue = serde_json::from_slice(&output.stdout)?;
    let ids: Vec<&str> = stdout["projects"]
        .as_array()
        .expect("projects array")
        .iter()
        .filter_map(|p| p["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["1", "2"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_prints_human_summary() -> Result<()> {
    let server = backend_with_pilot().await;
    let home = TempDir::new()?;
    let mut cmd = w2f_command(home.path())?;
    cmd.env("W2F_API_BASE_URL", server.uri())
        .args(["--token", "abc", "snapshot"]);

    run(cmd)
        .await
        .assert()
        .code(0)
        .stdout(contains("Pilot"))
        .stdout(contains("Script: pilot.pdf"))
        .stdout(contains("Cold open (Street)"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_failure_reports_backend_detail_once() -> Result<()> {
    let server = backend_with_pilot().await;
    Mock::given(method("POST"))
        .and(path("/projects/1/upload_script"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "detail": "Storage unavailable" })),
        )
        .mount(&server)
        .await;
    let home = TempDir::new()?;
    let script = home.path().join("draft.txt");
    std::fs::write(&script, "INT. DINER - NIGHT")?;
    let mut cmd = w2f_command(home.path())?;
    cmd.env("W2F_API_BASE_URL", server.uri())
        .args(["--token", "abc", "upload"])
        .arg(&script);

    let output = run(cmd).await;
    output.clone().assert().code(1);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("Storage unavailable").count(), 1, "{stderr}");
    Ok(())
}

/// Default project resolves but its snapshot endpoint is down.
async fn backend_with_broken_default_snapshot() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1, "name": "Pilot"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/1/snapshot"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "detail": "snapshot broken" })),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test(flavor = "multi_thread")]
async fn projects_work_while_default_snapshot_is_broken() -> Result<()> {
    let server = backend_with_broken_default_snapshot().await;
    Mock::given(method("GET"))
        .and(path("/projects/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "Pilot" },
            { "id": 2, "name": "Sequel" }
        ])))
        .mount(&server)
        .await;
    let home = TempDir::new()?;
    let mut cmd = w2f_command(home.path())?;
    cmd.env("W2F_API_BASE_URL", server.uri())
        .args(["--json", "--token", "abc", "projects"]);

    let output = run(cmd).await;
    output.clone().assert().code(0);

    let stdout: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(stdout["projects"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_of_named_project_skips_the_default_one() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/1/snapshot"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/2/snapshot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project": { "id": 2, "name": "Sequel" },
            "scriptData": { "sceneData": [{ "scene": "Reunion", "location": "Beach" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    let home = TempDir::new()?;
    let mut cmd = w2f_command(home.path())?;
    cmd.env("W2F_API_BASE_URL", server.uri())
        .args(["--token", "abc", "snapshot", "--project", "2"]);

    run(cmd)
        .await
        .assert()
        .code(0)
        .stdout(contains("Sequel"))
        .stdout(contains("Reunion (Beach)"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn default_snapshot_failure_is_reported_once() -> Result<()> {
    let server = backend_with_broken_default_snapshot().await;
    let home = TempDir::new()?;
    let mut cmd = w2f_command(home.path())?;
    cmd.env("W2F_API_BASE_URL", server.uri())
        .args(["--token", "abc", "snapshot"]);

    let output = run(cmd).await;
    output.clone().assert().code(1);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("snapshot broken").count(), 1, "{stderr}");
    Ok(())
}
