//! Integration tests for the `trec` binary.
//!
//! These tests run the real binary with an isolated HOME, against a local
//! `wiremock` server where a server is needed.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Get a command for running trec with no ambient configuration.
fn trec(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("trec").unwrap();
    cmd.env("HOME", home)
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("SONAR_HOST_URL")
        .env_remove("SONAR_TOKEN")
        .env_remove("TREC_CONFIG")
        .env_remove("TREC_LOG");
    cmd
}

// =============================================================================
// Help and completion
// =============================================================================

#[test]
fn help_lists_commands() {
    let home = TempDir::new().unwrap();
    trec(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("recover"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn recover_help_shows_workflow_examples() {
    let home = TempDir::new().unwrap();
    trec(home.path())
        .args(["recover", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("WORKFLOW EXAMPLES"))
        .stdout(predicate::str::contains("--apply"));
}

#[test]
fn bash_completion() {
    let home = TempDir::new().unwrap();
    trec(home.path())
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("trec"));
}

// =============================================================================
// Config
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn set_then_get_with_explicit_file() {
        let home = TempDir::new().unwrap();
        let file = home.path().join("custom.toml");
        let file_arg = file.to_str().unwrap();

        trec(home.path())
            .args(["--config", file_arg, "config", "set", "recover.concurrency", "4"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Set recover.concurrency = 4"));

        assert!(file.exists());

        trec(home.path())
            .args(["--config", file_arg, "config", "get", "recover.concurrency"])
            .assert()
            .success()
            .stdout("4\n");
    }

    #[test]
    fn default_location_under_home() {
        let home = TempDir::new().unwrap();

        trec(home.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(".triage-recover"));

        trec(home.path())
            .args(["config", "set", "server.url", "https://sonar.example.com"])
            .assert()
            .success();

        assert!(home.path().join(".triage-recover/config.toml").exists());

        trec(home.path())
            .args(["config", "get", "server.url"])
            .assert()
            .success()
            .stdout("https://sonar.example.com\n");
    }

    #[test]
    fn environment_overrides_file() {
        let home = TempDir::new().unwrap();
        trec(home.path())
            .args(["config", "set", "server.url", "https://from-file.example.com"])
            .assert()
            .success();

        trec(home.path())
            .env("SONAR_HOST_URL", "https://from-env.example.com")
            .args(["config", "get", "server.url"])
            .assert()
            .success()
            .stdout("https://from-env.example.com\n");
    }

    #[test]
    fn list_redacts_the_token() {
        let home = TempDir::new().unwrap();
        trec(home.path())
            .env("SONAR_TOKEN", "squ_0123456789abcdef")
            .args(["config", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("recover.dry_run = true"))
            .stdout(predicate::str::contains("0123456789").not());
    }

    #[test]
    fn unknown_key_fails() {
        let home = TempDir::new().unwrap();
        trec(home.path())
            .args(["config", "get", "server.port"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("server.port"));
    }

    #[test]
    fn invalid_value_fails() {
        let home = TempDir::new().unwrap();
        trec(home.path())
            .args(["config", "set", "recover.concurrency", "0"])
            .assert()
            .failure()
            .code(1);
    }

    #[test]
    fn broken_file_is_reported() {
        let home = TempDir::new().unwrap();
        let file = home.path().join("broken.toml");
        std::fs::write(&file, "[server\nurl = 1").unwrap();

        trec(home.path())
            .args(["--config", file.to_str().unwrap(), "recover"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("configuration"));
    }
}

// =============================================================================
// Recover
// =============================================================================

mod recover {
    use super::*;

    fn issue(key: &str, status: &str, line: u32) -> serde_json::Value {
        let mut value = json!({
            "key": key,
            "rule": "python:S1481",
            "component": "proj:src/a.py",
            "project": "proj",
            "line": line,
            "message": "Remove the unused local variable \"x\".",
            "status": status,
            "type": "CODE_SMELL",
            "severity": "MINOR",
            "tags": []
        });
        if status == "CLOSED" {
            value["resolution"] = json!("FIXED");
        }
        value
    }

    fn page(issues: Vec<serde_json::Value>) -> serde_json::Value {
        json!({
            "paging": { "pageIndex": 1, "pageSize": 500, "total": issues.len() },
            "issues": issues
        })
    }

    async fn server_with_one_recoverable_issue() -> MockServer {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/issues/search"))
            .and(query_param("statuses", "CLOSED"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![issue("C1", "CLOSED", 10)])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/issues/search"))
            .and(query_param("statuses", "OPEN,CONFIRMED,REOPENED,RESOLVED"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![issue("O1", "OPEN", 12)])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/issues/changelog"))
            .and(query_param("issue", "C1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "changelog": [
                    {
                        "user": "alice",
                        "creationDate": "2024-03-01T10:00:00+0000",
                        "diffs": [
                            { "key": "resolution", "newValue": "FALSE-POSITIVE" },
                            { "key": "status", "oldValue": "OPEN", "newValue": "RESOLVED" }
                        ]
                    },
                    {
                        "creationDate": "2024-03-04T10:00:00+0000",
                        "diffs": [
                            { "key": "resolution", "oldValue": "FALSE-POSITIVE", "newValue": "FIXED" },
                            { "key": "status", "oldValue": "RESOLVED", "newValue": "CLOSED" }
                        ]
                    }
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/issues/search"))
            .and(query_param("issues", "O1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [{
                    "key": "O1",
                    "actions": ["comment", "assign", "set_tags", "set_severity", "set_type"],
                    "transitions": ["confirm", "resolve", "falsepositive", "wontfix"]
                }]
            })))
            .mount(&server)
            .await;

        server
    }

    fn posts(requests: &[wiremock::Request]) -> usize {
        requests
            .iter()
            .filter(|r| r.method.as_str() == "POST")
            .count()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dry_run_reports_without_writing() {
        let server = server_with_one_recoverable_issue().await;
        let home = TempDir::new().unwrap();

        trec(home.path())
            .args(["recover", "--url", &server.uri()])
            .assert()
            .success()
            .stdout(predicate::str::contains("C1"))
            .stdout(predicate::str::contains("planned"))
            .stdout(predicate::str::contains("-> O1"))
            .stdout(predicate::str::contains("--apply"));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(posts(&requests), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn apply_writes_and_comments() {
        let server = server_with_one_recoverable_issue().await;
        Mock::given(method("POST"))
            .and(path("/api/issues/do_transition"))
            .and(body_string_contains("transition=falsepositive"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/issues/add_comment"))
            .and(body_string_contains("issue=O1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let home = TempDir::new().unwrap();
        trec(home.path())
            .env("SONAR_TOKEN", "squ_test")
            .args(["recover", "--url", &server.uri(), "--apply", "--json"])
            .assert()
            .success();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(posts(&requests), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn json_report_is_machine_readable() {
        let server = server_with_one_recoverable_issue().await;
        let home = TempDir::new().unwrap();

        let output = trec(home.path())
            .args(["recover", "--url", &server.uri(), "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["dry_run"], true);
        assert_eq!(report["closed_total"], 1);
        assert_eq!(report["entries"][0]["closed"], "C1");
        assert_eq!(report["entries"][0]["action"], "planned");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_write_exits_non_zero() {
        let server = server_with_one_recoverable_issue().await;
        Mock::given(method("POST"))
            .and(path("/api/issues/do_transition"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "errors": [{ "msg": "Insufficient privileges" }]
            })))
            .mount(&server)
            .await;

        let home = TempDir::new().unwrap();
        trec(home.path())
            .args(["recover", "--url", &server.uri(), "--apply"])
            .assert()
            .failure()
            .code(1)
            .stdout(predicate::str::contains("Insufficient privileges"))
            .stderr(predicate::str::contains("failed"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn auth_failure_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/issues/search"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let home = TempDir::new().unwrap();
        trec(home.path())
            .args(["recover", "--url", &server.uri(), "--token", "wrong"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("authentication failed"));
    }

    #[test]
    fn rejects_unknown_attribute() {
        let home = TempDir::new().unwrap();
        trec(home.path())
            .args(["recover", "--recover", "colour"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("colour"));
    }
}
