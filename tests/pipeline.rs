//! End-to-end pipeline tests against a local mock HTTP server.
//!
//! The external converter is replaced by a tiny shell script that copies its
//! input to its output, so the suite exercises the real subprocess plumbing
//! without shipping a pdftotext binary. Unix-only for that reason.

#![cfg(unix)]

use refharvest::{digest, PipelineConfig, RunReport};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Write an executable stand-in for pdftotext: copies input to output.
fn fake_converter(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("fake_pdftotext");
    std::fs::write(&script, "#!/bin/sh\ncp \"$3\" \"$4\"\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

/// A JSONL line whose evidence field matches the URL digest.
fn jsonl_line(url: &str) -> String {
    format!(r#"{{"url": "{url}", "evidence": "{}.txt"}}"#, digest(url))
}

fn write_input(dir: &Path, lines: &[String]) -> PathBuf {
    let input = dir.join("refs.jsonl");
    std::fs::write(&input, lines.join("\n") + "\n").unwrap();
    input
}

/// Config rooted in the test directory with short timeouts.
fn test_config(dir: &Path, input: &Path) -> PipelineConfig {
    PipelineConfig::builder()
        .input(input)
        .output_dir(dir.join("evidence"))
        .ledger_path(dir.join("bad.txt"))
        .converter(fake_converter(dir))
        .probe_timeout(Duration::from_secs(2))
        .fetch_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

fn pdf_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "application/pdf")
}

fn ledger_entries(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("bad.txt"))
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

async fn run(config: PipelineConfig) -> RunReport {
    refharvest::run(config).await.expect("run should complete")
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_pdf_response_produces_one_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/paper.pdf"))
        .respond_with(pdf_response(""))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(pdf_response("%PDF-1.4 pretend content"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/paper.pdf", server.uri());
    let input = write_input(dir.path(), &[jsonl_line(&url)]);

    let report = run(test_config(dir.path(), &input)).await;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);

    let artifact = dir.path().join("evidence").join(format!("{}.txt", digest(&url)));
    assert_eq!(
        std::fs::read_to_string(artifact).unwrap(),
        "%PDF-1.4 pretend content"
    );
    assert!(ledger_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn probe_500_is_permanent_and_second_run_stays_offline() {
    let server = MockServer::start().await;
    // Exactly one HEAD across both runs: the second run must not touch the
    // network for a ledgered digest.
    Mock::given(method("HEAD"))
        .and(path("/gone.pdf"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_response(""))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/gone.pdf", server.uri());
    let input = write_input(dir.path(), &[jsonl_line(&url)]);

    let report = run(test_config(dir.path(), &input)).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 0);
    assert_eq!(ledger_entries(dir.path()), vec![digest(&url)]);
    assert!(!dir.path().join("evidence").join(format!("{}.txt", digest(&url))).exists());

    // Second run over the same input: skipped from the ledger, no requests.
    let report = run(test_config(dir.path(), &input)).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 0);
}

#[tokio::test]
async fn fetch_timeout_is_transient_and_retried_next_run() {
    let server = MockServer::start().await;
    // Two HEADs prove the second run retried instead of consulting the ledger.
    Mock::given(method("HEAD"))
        .and(path("/slow.pdf"))
        .respond_with(pdf_response(""))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow.pdf"))
        .respond_with(pdf_response("late").set_delay(Duration::from_millis(500)))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/slow.pdf", server.uri());
    let input = write_input(dir.path(), &[jsonl_line(&url)]);

    let mut config = test_config(dir.path(), &input);
    config.fetch_timeout = Duration::from_millis(100);

    let report = run(config.clone()).await;
    assert_eq!(report.failed, 1);
    assert!(ledger_entries(dir.path()).is_empty(), "transient failures stay out of the ledger");

    let report = run(config).await;
    assert_eq!(report.failed, 1);
    assert!(ledger_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn html_content_type_is_rejected_before_any_body_read() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(Vec::new(), "text/html"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_response(""))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/page", server.uri());
    let input = write_input(dir.path(), &[jsonl_line(&url)]);

    let report = run(test_config(dir.path(), &input)).await;
    assert_eq!(report.failed, 1);
    assert_eq!(ledger_entries(dir.path()), vec![digest(&url)]);
}

#[tokio::test]
async fn oversize_declared_length_is_rejected_without_download() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/huge.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/pdf")
                .insert_header("Content-Length", "200000000"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_response(""))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/huge.pdf", server.uri());
    let input = write_input(dir.path(), &[jsonl_line(&url)]);

    let report = run(test_config(dir.path(), &input)).await;
    assert_eq!(report.failed, 1);
    assert_eq!(ledger_entries(dir.path()), vec![digest(&url)]);
}

#[tokio::test]
async fn second_run_makes_no_network_calls_for_stored_artifacts() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/paper.pdf"))
        .respond_with(pdf_response(""))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(pdf_response("body"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/paper.pdf", server.uri());
    let input = write_input(dir.path(), &[jsonl_line(&url)]);
    let config = test_config(dir.path(), &input);

    let first = run(config.clone()).await;
    assert_eq!(first.succeeded, 1);

    // The artifact satisfies the store check; mock expectations (one HEAD,
    // one GET total) verify the second run stayed offline.
    let second = run(config).await;
    assert_eq!(second.succeeded, 1);
    assert_eq!(second.failed, 0);
}

#[tokio::test]
async fn duplicate_links_are_admitted_once_per_run() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/dup.pdf"))
        .respond_with(pdf_response(""))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dup.pdf"))
        .respond_with(pdf_response("body"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/dup.pdf", server.uri());
    let input = write_input(dir.path(), &[jsonl_line(&url), jsonl_line(&url), jsonl_line(&url)]);

    let report = run(test_config(dir.path(), &input)).await;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 1);
}

#[tokio::test]
async fn mismatched_evidence_name_is_trusted_for_the_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(pdf_response(""))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_response("body"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/renamed.pdf", server.uri());
    let line = format!(r#"{{"url": "{url}", "evidence": "deadbeefdeadbeef.txt"}}"#);
    let input = write_input(dir.path(), &[line]);

    let report = run(test_config(dir.path(), &input)).await;
    assert_eq!(report.succeeded, 1);
    assert!(dir.path().join("evidence/deadbeefdeadbeef.txt").exists());
}

#[tokio::test]
async fn shutdown_stops_admissions_and_drains() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(pdf_response(""))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_response("body").set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let lines: Vec<String> = (0..50)
        .map(|i| jsonl_line(&format!("{}/doc{i}.pdf", server.uri())))
        .collect();
    let input = write_input(dir.path(), &lines);

    let mut config = test_config(dir.path(), &input);
    config.max_in_flight = 2;
    config.fetch_slots = 2;

    let shutdown = CancellationToken::new();
    let handle = {
        let shutdown = shutdown.clone();
        let config = config.clone();
        tokio::spawn(async move { refharvest::run_with_shutdown(config, shutdown).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let report = handle.await.unwrap().expect("run should drain cleanly");

    // Far fewer than the 50 inputs were admitted, and everything that was
    // admitted reached a terminal state or was cancelled at a pool gate.
    let total = report.attempted + report.cancelled;
    assert!(total < 50, "admissions kept flowing after shutdown: {report:?}");
    assert!(report.failed == 0, "slow-but-successful items must not be counted failed: {report:?}");
}

#[tokio::test]
async fn ledger_reload_preserves_failures_across_processes() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("bad.txt");

    {
        let ledger = refharvest::FailureLedger::load(&ledger_path).await.unwrap();
        ledger.mark_failed("aaaa");
        ledger.mark_failed("bbbb");
        ledger.flush().await.unwrap();
    }

    let reloaded = refharvest::FailureLedger::load(&ledger_path).await.unwrap();
    assert!(reloaded.contains("aaaa"));
    assert!(reloaded.contains("bbbb"));
    assert_eq!(reloaded.len(), 2);
}
