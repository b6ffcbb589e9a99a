//! End-to-end runs against a mock upload endpoint
//!
//! Run with: cargo test --package upbench-cli --test scenarios

use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use upbench_cli::{run, RunOptions};
use upbench_core::{DestinationConfig, RunConfig};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UPLOAD_PATH: &str = "/v1_1/demo/auto/upload";

fn options(workspace: &TempDir, api_base: &str) -> RunOptions {
    let asset_dir = workspace.path().join("assets");
    fs::create_dir_all(&asset_dir).unwrap();
    for (name, size) in [("small.bin", 1000), ("medium.bin", 2000), ("large.bin", 3000)] {
        fs::write(asset_dir.join(name), vec![7u8; size]).unwrap();
    }

    RunOptions {
        config: RunConfig {
            destination: DestinationConfig {
                api_base: api_base.to_string(),
                cloud_name: "demo".into(),
                upload_preset: "unsigned".into(),
                ..Default::default()
            },
            batches: 2,
            delay_ms: 10,
            concurrency: 2,
            timeout_ms: 5_000,
            file_count: 3,
            seed: Some(7),
            ..Default::default()
        },
        asset_dir,
        out_dir: workspace.path().join("runs"),
    }
}

fn read_events(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn count(events: &[Value], kind: &str) -> usize {
    events.iter().filter(|e| e["event"] == kind).count()
}

#[tokio::test]
async fn test_clean_run_records_every_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-request-id", "req-1")
                .set_body_json(json!({ "secure_url": "https://example.test/x" })),
        )
        .expect(6)
        .mount(&server)
        .await;

    let workspace = TempDir::new().unwrap();
    let artifacts = run(&options(&workspace, &server.uri())).await.unwrap();

    assert_eq!(artifacts.report.total_tried, 6);
    assert_eq!(artifacts.report.total_ok, 6);

    let events = read_events(&artifacts.events_path);
    assert_eq!(count(&events, "run_start"), 1);
    assert_eq!(count(&events, "upload"), 6);
    assert_eq!(count(&events, "batch_end"), 2);
    assert_eq!(count(&events, "run_end"), 1);
    assert_eq!(events[0]["event"], "run_start");
    assert_eq!(events.last().unwrap()["event"], "run_end");
    let run_id = &events[0]["runId"];
    assert!(events.iter().all(|e| &e["runId"] == run_id));

    let upload = events.iter().find(|e| e["event"] == "upload").unwrap();
    assert_eq!(upload["status"], "ok");
    assert_eq!(upload["httpStatus"], 200);
    assert_eq!(upload["requestId"], "req-1");
    assert!(upload["throughputMbps"].is_number());
    assert!(upload["timings"]["ttfbMs"].is_number());
    assert_eq!(upload["remoteAddress"], "127.0.0.1");
    assert_eq!(upload["alpn"], "http/1.1");

    let summary: Value =
        serde_json::from_str(&fs::read_to_string(&artifacts.summary_path).unwrap()).unwrap();
    assert_eq!(summary["overall"]["totals"]["tried"], 6);
    assert_eq!(summary["overall"]["totals"]["fail"], 0);
    assert_eq!(summary["overall"]["durationMs"]["count"], 6);
    let sizes: Vec<u64> = summary["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["size"].as_u64().unwrap())
        .collect();
    assert_eq!(sizes, vec![1000, 2000, 3000]);
}

#[tokio::test]
async fn test_http_error_is_isolated_to_its_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("large_b"))
        .respond_with(
            ResponseTemplate::new(500)
                .insert_header("x-cld-error", "Internal error")
                .set_body_json(json!({ "error": { "message": "Internal error" } })),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let workspace = TempDir::new().unwrap();
    let artifacts = run(&options(&workspace, &server.uri())).await.unwrap();

    assert_eq!(artifacts.report.total_tried, 6);
    assert_eq!(artifacts.report.total_ok, 4);

    let events = read_events(&artifacts.events_path);
    let rejected: Vec<&Value> = events
        .iter()
        .filter(|e| e["event"] == "upload" && e["status"] == "http_error")
        .collect();
    assert_eq!(rejected.len(), 2);
    assert!(rejected.iter().all(|e| e["file"] == "large.bin"));
    assert!(rejected.iter().all(|e| e["errorHeader"] == "Internal error"));

    let summary: Value =
        serde_json::from_str(&fs::read_to_string(&artifacts.summary_path).unwrap()).unwrap();
    assert_eq!(summary["overall"]["totals"]["fail"], 2);
    let large = summary["files"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["name"] == "large.bin")
        .unwrap();
    assert_eq!(large["fail"], 2);
    assert_eq!(large["ok"], 0);
}

#[tokio::test]
async fn test_unreachable_endpoint_records_exceptions() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let workspace = TempDir::new().unwrap();
    let mut opts = options(&workspace, &format!("http://127.0.0.1:{}", port));
    opts.config.batches = 1;
    let artifacts = run(&opts).await.unwrap();

    assert_eq!(artifacts.report.total_tried, 3);
    assert_eq!(artifacts.report.total_ok, 0);

    let events = read_events(&artifacts.events_path);
    for upload in events.iter().filter(|e| e["event"] == "upload") {
        assert_eq!(upload["status"], "exception");
        assert_eq!(upload["error"]["code"], "ECONNREFUSED");
        assert_eq!(upload["error"]["port"], port);
    }

    let summary: Value =
        serde_json::from_str(&fs::read_to_string(&artifacts.summary_path).unwrap()).unwrap();
    assert_eq!(summary["overall"]["errors"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_dry_run_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let workspace = TempDir::new().unwrap();
    let mut opts = options(&workspace, &server.uri());
    opts.config.dry_run = true;
    let artifacts = run(&opts).await.unwrap();

    assert_eq!(artifacts.report.total_tried, 0);
    let events = read_events(&artifacts.events_path);
    assert_eq!(count(&events, "planned"), 6);
    assert_eq!(count(&events, "upload"), 0);
    assert!(events
        .iter()
        .filter(|e| e["event"] == "planned")
        .all(|e| e["durationMs"] == 0.0));
}

#[tokio::test]
async fn test_missing_assets_fail_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let workspace = TempDir::new().unwrap();
    let mut opts = options(&workspace, &server.uri());
    opts.config.file_count = 10;

    let err = run(&opts).await.unwrap_err();

    assert!(err.is_setup_error());
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("found 3"));
    assert_eq!(fs::read_dir(&opts.out_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_missing_destination_is_a_configuration_error() {
    let workspace = TempDir::new().unwrap();
    let mut opts = options(&workspace, "http://127.0.0.1:9");
    opts.config.destination.cloud_name.clear();

    let err = run(&opts).await.unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert!(!opts.out_dir.exists());
}
