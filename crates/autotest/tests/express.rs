//! Runs the express fixture suite end to end: one app, one server and one
//! request per case directory under `tests/autotests/express`.

use anyhow::{anyhow, ensure};
use autotest::{AutotestError, CaseDescriptor, Helpers, RunnerConfig, TestRunner};
use autotest_common::RunResult;
use autotest_web::{controller, Controller, ServerEvent, ServerEvents, Template};
use std::path::PathBuf;
use std::sync::Arc;

const CASE_COUNT: usize = 10;
const ERROR_PATH_CASES: usize = 1;

fn suite_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/autotests/express")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Controller fails before anything was written
struct ControllerFault;

impl CaseDescriptor for ControllerFault {
    fn create_controller(&self, _template: Template) -> Controller {
        controller(|_req, _res| Err(anyhow!("controller exploded")))
    }

    fn check_response(&self, response: &RunResult, _helpers: &Helpers) -> Option<anyhow::Result<()>> {
        Some(expect(response, 500, "controller exploded"))
    }
}

/// Controller fails after streaming part of the body
struct HeadersSentFault;

impl CaseDescriptor for HeadersSentFault {
    fn create_controller(&self, _template: Template) -> Controller {
        controller(|_req, res| {
            res.write("partial");
            Err(anyhow!("late failure"))
        })
    }

    fn check_response(&self, response: &RunResult, _helpers: &Helpers) -> Option<anyhow::Result<()>> {
        Some(expect(response, 200, "partial"))
    }
}

fn expect(response: &RunResult, status: u16, body: &str) -> anyhow::Result<()> {
    ensure!(response.error.is_none(), "transport error: {:?}", response.error);
    ensure!(response.status == status, "expected status {}, got {}", status, response.status);
    ensure!(response.body == body, "expected body {:?}, got {:?}", body, response.body);
    Ok(())
}

fn runner(config: RunnerConfig) -> TestRunner {
    let mut runner = TestRunner::new(config);
    runner
        .register("controller-fault", Arc::new(ControllerFault))
        .register("headers-sent-fault", Arc::new(HeadersSentFault));
    runner
}

fn config(output: &tempfile::TempDir) -> RunnerConfig {
    RunnerConfig {
        output_dir: output.path().to_path_buf(),
        ..RunnerConfig::with_root(suite_root())
    }
}

#[tokio::test]
async fn express_suite_passes() {
    init_tracing();
    let output = tempfile::tempdir().unwrap();
    let events = ServerEvents::new();
    let runner = runner(config(&output)).with_server_events(events.clone());

    let suite = runner.run_all().await.unwrap();

    let failures: Vec<_> = suite
        .failures()
        .map(|r| format!("{}: {}", r.name, r.error.as_deref().unwrap_or("")))
        .collect();
    assert!(failures.is_empty(), "failed cases:\n{}", failures.join("\n"));
    assert_eq!(suite.total, CASE_COUNT);
    assert_eq!(suite.passed, CASE_COUNT);

    let names: Vec<_> = suite.results.iter().map(|r| r.name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted, "cases run in name order");
}

#[tokio::test]
async fn every_server_is_closed_before_the_next_opens() {
    let output = tempfile::tempdir().unwrap();
    let events = ServerEvents::new();
    let runner = runner(config(&output)).with_server_events(events.clone());

    runner.run_all().await.unwrap();

    let log = events.snapshot();
    assert_eq!(events.opened(), CASE_COUNT - ERROR_PATH_CASES);
    assert_eq!(events.open_now(), 0);
    for pair in log.chunks(2) {
        match pair {
            [ServerEvent::Opened { port: opened }, ServerEvent::Closed { port: closed }] => {
                assert_eq!(opened, closed)
            }
            other => panic!("unexpected event sequence: {:?}", other),
        }
    }
}

#[tokio::test]
async fn case_filter_runs_one_case() {
    let output = tempfile::tempdir().unwrap();
    let runner = runner(RunnerConfig {
        case_filter: Some("render-loop".to_string()),
        ..config(&output)
    });

    let suite = runner.run_all().await.unwrap();
    assert_eq!(suite.total, 1);
    assert!(suite.all_passed());
    assert_eq!(suite.results[0].name, "render-loop");
}

#[tokio::test]
async fn isolated_runs_reload_the_framework() {
    let output = tempfile::tempdir().unwrap();
    let runner = runner(RunnerConfig {
        isolate_framework: true,
        ..config(&output)
    });

    let suite = runner.run_all().await.unwrap();
    assert!(suite.all_passed());

    let keys = runner.cache().keys();
    assert!(keys.iter().any(|k| k.ends_with("/deps/framework/index")));
    assert!(keys.iter().any(|k| k.ends_with("/deps/mime/index")));
}

#[tokio::test]
async fn unregistered_fault_cases_fall_back_to_fixtures() {
    let output = tempfile::tempdir().unwrap();
    let runner = TestRunner::new(RunnerConfig {
        case_filter: Some("controller-fault".to_string()),
        ..config(&output)
    });

    let suite = runner.run_all().await.unwrap();
    assert!(suite.all_passed());
}

#[tokio::test]
async fn results_are_written_as_json() {
    let output = tempfile::tempdir().unwrap();
    let runner = runner(RunnerConfig {
        case_filter: Some("render-basic".to_string()),
        ..config(&output)
    });

    let suite = runner.run_all().await.unwrap();
    let path = runner.write_results(&suite).unwrap();
    assert_eq!(path, output.path().join("test-results.json"));

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["total"], 1);
    assert_eq!(json["passed"], 1);
    assert_eq!(json["results"][0]["name"], "render-basic");
}

#[tokio::test]
async fn missing_root_fails_the_run() {
    let runner = TestRunner::new(RunnerConfig::with_root("/no/such/autotest/root"));
    let err = runner.run_all().await.unwrap_err();
    assert!(matches!(err, AutotestError::ScanRoot(_)));
}
