//! Contract Test: Fail-Fast Source Resolution
//!
//! Constraints verified:
//! - An invalid source/test-URL combination fails in RESOLVE_SOURCE
//! - No collaborator is called when resolution fails
//! - The error names the flag that fixes it
//!
//! If this test fails, measurement work can start on a configuration that
//! was never going to succeed.

mod common;

use bestip_core::config::flags;
use bestip_core::{Error, SourceCatalog, TestOrigin, WorkflowCoordinator, WorkflowStep};
use common::*;

#[tokio::test]
async fn missing_test_url_fails_before_any_io() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = minimal_config(dir.path());
    config.source.ip_source = Some("ct".to_string());

    let runner = ScriptedRunner::new();
    let parser = InMemoryParser::new(vec![rec("1.1.1.1", 5.0, 100.0)]);
    let lists = StaticIpLists::new(&["13.32.0.0/15"]);

    let (coordinator, _events) = WorkflowCoordinator::new(
        SourceCatalog::builtin(),
        Box::new(ScriptedRunner::sharing_counters_with(&runner)),
        Box::new(InMemoryParser::sharing_counters_with(&parser)),
        config,
    )
    .expect("coordinator construction succeeds");
    let coordinator =
        coordinator.with_ip_lists(Box::new(StaticIpLists::sharing_counters_with(&lists)));

    let failure = coordinator.run().await.unwrap_err();

    assert_eq!(failure.step, WorkflowStep::ResolveSource);
    match &failure.cause {
        Error::Configuration { flag, .. } => assert_eq!(flag.as_deref(), Some(flags::TEST_URL)),
        other => panic!("expected configuration error, got {other}"),
    }
    assert!(failure.is_configuration());
    assert_eq!(lists.prepare_call_count(), 0, "no list download on config error");
    assert_eq!(runner.run_call_count(), 0, "no measurement on config error");
    assert_eq!(parser.parse_call_count(), 0, "no parsing on config error");
}

#[tokio::test]
async fn unknown_source_fails_before_any_io() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = minimal_config(dir.path());
    config.source.ip_source = Some("fastly".to_string());

    let runner = ScriptedRunner::new();
    let (coordinator, _events) = WorkflowCoordinator::new(
        SourceCatalog::builtin(),
        Box::new(ScriptedRunner::sharing_counters_with(&runner)),
        Box::new(InMemoryParser::new(vec![])),
        config,
    )
    .unwrap();

    let failure = coordinator.run().await.unwrap_err();
    assert_eq!(failure.step, WorkflowStep::ResolveSource);
    assert!(failure.cause.to_string().contains(flags::IP_SOURCE));
    assert_eq!(runner.run_call_count(), 0);
}

#[tokio::test]
async fn user_test_url_reaches_the_runner() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = minimal_config(dir.path());
    config.source.ip_source = Some("aws".to_string());
    config.source.test_url = Some("https://speed.example.net/200mb.bin".to_string());
    config.source.port = Some(8443);

    let runner = ScriptedRunner::new();
    let (coordinator, _events) = WorkflowCoordinator::new(
        SourceCatalog::builtin(),
        Box::new(ScriptedRunner::sharing_counters_with(&runner)),
        Box::new(InMemoryParser::new(vec![rec("52.94.0.1", 3.0, 120.0)])),
        config,
    )
    .unwrap();
    let coordinator = coordinator.with_ip_lists(Box::new(StaticIpLists::new(&["52.94.0.0/22"])));

    let report = coordinator.run().await.expect("run succeeds");

    let requests = runner.requests();
    assert_eq!(requests.len(), 1);
    let target = requests[0].test_target.as_ref().expect("test target passed");
    assert_eq!(target.origin, TestOrigin::UserSupplied);
    assert_eq!(target.port, 8443);
    assert!(requests[0].ip_file.is_some(), "candidate list handed to the runner");
    assert_eq!(report.test_target.unwrap().url.as_str(), "https://speed.example.net/200mb.bin");
}

#[tokio::test]
async fn delegated_source_needs_no_list_downloader() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = minimal_config(dir.path());
    config.source.ip_source = None;

    let runner = ScriptedRunner::new();
    let (coordinator, _events) = WorkflowCoordinator::new(
        SourceCatalog::builtin(),
        Box::new(ScriptedRunner::sharing_counters_with(&runner)),
        Box::new(InMemoryParser::new(vec![rec("1.0.0.1", 9.0, 90.0)])),
        config,
    )
    .unwrap();

    let report = coordinator.run().await.expect("run succeeds");
    let requests = runner.requests();
    assert!(requests[0].ip_file.is_none());
    assert!(requests[0].test_target.is_none());
    assert!(report.artifact.ends_with("result_default.csv"));
}

#[tokio::test]
async fn listed_source_without_downloader_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _events) = WorkflowCoordinator::new(
        SourceCatalog::builtin(),
        Box::new(ScriptedRunner::new()),
        Box::new(InMemoryParser::new(vec![])),
        minimal_config(dir.path()),
    )
    .unwrap();

    let failure = coordinator.run().await.unwrap_err();
    assert_eq!(failure.step, WorkflowStep::ResolveSource);
    assert!(failure.is_configuration());
}
