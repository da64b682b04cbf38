//! Contract Test: Measurement Artifact Reuse
//!
//! Constraints verified:
//! - An existing artifact is reused unless a refresh is forced
//! - A forced refresh always runs the measurement tool
//! - A failing tool leaves a cached artifact untouched
//! - Expiry only applies when a maximum age is configured
//!
//! If this test fails, runs either re-measure needlessly or trust stale data
//! against the user's explicit refresh request.

mod common;

use bestip_core::{Error, SourceCatalog, WorkflowCoordinator, WorkflowEvent, WorkflowStep};
use common::*;

fn coordinator(
    config: bestip_core::WorkflowConfig,
    runner: &ScriptedRunner,
    lists: &StaticIpLists,
) -> (
    WorkflowCoordinator,
    tokio::sync::mpsc::Receiver<WorkflowEvent>,
) {
    let (coordinator, events) = WorkflowCoordinator::new(
        SourceCatalog::builtin(),
        Box::new(ScriptedRunner::sharing_counters_with(runner)),
        Box::new(InMemoryParser::new(vec![
            rec("104.16.0.1", 6.3, 169.0),
            rec("104.16.0.2", 1.0, 50.0),
        ])),
        config,
    )
    .expect("coordinator construction succeeds");
    (
        coordinator.with_ip_lists(Box::new(StaticIpLists::sharing_counters_with(lists))),
        events,
    )
}

#[tokio::test]
async fn existing_artifact_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let config = minimal_config(dir.path());
    std::fs::write(config.test.result_path("cf"), "cached\n").unwrap();

    let runner = ScriptedRunner::new();
    let lists = StaticIpLists::new(&["104.16.0.0/13"]);
    let (coordinator, mut events) = coordinator(config, &runner, &lists);

    let report = coordinator.run().await.expect("run succeeds");

    assert!(report.reused_artifact);
    assert_eq!(runner.run_call_count(), 0, "cached artifact must not be re-measured");
    assert_eq!(lists.prepare_call_count(), 0, "no list download when reusing");
    assert!(drain_events(&mut events).contains(&WorkflowEvent::CacheChecked {
        cache_key: "cf".to_string(),
        reused: true,
        reason: None,
    }));
}

#[tokio::test]
async fn missing_artifact_is_measured_then_reused() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new();
    let lists = StaticIpLists::new(&["104.16.0.0/13"]);

    let (first, _events) = coordinator(minimal_config(dir.path()), &runner, &lists);
    let report = first.run().await.expect("first run succeeds");
    assert!(!report.reused_artifact);
    assert_eq!(runner.run_call_count(), 1);
    assert_eq!(lists.prepare_call_count(), 1);

    let (second, _events) = coordinator(minimal_config(dir.path()), &runner, &lists);
    let report = second.run().await.expect("second run succeeds");
    assert!(report.reused_artifact);
    assert_eq!(runner.run_call_count(), 1, "second run reuses the artifact");
}

#[tokio::test]
async fn force_refresh_always_measures() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = minimal_config(dir.path());
    config.cache.force_refresh = true;
    std::fs::write(config.test.result_path("cf"), "cached\n").unwrap();

    let runner = ScriptedRunner::new();
    let lists = StaticIpLists::new(&["104.16.0.0/13"]);
    let (coordinator, _events) = coordinator(config, &runner, &lists);

    let report = coordinator.run().await.expect("run succeeds");
    assert!(!report.reused_artifact);
    assert_eq!(runner.run_call_count(), 1);
}

#[tokio::test]
async fn tool_failure_leaves_cache_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = minimal_config(dir.path());
    config.cache.force_refresh = true;
    let artifact = config.test.result_path("cf");
    std::fs::write(&artifact, "previous results\n").unwrap();

    let runner = ScriptedRunner::failing("cfst exited with status 1");
    let lists = StaticIpLists::new(&["104.16.0.0/13"]);
    let (coordinator, _events) = coordinator(config, &runner, &lists);

    let failure = coordinator.run().await.unwrap_err();
    assert_eq!(failure.step, WorkflowStep::AcquireMeasurements);
    assert!(matches!(failure.cause, Error::Execution(_)));
    assert_eq!(
        std::fs::read_to_string(&artifact).unwrap(),
        "previous results\n"
    );
}

#[tokio::test]
async fn max_age_expires_old_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = minimal_config(dir.path());
    config.cache.max_age_secs = Some(0);
    std::fs::write(config.test.result_path("cf"), "cached\n").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1100));

    let runner = ScriptedRunner::new();
    let lists = StaticIpLists::new(&["104.16.0.0/13"]);
    let (coordinator, _events) = coordinator(config, &runner, &lists);

    let report = coordinator.run().await.expect("run succeeds");
    assert!(!report.reused_artifact);
    assert_eq!(runner.run_call_count(), 1);
}
