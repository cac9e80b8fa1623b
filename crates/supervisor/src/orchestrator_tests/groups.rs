// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group creation and best-effort batch operations.

use super::*;
use crate::orchestrator::GroupSpec;

#[tokio::test]
async fn create_group_resolves_members() {
    let (_dir, orchestrator) = harness();
    orchestrator.create(sh_spec("a", "exit 0")).await.unwrap(); // p-1
    orchestrator.create(sh_spec("b", "exit 0")).await.unwrap(); // p-2

    let group = orchestrator
        .create_group(GroupSpec {
            name: "stack".to_string(),
            process_ids: vec!["p-1".to_string(), "p-2".to_string()],
            ..GroupSpec::default()
        })
        .await
        .unwrap();
    assert_eq!(group.process_ids.len(), 2);
    assert_eq!(group.project_id.as_str(), "default");
}

#[tokio::test]
async fn create_group_rejects_unknown_members_and_empty_name() {
    let (_dir, orchestrator) = harness();
    let err = orchestrator
        .create_group(GroupSpec {
            name: "stack".to_string(),
            process_ids: vec!["ghost".to_string()],
            ..GroupSpec::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::NotFound(_)));

    let err = orchestrator
        .create_group(GroupSpec {
            name: "  ".to_string(),
            ..GroupSpec::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::InvalidConfig(_)));
}

#[tokio::test]
async fn start_and_stop_group_drive_all_members() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(sh_spec("one", "sleep 60"))
        .await
        .unwrap();
    orchestrator
        .create(sh_spec("two", "sleep 60"))
        .await
        .unwrap();
    let group = orchestrator
        .create_group(GroupSpec {
            name: "sleepers".to_string(),
            process_ids: vec!["p-1".to_string(), "p-2".to_string()],
            ..GroupSpec::default()
        })
        .await
        .unwrap();

    orchestrator.start_group(group.id.as_str()).await.unwrap();
    wait_for_status(
        &orchestrator,
        "p-1",
        ProcessStatus::Running,
        Duration::from_secs(2),
    )
    .await;
    wait_for_status(
        &orchestrator,
        "p-2",
        ProcessStatus::Running,
        Duration::from_secs(2),
    )
    .await;

    orchestrator.stop_group(group.id.as_str()).await.unwrap();
    wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;
    wait_for_terminal(&orchestrator, "p-2", Duration::from_secs(5)).await;
}

#[tokio::test]
async fn group_start_is_best_effort_and_reports_last_error() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(ProcessSpec {
            name: "broken".to_string(),
            command: "/no/such/bin".to_string(),
            ..ProcessSpec::default()
        })
        .await
        .unwrap(); // p-1
    orchestrator
        .create(sh_spec("fine", "sleep 60"))
        .await
        .unwrap(); // p-2
    let group = orchestrator
        .create_group(GroupSpec {
            name: "mixed".to_string(),
            process_ids: vec!["p-1".to_string(), "p-2".to_string()],
            ..GroupSpec::default()
        })
        .await
        .unwrap();

    // The broken member surfaces as the error, but the healthy member
    // still starts.
    let err = orchestrator.start_group(group.id.as_str()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::StartFailed(_)));
    wait_for_status(
        &orchestrator,
        "p-2",
        ProcessStatus::Running,
        Duration::from_secs(2),
    )
    .await;

    orchestrator.stop_group(group.id.as_str()).await.unwrap();
    wait_for_terminal(&orchestrator, "p-2", Duration::from_secs(5)).await;
}

#[tokio::test]
async fn unknown_group_is_not_found() {
    let (_dir, orchestrator) = harness();
    assert!(matches!(
        orchestrator.start_group("ghost").await.unwrap_err(),
        SupervisorError::NotFound(_)
    ));
    assert!(matches!(
        orchestrator.stop_group("ghost").await.unwrap_err(),
        SupervisorError::NotFound(_)
    ));
}
