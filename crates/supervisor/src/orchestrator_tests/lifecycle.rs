// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Create / start / stop / query behavior end to end.

use super::*;
use compass_core::LogKind;

#[tokio::test]
async fn create_returns_pending_with_defaults_filled() {
    let (_dir, orchestrator) = harness();
    let process = orchestrator
        .create(sh_spec("echo", "echo hi"))
        .await
        .unwrap();

    assert_eq!(process.id.as_str(), "p-1");
    assert_eq!(process.status, ProcessStatus::Pending);
    assert_eq!(process.project_id.as_str(), "default");

    // Create then get round-trips the record
    let loaded = orchestrator.get("p-1").await.unwrap();
    assert_eq!(loaded, process);
}

#[tokio::test]
async fn invalid_spec_is_rejected() {
    let (_dir, orchestrator) = harness();
    let err = orchestrator
        .create(ProcessSpec {
            name: "bad".to_string(),
            command: String::new(),
            ..ProcessSpec::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::InvalidConfig(_)));
}

#[tokio::test]
async fn happy_start_then_stop() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(sh_spec("worker", "echo hi; sleep 60"))
        .await
        .unwrap();

    let receipt = orchestrator.start_process("p-1").await.unwrap();
    assert!(receipt.pid > 0);

    let running = wait_for_status(
        &orchestrator,
        "p-1",
        ProcessStatus::Running,
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(running.pid, Some(receipt.pid));
    assert!(running.started_at.is_some());

    orchestrator.stop_process("p-1").await.unwrap();
    let stopped = wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;
    assert_eq!(stopped.status, ProcessStatus::Stopped);
    assert!(stopped.stopped_at.is_some());
    assert!(stopped.stopped_at >= stopped.started_at);

    // Output was captured
    tokio::time::sleep(Duration::from_millis(200)).await;
    let logs = orchestrator.get_logs("p-1", 0).await.unwrap();
    assert!(logs
        .iter()
        .any(|l| l.kind == LogKind::Stdout && l.message == "hi"));
}

#[tokio::test]
async fn spawn_failure_surfaces_and_marks_failed() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(ProcessSpec {
            name: "noexec".to_string(),
            command: "/no/such/bin".to_string(),
            ..ProcessSpec::default()
        })
        .await
        .unwrap();

    let err = orchestrator.start_process("p-1").await.unwrap_err();
    assert!(matches!(err, SupervisorError::StartFailed(_)));

    let failed = wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(2)).await;
    assert_eq!(failed.status, ProcessStatus::Failed);
}

#[tokio::test]
async fn start_twice_reports_already_running() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(sh_spec("sleeper", "sleep 60"))
        .await
        .unwrap();
    orchestrator.start_process("p-1").await.unwrap();
    wait_for_status(
        &orchestrator,
        "p-1",
        ProcessStatus::Running,
        Duration::from_secs(2),
    )
    .await;

    let err = orchestrator.start_process("p-1").await.unwrap_err();
    assert!(matches!(err, SupervisorError::IllegalState(_)));

    orchestrator.stop_process("p-1").await.unwrap();
    wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;
}

#[tokio::test]
async fn concurrent_starts_admit_exactly_one() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(sh_spec("sleeper", "sleep 60"))
        .await
        .unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..5 {
        let o = orchestrator.clone();
        tasks.spawn(async move { o.start_process("p-1").await });
    }
    let mut ok = 0;
    let mut illegal = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => ok += 1,
            Err(SupervisorError::IllegalState(_)) => illegal += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(illegal, 4);

    orchestrator.stop_process("p-1").await.unwrap();
    wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;
}

#[tokio::test]
async fn stop_is_idempotent() {
    let (_dir, orchestrator) = harness();
    orchestrator.create(sh_spec("quick", "exit 0")).await.unwrap();

    // Stop before any start: success, no effect
    orchestrator.stop_process("p-1").await.unwrap();
    assert_eq!(
        orchestrator.get("p-1").await.unwrap().status,
        ProcessStatus::Pending
    );

    orchestrator.start_process("p-1").await.unwrap();
    let first = wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;

    // Stop; Stop again — same final state
    orchestrator.stop_process("p-1").await.unwrap();
    orchestrator.stop_process("p-1").await.unwrap();
    let second = orchestrator.get("p-1").await.unwrap();
    assert_eq!(first.status, second.status);
    assert_eq!(first.stopped_at, second.stopped_at);
}

#[tokio::test]
async fn prefix_resolution_distinguishes_unique_and_ambiguous() {
    let (_dir, orchestrator) = harness();
    orchestrator.create(sh_spec("one", "exit 0")).await.unwrap(); // p-1
    orchestrator.create(sh_spec("two", "exit 0")).await.unwrap(); // p-2

    assert_eq!(orchestrator.get("p-1").await.unwrap().name, "one");

    match orchestrator.get("p-").await.unwrap_err() {
        SupervisorError::AmbiguousId { matches, .. } => assert_eq!(matches, 2),
        other => panic!("expected AmbiguousId, got {other:?}"),
    }
    assert!(matches!(
        orchestrator.get("zz").await.unwrap_err(),
        SupervisorError::NotFound(_)
    ));
}

#[tokio::test]
async fn list_filters_by_status() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(sh_spec("sleeper", "sleep 60"))
        .await
        .unwrap();
    orchestrator.create(sh_spec("idle", "exit 0")).await.unwrap();
    orchestrator.start_process("p-1").await.unwrap();
    wait_for_status(
        &orchestrator,
        "p-1",
        ProcessStatus::Running,
        Duration::from_secs(2),
    )
    .await;

    let running = orchestrator
        .list(ProcessFilter {
            status: Some(ProcessStatus::Running),
            ..ProcessFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].name, "sleeper");

    let all = orchestrator.list(ProcessFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    orchestrator.stop_process("p-1").await.unwrap();
    wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;
}

#[tokio::test]
async fn port_conflict_with_live_process_cites_the_holder() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(ProcessSpec {
            port: Some(28_080),
            ..sh_spec("holder", "sleep 60")
        })
        .await
        .unwrap();
    orchestrator.start_process("p-1").await.unwrap();
    wait_for_status(
        &orchestrator,
        "p-1",
        ProcessStatus::Running,
        Duration::from_secs(2),
    )
    .await;

    let err = orchestrator
        .create(ProcessSpec {
            port: Some(28_080),
            ..sh_spec("intruder", "exit 0")
        })
        .await
        .unwrap_err();
    match err {
        SupervisorError::Conflict(message) => assert!(message.contains("p-1")),
        other => panic!("expected Conflict, got {other:?}"),
    }

    orchestrator.stop_process("p-1").await.unwrap();
    wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;
}

#[tokio::test]
async fn port_conflict_with_bound_socket() {
    let (_dir, orchestrator) = harness();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let err = orchestrator
        .create(ProcessSpec {
            port: Some(port as u32),
            ..sh_spec("wants-port", "exit 0")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::Conflict(_)));
}

#[tokio::test]
async fn unset_port_never_conflicts() {
    let (_dir, orchestrator) = harness();
    orchestrator.create(sh_spec("a", "exit 0")).await.unwrap();
    orchestrator.create(sh_spec("b", "exit 0")).await.unwrap();
    assert_eq!(
        orchestrator.list(ProcessFilter::default()).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn update_changes_mutable_fields() {
    let (_dir, orchestrator) = harness();
    orchestrator.create(sh_spec("old", "exit 0")).await.unwrap();

    let updated = orchestrator
        .update(
            "p-1",
            ProcessUpdate {
                name: Some("new".to_string()),
                restart_policy: Some(RestartPolicy {
                    enabled: true,
                    ..RestartPolicy::default()
                }),
                ..ProcessUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "new");
    assert!(updated.restart_policy.enabled);

    let err = orchestrator
        .update(
            "p-1",
            ProcessUpdate {
                name: Some("  ".to_string()),
                ..ProcessUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::InvalidConfig(_)));
}

#[tokio::test]
async fn get_logs_limit_returns_most_recent_in_production_order() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(sh_spec("counter", "seq 1 50"))
        .await
        .unwrap();
    orchestrator.start_process("p-1").await.unwrap();
    wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let logs = orchestrator.get_logs("p-1", 10).await.unwrap();
    let stdout: Vec<_> = logs
        .iter()
        .filter(|l| l.kind == LogKind::Stdout)
        .map(|l| l.message.parse::<u32>().unwrap())
        .collect();
    assert!(!stdout.is_empty());
    // Production order preserved within the window
    assert!(stdout.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*stdout.last().unwrap(), 50);
}

#[tokio::test]
async fn restart_gives_a_new_pid() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(sh_spec("sleeper", "sleep 60"))
        .await
        .unwrap();
    let first = orchestrator.start_process("p-1").await.unwrap();
    wait_for_status(
        &orchestrator,
        "p-1",
        ProcessStatus::Running,
        Duration::from_secs(2),
    )
    .await;

    let second = orchestrator.restart_process("p-1").await.unwrap();
    assert_ne!(first.pid, second.pid);
    let running = wait_for_status(
        &orchestrator,
        "p-1",
        ProcessStatus::Running,
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(running.pid, Some(second.pid));

    orchestrator.stop_process("p-1").await.unwrap();
    wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;
}

#[tokio::test]
async fn statistics_reflect_registry_and_health() {
    let (_dir, orchestrator) = harness();
    orchestrator.create(sh_spec("a", "exit 0")).await.unwrap();

    let stats = orchestrator.statistics().await.unwrap();
    assert_eq!(stats.total_processes, 1);
    assert_eq!(stats.running_processes, 0);
    assert!(stats.is_healthy);
}

#[tokio::test]
async fn shutdown_stops_running_processes_and_flushes() {
    let (dir, orchestrator) = harness();
    orchestrator
        .create(sh_spec("sleeper", "sleep 60"))
        .await
        .unwrap();
    orchestrator.start_process("p-1").await.unwrap();
    wait_for_status(
        &orchestrator,
        "p-1",
        ProcessStatus::Running,
        Duration::from_secs(2),
    )
    .await;

    orchestrator.shutdown().await;

    // The record made it to disk; whatever status was flushed, the
    // child is no longer supervised as running on reload.
    let store = ProcessStore::new(dir.path());
    let persisted = store.load_all_processes().unwrap();
    assert_eq!(persisted.len(), 1);
}
