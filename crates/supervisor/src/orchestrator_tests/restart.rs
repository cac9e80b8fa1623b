// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Automatic restart policy.

use super::*;
use compass_core::RestartPolicy;

fn crashing_spec(max_retries: u32) -> ProcessSpec {
    ProcessSpec {
        restart_policy: Some(RestartPolicy {
            enabled: true,
            max_retries,
            retry_delay_ms: 50,
            ..RestartPolicy::default()
        }),
        ..sh_spec("crasher", "exit 9")
    }
}

/// Poll until the retry counter reaches `expected`.
async fn wait_for_retries(
    orchestrator: &TestOrchestrator,
    id: &str,
    expected: u32,
    deadline: Duration,
) {
    let started = std::time::Instant::now();
    loop {
        let process = orchestrator.get(id).await.unwrap();
        if process.restart_policy.retry_count >= expected {
            return;
        }
        assert!(
            started.elapsed() < deadline,
            "retry_count stuck at {} waiting for {expected}",
            process.restart_policy.retry_count
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn failed_exit_restarts_until_the_cap() {
    let (_dir, orchestrator) = harness();
    orchestrator.create(crashing_spec(2)).await.unwrap();
    orchestrator.start_process("p-1").await.unwrap();

    // Two automatic restarts, then the cap holds
    wait_for_retries(&orchestrator, "p-1", 2, Duration::from_secs(10)).await;

    // Let any further (erroneous) restart fire if it were going to
    tokio::time::sleep(Duration::from_millis(400)).await;

    let process = orchestrator.get("p-1").await.unwrap();
    assert_eq!(process.restart_policy.retry_count, 2);
    assert_eq!(process.status, ProcessStatus::Failed);

    let stats = orchestrator.statistics().await.unwrap();
    assert_eq!(stats.restarts, 2);
}

#[tokio::test]
async fn disabled_policy_never_restarts() {
    let (_dir, orchestrator) = harness();
    orchestrator.create(sh_spec("crasher", "exit 9")).await.unwrap();
    orchestrator.start_process("p-1").await.unwrap();
    wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let process = orchestrator.get("p-1").await.unwrap();
    assert_eq!(process.restart_policy.retry_count, 0);
    assert_eq!(process.status, ProcessStatus::Failed);
}

#[tokio::test]
async fn clean_exit_never_restarts() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(ProcessSpec {
            restart_policy: Some(RestartPolicy {
                enabled: true,
                max_retries: 3,
                retry_delay_ms: 50,
                ..RestartPolicy::default()
            }),
            ..sh_spec("clean", "exit 0")
        })
        .await
        .unwrap();
    orchestrator.start_process("p-1").await.unwrap();
    wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let process = orchestrator.get("p-1").await.unwrap();
    assert_eq!(process.status, ProcessStatus::Stopped);
    assert_eq!(process.restart_policy.retry_count, 0);
}

#[tokio::test]
async fn operator_stop_never_restarts() {
    let (_dir, orchestrator) = harness();
    orchestrator
        .create(ProcessSpec {
            restart_policy: Some(RestartPolicy {
                enabled: true,
                max_retries: 3,
                retry_delay_ms: 50,
                ..RestartPolicy::default()
            }),
            ..sh_spec("sleeper", "sleep 60")
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

    orchestrator.stop_process("p-1").await.unwrap();
    wait_for_terminal(&orchestrator, "p-1", Duration::from_secs(5)).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let process = orchestrator.get("p-1").await.unwrap();
    assert_eq!(process.status, ProcessStatus::Stopped);
    assert_eq!(process.restart_policy.retry_count, 0);
}

#[tokio::test]
async fn updating_the_policy_resets_the_counter() {
    let (_dir, orchestrator) = harness();
    orchestrator.create(crashing_spec(1)).await.unwrap();
    orchestrator.start_process("p-1").await.unwrap();
    wait_for_retries(&orchestrator, "p-1", 1, Duration::from_secs(10)).await;

    // Counter is monotonic until an explicit policy replacement
    let updated = orchestrator
        .update(
            "p-1",
            ProcessUpdate {
                restart_policy: Some(RestartPolicy {
                    enabled: false,
                    ..RestartPolicy::default()
                }),
                ..ProcessUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.restart_policy.retry_count, 0);
}
