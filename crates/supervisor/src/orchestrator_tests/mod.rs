// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use compass_core::{ProcessSpec, SequentialIdGen};
use compass_storage::ProcessStore;
use std::time::Duration;
use tempfile::TempDir;

mod groups;
mod lifecycle;
mod restart;

type TestOrchestrator = Orchestrator<SystemClock, SequentialIdGen>;

/// Orchestrator over a temp store with fast timeouts and predictable ids
/// (`p-1`, `p-2`, ...).
fn harness() -> (TempDir, TestOrchestrator) {
    let dir = TempDir::new().unwrap();
    let store = ProcessStore::new(dir.path());
    let orchestrator = Orchestrator::start(
        store,
        SupervisorConfig::fast(),
        SystemClock,
        SequentialIdGen::new("p"),
    );
    (dir, orchestrator)
}

fn sh_spec(name: &str, script: &str) -> ProcessSpec {
    ProcessSpec {
        name: name.to_string(),
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        ..ProcessSpec::default()
    }
}

/// Poll `get` until the process reaches `expected` or the deadline hits.
async fn wait_for_status(
    orchestrator: &TestOrchestrator,
    id: &str,
    expected: ProcessStatus,
    deadline: Duration,
) -> Process {
    let started = std::time::Instant::now();
    loop {
        let process = orchestrator.get(id).await.unwrap();
        if process.status == expected {
            return process;
        }
        assert!(
            started.elapsed() < deadline,
            "process {id} stuck in {} waiting for {expected}",
            process.status
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Poll until the process is in any terminal state.
async fn wait_for_terminal(
    orchestrator: &TestOrchestrator,
    id: &str,
    deadline: Duration,
) -> Process {
    let started = std::time::Instant::now();
    loop {
        let process = orchestrator.get(id).await.unwrap();
        if process.status.is_terminal() {
            return process;
        }
        assert!(
            started.elapsed() < deadline,
            "process {id} never terminated (status {})",
            process.status
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
