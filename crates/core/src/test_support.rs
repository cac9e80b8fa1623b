// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::event::ProcessEvent;
use crate::process::{Process, ProcessId, ProcessStatus, ProcessType, ProjectId, RestartPolicy};
use chrono::{DateTime, TimeZone, Utc};

/// Fixed timestamp all builders start from.
pub fn test_epoch() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000)
        .single()
        .unwrap_or_default()
}

/// A pending custom process with sensible defaults.
pub fn test_process(id: &str, name: &str) -> Process {
    let now = test_epoch();
    Process {
        id: ProcessId::new(id),
        project_id: ProjectId::new("proj-test"),
        name: name.to_string(),
        kind: ProcessType::Custom,
        command: "/bin/true".to_string(),
        args: Vec::new(),
        working_dir: None,
        environment: Default::default(),
        port: 0,
        restart_policy: RestartPolicy::default(),
        status: ProcessStatus::Pending,
        pid: None,
        exit_code: None,
        created_at: now,
        updated_at: now,
        started_at: None,
        stopped_at: None,
        last_health_check: None,
    }
}

// ── Event factory functions ─────────────────────────────────────────────────

pub fn started_event(id: &str, pid: u32) -> ProcessEvent {
    ProcessEvent::Started {
        id: ProcessId::new(id),
        pid,
        started_at: test_epoch(),
    }
}

pub fn stopped_event(id: &str, status: ProcessStatus, exit_code: Option<i32>) -> ProcessEvent {
    ProcessEvent::Stopped {
        id: ProcessId::new(id),
        status,
        exit_code,
        stopped_at: test_epoch(),
        error: None,
    }
}

pub fn actor_stopped_event(id: &str) -> ProcessEvent {
    ProcessEvent::ActorStopped {
        id: ProcessId::new(id),
    }
}
