// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events emitted by process actors.
//!
//! Events carry every field the registry needs (pid, timestamps, exit
//! codes) so that the state manager remains the sole writer of those
//! fields on the process record.

use crate::process::{ProcessId, ProcessStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Asynchronous notifications about lifecycle transitions.
///
/// Serializes with `{"type": "process:started", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProcessEvent {
    /// Child spawned successfully and is running.
    #[serde(rename = "process:started")]
    Started {
        id: ProcessId,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    /// Child terminated; `status` distinguishes clean exit, failure,
    /// and signal kill.
    #[serde(rename = "process:stopped")]
    Stopped {
        id: ProcessId,
        status: ProcessStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        stopped_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Child terminated abnormally outside the normal wait path.
    #[serde(rename = "process:crashed")]
    Crashed { id: ProcessId, error: String },

    /// The actor's command loop has exited. The record is retained so
    /// queries still answer; only the actor handle is cleared.
    #[serde(rename = "actor:stopped")]
    ActorStopped { id: ProcessId },
}

impl ProcessEvent {
    /// The process this event concerns.
    pub fn process_id(&self) -> &ProcessId {
        match self {
            ProcessEvent::Started { id, .. }
            | ProcessEvent::Stopped { id, .. }
            | ProcessEvent::Crashed { id, .. }
            | ProcessEvent::ActorStopped { id } => id,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
