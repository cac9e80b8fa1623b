// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process record and lifecycle state machine.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a supervised process.
    ///
    /// Globally unique across projects and never reused; callers may
    /// address a process by any unambiguous prefix of its id.
    #[derive(Default)]
    pub struct ProcessId;
}

crate::define_id! {
    /// Identifier of the project a process belongs to.
    #[derive(Default)]
    pub struct ProjectId;
}

/// Environment mapping, insertion-ordered so definitions round-trip stably.
pub type EnvMap = IndexMap<String, String>;

/// Lifecycle status of a supervised process.
///
/// ```text
/// Pending -> Starting -> Running -> Stopping -> Stopped
///               |           |                     ^
///               |           +-> Failed | Crashed -+-> (start again)
///               +-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Registered but never started
    Pending,
    /// Spawn requested, child not yet confirmed
    Starting,
    /// Child alive with a known pid
    Running,
    /// Graceful termination in progress
    Stopping,
    /// Exited cleanly (code 0)
    Stopped,
    /// Exited with a non-zero code, or spawn failed
    Failed,
    /// Terminated by a signal
    Crashed,
}

impl ProcessStatus {
    /// A start command is legal from these states.
    pub fn can_start(self) -> bool {
        matches!(
            self,
            ProcessStatus::Pending
                | ProcessStatus::Stopped
                | ProcessStatus::Failed
                | ProcessStatus::Crashed
        )
    }

    /// A stop command is legal from these states.
    pub fn can_stop(self) -> bool {
        matches!(self, ProcessStatus::Starting | ProcessStatus::Running)
    }

    /// Terminal states: the child is no longer alive on the host.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessStatus::Stopped | ProcessStatus::Failed | ProcessStatus::Crashed
        )
    }

    /// States in which the process may hold a port.
    pub fn is_active(self) -> bool {
        matches!(self, ProcessStatus::Starting | ProcessStatus::Running)
    }

    /// Whether `next` is a legal direct transition from `self`.
    ///
    /// Transitions are requested via commands but realized only on
    /// observable OS events (spawn return, wait return).
    pub fn can_transition_to(self, next: ProcessStatus) -> bool {
        use ProcessStatus::*;
        match self {
            Pending => matches!(next, Starting),
            Starting => matches!(next, Running | Failed | Stopping),
            Running => matches!(next, Stopping | Stopped | Failed | Crashed),
            Stopping => matches!(next, Stopped | Failed | Crashed),
            Stopped | Failed | Crashed => matches!(next, Starting),
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Pending => "pending",
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Stopping => "stopping",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Failed => "failed",
            ProcessStatus::Crashed => "crashed",
        };
        write!(f, "{s}")
    }
}

/// Category of a supervised process, used for filtering and templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessType {
    WebServer,
    ApiServer,
    BuildTool,
    Watcher,
    Test,
    Database,
    #[default]
    Custom,
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessType::WebServer => "web-server",
            ProcessType::ApiServer => "api-server",
            ProcessType::BuildTool => "build-tool",
            ProcessType::Watcher => "watcher",
            ProcessType::Test => "test",
            ProcessType::Database => "database",
            ProcessType::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ProcessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web-server" => Ok(ProcessType::WebServer),
            "api-server" => Ok(ProcessType::ApiServer),
            "build-tool" => Ok(ProcessType::BuildTool),
            "watcher" => Ok(ProcessType::Watcher),
            "test" => Ok(ProcessType::Test),
            "database" => Ok(ProcessType::Database),
            "custom" => Ok(ProcessType::Custom),
            other => Err(format!("unknown process type: {other}")),
        }
    }
}

/// Automatic restart configuration for crash recovery.
///
/// `retry_count` is monotonic: it increments per automatic restart and
/// is only cleared when a caller explicitly replaces the policy via an
/// update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestartPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_restart: Option<DateTime<Utc>>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 3,
            retry_delay_ms: 1_000,
            retry_count: 0,
            last_restart: None,
        }
    }
}

impl RestartPolicy {
    /// Whether another automatic restart is allowed.
    pub fn can_retry(&self) -> bool {
        self.enabled && self.retry_count < self.max_retries
    }
}

/// A supervised process definition plus its runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub id: ProcessId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProcessType,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "EnvMap::is_empty")]
    pub environment: EnvMap,
    /// Declared listen port; 0 means none.
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,
}

impl Process {
    pub fn can_start(&self) -> bool {
        self.status.can_start()
    }

    pub fn can_stop(&self) -> bool {
        self.status.can_stop()
    }

    /// Milliseconds the process has been up, if running.
    pub fn uptime_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.status != ProcessStatus::Running {
            return None;
        }
        let started = self.started_at?;
        Some((now - started).num_milliseconds().max(0) as u64)
    }
}

/// Caller-supplied definition for creating a process.
///
/// Everything except `name` may be filled in by a template; validation
/// turns a spec into a [`Process`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    #[serde(default)]
    pub project_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub environment: EnvMap,
    #[serde(default, rename = "type")]
    pub kind: Option<ProcessType>,
    #[serde(default)]
    pub port: Option<u32>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
}

/// Filter for process listings. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFilter {
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub status: Option<ProcessStatus>,
    #[serde(default, rename = "type")]
    pub kind: Option<ProcessType>,
}

impl ProcessFilter {
    pub fn matches(&self, process: &Process) -> bool {
        if let Some(project) = &self.project_id {
            if process.project_id != *project {
                return false;
            }
        }
        if let Some(status) = self.status {
            if process.status != status {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if process.kind != kind {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
