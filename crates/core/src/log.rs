// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process log entries.

use crate::process::ProcessId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source stream of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Stdout,
    Stderr,
    /// Emitted by the supervisor itself (spawn, exit, capture summaries)
    System,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogKind::Stdout => write!(f, "stdout"),
            LogKind::Stderr => write!(f, "stderr"),
            LogKind::System => write!(f, "system"),
        }
    }
}

/// Severity attached to system entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A single captured log line, trailing newline stripped.
///
/// Append-only from the perspective of any observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessLog {
    pub id: String,
    pub process_id: ProcessId,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
}

impl ProcessLog {
    /// Build an output-capture entry for one line.
    pub fn line(
        id: impl Into<String>,
        process_id: ProcessId,
        kind: LogKind,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            process_id,
            kind,
            message: message.into(),
            timestamp,
            level: None,
        }
    }

    /// Build a supervisor-generated system entry.
    pub fn system(
        id: impl Into<String>,
        process_id: ProcessId,
        message: impl Into<String>,
        level: LogLevel,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            process_id,
            kind: LogKind::System,
            message: message.into(),
            timestamp,
            level: Some(level),
        }
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
