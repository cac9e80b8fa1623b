// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process groups: named aggregations started and stopped as a batch.

use crate::process::{ProcessId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a process group.
    #[derive(Default)]
    pub struct GroupId;
}

/// A named, ordered aggregation of process ids.
///
/// Pure aggregation: a group references processes but does not own them,
/// and group operations are best-effort over the members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroup {
    pub id: GroupId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub process_ids: Vec<ProcessId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
