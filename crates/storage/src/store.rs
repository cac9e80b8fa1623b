// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process, group, and log persistence.

use compass_core::{Process, ProcessGroup, ProcessId, ProcessLog, ProjectId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::atomic;

/// Cap on persisted log entries per process; oldest are dropped on write.
pub const DEFAULT_MAX_PERSISTED_LOGS: usize = 5_000;

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// File-backed store for process records, groups, and logs.
///
/// Cheap to clone; all clones share the same root and the same per-file
/// write locks, so concurrent tasks cannot interleave temp-file renames
/// on a single path. Reads do not lock.
#[derive(Clone)]
pub struct ProcessStore {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    max_persisted_logs: usize,
    /// One lock per file path, created on first write.
    file_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ProcessStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_log_cap(root, DEFAULT_MAX_PERSISTED_LOGS)
    }

    pub fn with_log_cap(root: impl Into<PathBuf>, max_persisted_logs: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                max_persisted_logs,
                file_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    fn project_dir(&self, project: &ProjectId) -> PathBuf {
        self.inner.root.join(project.as_str())
    }

    fn processes_path(&self, project: &ProjectId) -> PathBuf {
        self.project_dir(project).join("processes.json")
    }

    fn groups_path(&self, project: &ProjectId) -> PathBuf {
        self.project_dir(project).join("process_groups.json")
    }

    fn logs_path(&self, project: &ProjectId, process: &ProcessId) -> PathBuf {
        self.project_dir(project)
            .join("logs")
            .join(format!("{}.json", process.as_str()))
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.inner.file_locks.lock();
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    // ── processes ───────────────────────────────────────────────────────

    /// Insert or replace one process record in its project file.
    pub fn save_process(&self, process: &Process) -> Result<(), StoreError> {
        let path = self.processes_path(&process.project_id);
        let lock = self.lock_for(&path);
        let _guard = lock.lock();

        let mut processes: Vec<Process> = atomic::read_json(&path)?;
        match processes.iter_mut().find(|p| p.id == process.id) {
            Some(slot) => *slot = process.clone(),
            None => processes.push(process.clone()),
        }
        atomic::write_json(&path, &processes)
    }

    /// Replace a project's process file wholesale (shutdown flush).
    pub fn save_processes(
        &self,
        project: &ProjectId,
        processes: &[Process],
    ) -> Result<(), StoreError> {
        let path = self.processes_path(project);
        let lock = self.lock_for(&path);
        let _guard = lock.lock();
        atomic::write_json(&path, &processes)
    }

    pub fn load_processes(&self, project: &ProjectId) -> Result<Vec<Process>, StoreError> {
        atomic::read_json(&self.processes_path(project))
    }

    /// Load every process from every project directory under the root.
    ///
    /// Used at boot for reconciliation. Unreadable project dirs are
    /// skipped rather than failing startup.
    pub fn load_all_processes(&self) -> Result<Vec<Process>, StoreError> {
        let mut all = Vec::new();
        for project in self.project_ids()? {
            all.extend(self.load_processes(&project)?);
        }
        Ok(all)
    }

    // ── groups ──────────────────────────────────────────────────────────

    pub fn save_group(&self, group: &ProcessGroup) -> Result<(), StoreError> {
        let path = self.groups_path(&group.project_id);
        let lock = self.lock_for(&path);
        let _guard = lock.lock();

        let mut groups: Vec<ProcessGroup> = atomic::read_json(&path)?;
        match groups.iter_mut().find(|g| g.id == group.id) {
            Some(slot) => *slot = group.clone(),
            None => groups.push(group.clone()),
        }
        atomic::write_json(&path, &groups)
    }

    pub fn load_groups(&self, project: &ProjectId) -> Result<Vec<ProcessGroup>, StoreError> {
        atomic::read_json(&self.groups_path(project))
    }

    pub fn load_all_groups(&self) -> Result<Vec<ProcessGroup>, StoreError> {
        let mut all = Vec::new();
        for project in self.project_ids()? {
            all.extend(self.load_groups(&project)?);
        }
        Ok(all)
    }

    // ── logs ────────────────────────────────────────────────────────────

    /// Append a batch of log entries to a process' log file.
    ///
    /// The file is capped at `max_persisted_logs` most-recent entries.
    pub fn append_logs(
        &self,
        project: &ProjectId,
        process: &ProcessId,
        entries: &[ProcessLog],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let path = self.logs_path(project, process);
        let lock = self.lock_for(&path);
        let _guard = lock.lock();

        let mut logs: Vec<ProcessLog> = atomic::read_json(&path)?;
        logs.extend_from_slice(entries);
        if logs.len() > self.inner.max_persisted_logs {
            let excess = logs.len() - self.inner.max_persisted_logs;
            logs.drain(..excess);
        }
        atomic::write_json(&path, &logs)
    }

    /// Replace a process' log file with the given window (shutdown flush).
    ///
    /// Used when the caller already holds the authoritative recent window
    /// and appending would duplicate entries. Still capped.
    pub fn save_logs(
        &self,
        project: &ProjectId,
        process: &ProcessId,
        entries: &[ProcessLog],
    ) -> Result<(), StoreError> {
        let path = self.logs_path(project, process);
        let lock = self.lock_for(&path);
        let _guard = lock.lock();

        let start = entries.len().saturating_sub(self.inner.max_persisted_logs);
        atomic::write_json(&path, &&entries[start..])
    }

    /// Load up to `limit` most-recent log entries, oldest-first.
    /// `limit = 0` means all.
    pub fn load_logs(
        &self,
        project: &ProjectId,
        process: &ProcessId,
        limit: usize,
    ) -> Result<Vec<ProcessLog>, StoreError> {
        let mut logs: Vec<ProcessLog> = atomic::read_json(&self.logs_path(project, process))?;
        if limit > 0 && logs.len() > limit {
            let excess = logs.len() - limit;
            logs.drain(..excess);
        }
        Ok(logs)
    }

    // ── helpers ─────────────────────────────────────────────────────────

    fn project_ids(&self) -> Result<Vec<ProjectId>, StoreError> {
        let mut projects = Vec::new();
        let entries = match fs::read_dir(&self.inner.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(projects),
            Err(e) => return Err(e.into()),
        };
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    projects.push(ProjectId::new(name));
                }
            }
        }
        projects.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(projects)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
