// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State manager: single-writer registry of all known processes.
//!
//! Every read and write goes through typed messages on bounded queues,
//! giving a total order over registry mutations without locks. After a
//! register or status change the record is persisted asynchronously;
//! store failures are logged and never block the loop.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use compass_core::{
    EnvMap, Process, ProcessEvent, ProcessFilter, ProcessId, ProcessStatus, RestartPolicy,
    SupervisorError,
};
use compass_storage::ProcessStore;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::actor::ActorHandle;

/// Read-only queries answered from the registry.
pub enum StateQuery {
    GetProcess {
        id: ProcessId,
        reply: oneshot::Sender<Option<Process>>,
    },
    GetActor {
        id: ProcessId,
        reply: oneshot::Sender<Option<ActorHandle>>,
    },
    ListProcesses {
        filter: ProcessFilter,
        reply: oneshot::Sender<Vec<Process>>,
    },
    CountProcesses {
        reply: oneshot::Sender<usize>,
    },
    /// Resolve a full id or unique prefix.
    ResolveId {
        prefix: String,
        reply: oneshot::Sender<IdMatch>,
    },
}

/// Outcome of a prefix resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdMatch {
    None,
    One(ProcessId),
    Many(usize),
}

/// Spawns an actor for a process, invoked by the state manager inside
/// the registry mutation so at most one actor ever exists per id.
pub type ActorFactory = Box<dyn FnOnce(&Process) -> ActorHandle + Send>;

/// Mutations applied in queue order.
pub enum StateUpdate {
    Register {
        process: Process,
        actor: Option<ActorHandle>,
        reply: oneshot::Sender<Result<(), SupervisorError>>,
    },
    /// Return the live actor, spawning one via `spawn` when absent.
    ///
    /// Spawn-if-absent resolves inside the single-writer loop: two
    /// concurrent callers get the same handle and the factory runs at
    /// most once, so a losing caller never creates a second actor.
    EnsureActor {
        id: ProcessId,
        spawn: ActorFactory,
        reply: oneshot::Sender<Result<ActorHandle, SupervisorError>>,
    },
    Unregister {
        id: ProcessId,
    },
    UpdateStatus {
        id: ProcessId,
        status: ProcessStatus,
        timestamp: DateTime<Utc>,
    },
    /// Mutable configuration: name, environment, restart policy.
    UpdateConfig {
        id: ProcessId,
        name: Option<String>,
        environment: Option<EnvMap>,
        restart_policy: Option<RestartPolicy>,
        timestamp: DateTime<Utc>,
        reply: oneshot::Sender<Result<Process, SupervisorError>>,
    },
    /// Bump the restart counter ahead of an automatic restart.
    RecordRestart {
        id: ProcessId,
        timestamp: DateTime<Utc>,
    },
    /// Stamp `last_health_check` on running processes.
    TouchHealth {
        timestamp: DateTime<Utc>,
    },
    /// Flush every record and stop the loop.
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the state manager task. Cheap to clone.
#[derive(Clone)]
pub struct StateHandle {
    query_tx: mpsc::Sender<StateQuery>,
    update_tx: mpsc::Sender<StateUpdate>,
    event_tx: mpsc::Sender<ProcessEvent>,
    query_timeout: Duration,
}

impl StateHandle {
    async fn query<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> StateQuery,
        what: &str,
    ) -> Result<T, SupervisorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        match tokio::time::timeout(self.query_timeout, self.query_tx.send(make(reply_tx))).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(SupervisorError::Internal(
                    "state manager is gone".to_string(),
                ))
            }
            Err(_) => {
                return Err(SupervisorError::Timeout(format!(
                    "{what} query queue full"
                )))
            }
        }
        match tokio::time::timeout(self.query_timeout, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(SupervisorError::Internal(format!(
                "state manager dropped {what} reply"
            ))),
            Err(_) => Err(SupervisorError::Timeout(format!("{what} query reply"))),
        }
    }

    pub async fn get_process(&self, id: &ProcessId) -> Result<Option<Process>, SupervisorError> {
        let id = id.clone();
        self.query(move |reply| StateQuery::GetProcess { id, reply }, "get_process")
            .await
    }

    pub async fn get_actor(&self, id: &ProcessId) -> Result<Option<ActorHandle>, SupervisorError> {
        let id = id.clone();
        self.query(move |reply| StateQuery::GetActor { id, reply }, "get_actor")
            .await
    }

    pub async fn list(&self, filter: ProcessFilter) -> Result<Vec<Process>, SupervisorError> {
        self.query(
            move |reply| StateQuery::ListProcesses { filter, reply },
            "list_processes",
        )
        .await
    }

    pub async fn count(&self) -> Result<usize, SupervisorError> {
        self.query(|reply| StateQuery::CountProcesses { reply }, "count_processes")
            .await
    }

    /// Resolve an id or unique prefix to a full process id.
    pub async fn resolve(&self, prefix: &str) -> Result<ProcessId, SupervisorError> {
        let owned = prefix.to_string();
        let result = self
            .query(
                move |reply| StateQuery::ResolveId {
                    prefix: owned,
                    reply,
                },
                "resolve_id",
            )
            .await?;
        match result {
            IdMatch::One(id) => Ok(id),
            IdMatch::None => Err(SupervisorError::NotFound(prefix.to_string())),
            IdMatch::Many(matches) => Err(SupervisorError::AmbiguousId {
                prefix: prefix.to_string(),
                matches,
            }),
        }
    }

    async fn update(&self, update: StateUpdate) -> Result<(), SupervisorError> {
        match tokio::time::timeout(self.query_timeout, self.update_tx.send(update)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SupervisorError::Internal(
                "state manager is gone".to_string(),
            )),
            Err(_) => Err(SupervisorError::Timeout("update queue full".to_string())),
        }
    }

    pub async fn register(
        &self,
        process: Process,
        actor: Option<ActorHandle>,
    ) -> Result<(), SupervisorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.update(StateUpdate::Register {
            process,
            actor,
            reply: reply_tx,
        })
        .await?;
        match tokio::time::timeout(self.query_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SupervisorError::Internal(
                "state manager dropped register reply".to_string(),
            )),
            Err(_) => Err(SupervisorError::Timeout("register reply".to_string())),
        }
    }

    /// Get the live actor for `id`, spawning one atomically when none
    /// exists (e.g. records recovered from disk without an actor).
    pub async fn ensure_actor(
        &self,
        id: ProcessId,
        spawn: ActorFactory,
    ) -> Result<ActorHandle, SupervisorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.update(StateUpdate::EnsureActor {
            id,
            spawn,
            reply: reply_tx,
        })
        .await?;
        match tokio::time::timeout(self.query_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SupervisorError::Internal(
                "state manager dropped ensure-actor reply".to_string(),
            )),
            Err(_) => Err(SupervisorError::Timeout("ensure-actor reply".to_string())),
        }
    }

    pub async fn unregister(&self, id: ProcessId) -> Result<(), SupervisorError> {
        self.update(StateUpdate::Unregister { id }).await
    }

    pub async fn update_status(
        &self,
        id: ProcessId,
        status: ProcessStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SupervisorError> {
        self.update(StateUpdate::UpdateStatus {
            id,
            status,
            timestamp,
        })
        .await
    }

    pub async fn update_config(
        &self,
        id: ProcessId,
        name: Option<String>,
        environment: Option<EnvMap>,
        restart_policy: Option<RestartPolicy>,
        timestamp: DateTime<Utc>,
    ) -> Result<Process, SupervisorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.update(StateUpdate::UpdateConfig {
            id,
            name,
            environment,
            restart_policy,
            timestamp,
            reply: reply_tx,
        })
        .await?;
        match tokio::time::timeout(self.query_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SupervisorError::Internal(
                "state manager dropped update reply".to_string(),
            )),
            Err(_) => Err(SupervisorError::Timeout("update reply".to_string())),
        }
    }

    pub async fn record_restart(
        &self,
        id: ProcessId,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SupervisorError> {
        self.update(StateUpdate::RecordRestart { id, timestamp }).await
    }

    pub async fn touch_health(&self, timestamp: DateTime<Utc>) -> Result<(), SupervisorError> {
        self.update(StateUpdate::TouchHealth { timestamp }).await
    }

    /// Non-blocking event forward; the caller counts drops.
    pub fn forward_event(&self, event: ProcessEvent) -> bool {
        self.event_tx.try_send(event).is_ok()
    }

    /// Fraction of the query queue currently occupied.
    pub fn query_fill_ratio(&self) -> f64 {
        fill_ratio(&self.query_tx)
    }

    /// Fraction of the event queue currently occupied.
    pub fn event_fill_ratio(&self) -> f64 {
        fill_ratio(&self.event_tx)
    }

    /// Flush all records and stop the manager.
    pub async fn shutdown(&self, timeout: Duration) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .update_tx
            .send(StateUpdate::Shutdown { reply: reply_tx })
            .await
            .is_err()
        {
            return;
        }
        if tokio::time::timeout(timeout, reply_rx).await.is_err() {
            warn!("state manager shutdown flush exceeded its ceiling");
        }
    }
}

fn fill_ratio<T>(tx: &mpsc::Sender<T>) -> f64 {
    let max = tx.max_capacity();
    if max == 0 {
        return 0.0;
    }
    1.0 - (tx.capacity() as f64 / max as f64)
}

struct Entry {
    process: Process,
    actor: Option<ActorHandle>,
}

/// Spawn the state manager task.
///
/// Startup reconciliation runs inside the task before the first message
/// is served: persisted records are loaded, and anything persisted as
/// live is re-classified as `Stopped` — its previous host process is no
/// longer supervised. Actors are created lazily on the next start.
pub fn spawn(
    store: ProcessStore,
    channel_capacity: usize,
    event_channel_capacity: usize,
    query_timeout: Duration,
) -> StateHandle {
    let (query_tx, query_rx) = mpsc::channel(channel_capacity);
    let (update_tx, update_rx) = mpsc::channel(channel_capacity);
    let (event_tx, event_rx) = mpsc::channel(event_channel_capacity);

    let manager = StateManager {
        store,
        registry: HashMap::new(),
        shutdown_reply: None,
    };
    tokio::spawn(manager.run(query_rx, update_rx, event_rx));

    StateHandle {
        query_tx,
        update_tx,
        event_tx,
        query_timeout,
    }
}

pub struct StateManager {
    store: ProcessStore,
    registry: HashMap<ProcessId, Entry>,
    shutdown_reply: Option<oneshot::Sender<()>>,
}

impl StateManager {
    async fn run(
        mut self,
        mut query_rx: mpsc::Receiver<StateQuery>,
        mut update_rx: mpsc::Receiver<StateUpdate>,
        mut event_rx: mpsc::Receiver<ProcessEvent>,
    ) {
        self.reconcile().await;

        loop {
            tokio::select! {
                Some(query) = query_rx.recv() => self.handle_query(query),

                Some(update) = update_rx.recv() => {
                    if self.handle_update(update) {
                        break;
                    }
                }

                Some(event) = event_rx.recv() => self.handle_event(event),

                else => break,
            }
        }

        self.flush_all().await;
        if let Some(reply) = self.shutdown_reply.take() {
            let _ = reply.send(());
        }
        debug!("state manager stopped");
    }

    /// Load persisted records. Anything that claims to be live is
    /// reclassified: no actor supervises it anymore.
    async fn reconcile(&mut self) {
        let store = self.store.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load_all_processes()).await;
        let processes = match loaded {
            Ok(Ok(processes)) => processes,
            Ok(Err(e)) => {
                error!(error = %e, "failed to load persisted processes");
                return;
            }
            Err(e) => {
                error!(error = %e, "process load task failed");
                return;
            }
        };

        let mut reclassified = 0usize;
        for mut process in processes {
            if !process.status.is_terminal() && process.status != ProcessStatus::Pending {
                process.status = ProcessStatus::Stopped;
                process.pid = None;
                reclassified += 1;
                persist(&self.store, process.clone());
            }
            self.registry.insert(
                process.id.clone(),
                Entry {
                    process,
                    actor: None,
                },
            );
        }
        if !self.registry.is_empty() {
            info!(
                processes = self.registry.len(),
                reclassified, "recovered persisted processes"
            );
        }
    }

    fn handle_query(&self, query: StateQuery) {
        match query {
            StateQuery::GetProcess { id, reply } => {
                let _ = reply.send(self.registry.get(&id).map(|e| e.process.clone()));
            }
            StateQuery::GetActor { id, reply } => {
                let _ = reply.send(self.registry.get(&id).and_then(|e| e.actor.clone()));
            }
            StateQuery::ListProcesses { filter, reply } => {
                let processes = self
                    .registry
                    .values()
                    .filter(|e| filter.matches(&e.process))
                    .map(|e| e.process.clone())
                    .collect();
                let _ = reply.send(processes);
            }
            StateQuery::CountProcesses { reply } => {
                let _ = reply.send(self.registry.len());
            }
            StateQuery::ResolveId { prefix, reply } => {
                let _ = reply.send(self.resolve(&prefix));
            }
        }
    }

    fn resolve(&self, prefix: &str) -> IdMatch {
        if self.registry.contains_key(prefix) {
            return IdMatch::One(ProcessId::new(prefix));
        }
        let mut hits = self
            .registry
            .keys()
            .filter(|id| id.as_str().starts_with(prefix));
        match (hits.next(), hits.next()) {
            (None, _) => IdMatch::None,
            (Some(id), None) => IdMatch::One(id.clone()),
            (Some(_), Some(_)) => IdMatch::Many(
                self.registry
                    .keys()
                    .filter(|id| id.as_str().starts_with(prefix))
                    .count(),
            ),
        }
    }

    /// Apply one update. Returns true when the loop should stop.
    fn handle_update(&mut self, update: StateUpdate) -> bool {
        match update {
            StateUpdate::Register {
                process,
                actor,
                reply,
            } => {
                if self.registry.contains_key(&process.id) {
                    let _ = reply.send(Err(SupervisorError::Conflict(format!(
                        "process id {} already exists",
                        process.id
                    ))));
                    return false;
                }
                persist(&self.store, process.clone());
                self.registry
                    .insert(process.id.clone(), Entry { process, actor });
                let _ = reply.send(Ok(()));
            }

            StateUpdate::EnsureActor { id, spawn, reply } => {
                let result = match self.registry.get_mut(&id) {
                    Some(entry) => {
                        let actor = match entry.actor.clone() {
                            Some(actor) => actor,
                            None => {
                                let actor = spawn(&entry.process);
                                entry.actor = Some(actor.clone());
                                actor
                            }
                        };
                        Ok(actor)
                    }
                    None => Err(SupervisorError::NotFound(id.to_string())),
                };
                let _ = reply.send(result);
            }

            StateUpdate::Unregister { id } => {
                if let Some(entry) = self.registry.remove(&id) {
                    if let Some(actor) = entry.actor {
                        actor.trigger_shutdown();
                    }
                }
            }

            StateUpdate::UpdateStatus {
                id,
                status,
                timestamp,
            } => {
                if let Some(entry) = self.registry.get_mut(&id) {
                    // Requested transitions are advisory; an illegal one
                    // (e.g. a stale Stopping after the exit event landed)
                    // is skipped so the status timeline stays a valid
                    // state-machine path.
                    if entry.process.status == status
                        || entry.process.status.can_transition_to(status)
                    {
                        entry.process.status = status;
                        entry.process.updated_at = timestamp;
                        persist(&self.store, entry.process.clone());
                    } else {
                        debug!(
                            process_id = %id,
                            from = %entry.process.status,
                            to = %status,
                            "skipping illegal status update"
                        );
                    }
                }
            }

            StateUpdate::UpdateConfig {
                id,
                name,
                environment,
                restart_policy,
                timestamp,
                reply,
            } => {
                let result = match self.registry.get_mut(&id) {
                    Some(entry) => {
                        if let Some(name) = name {
                            entry.process.name = name;
                        }
                        if let Some(environment) = environment {
                            entry.process.environment = environment;
                        }
                        if let Some(restart_policy) = restart_policy {
                            entry.process.restart_policy = restart_policy;
                        }
                        entry.process.updated_at = timestamp;
                        persist(&self.store, entry.process.clone());
                        Ok(entry.process.clone())
                    }
                    None => Err(SupervisorError::NotFound(id.to_string())),
                };
                let _ = reply.send(result);
            }

            StateUpdate::RecordRestart { id, timestamp } => {
                if let Some(entry) = self.registry.get_mut(&id) {
                    entry.process.restart_policy.retry_count += 1;
                    entry.process.restart_policy.last_restart = Some(timestamp);
                    entry.process.updated_at = timestamp;
                    persist(&self.store, entry.process.clone());
                }
            }

            StateUpdate::TouchHealth { timestamp } => {
                for entry in self.registry.values_mut() {
                    if entry.process.status == ProcessStatus::Running {
                        entry.process.last_health_check = Some(timestamp);
                    }
                }
            }

            StateUpdate::Shutdown { reply } => {
                // Ack is deferred until the post-loop flush completes.
                self.shutdown_reply = Some(reply);
                return true;
            }
        }
        false
    }

    /// Translate a lifecycle event into a registry mutation.
    fn handle_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Started {
                id,
                pid,
                started_at,
            } => {
                if let Some(entry) = self.registry.get_mut(&id) {
                    entry.process.status = ProcessStatus::Running;
                    entry.process.pid = Some(pid);
                    entry.process.started_at = Some(started_at);
                    entry.process.exit_code = None;
                    entry.process.updated_at = started_at;
                    persist(&self.store, entry.process.clone());
                }
            }

            ProcessEvent::Stopped {
                id,
                status,
                exit_code,
                stopped_at,
                error,
            } => {
                if let Some(entry) = self.registry.get_mut(&id) {
                    entry.process.status = status;
                    entry.process.exit_code = exit_code;
                    entry.process.stopped_at = Some(stopped_at);
                    entry.process.pid = None;
                    entry.process.updated_at = stopped_at;
                    if let Some(error) = error {
                        debug!(process_id = %id, error, "process stop detail");
                    }
                    persist(&self.store, entry.process.clone());
                }
            }

            ProcessEvent::Crashed { id, error } => {
                if let Some(entry) = self.registry.get_mut(&id) {
                    warn!(process_id = %id, error, "process crashed");
                    entry.process.status = ProcessStatus::Crashed;
                    entry.process.pid = None;
                    persist(&self.store, entry.process.clone());
                }
            }

            ProcessEvent::ActorStopped { id } => {
                // Record retained so queries still answer.
                if let Some(entry) = self.registry.get_mut(&id) {
                    entry.actor = None;
                }
            }
        }
    }

    /// Shutdown flush: write every project's records in one pass.
    async fn flush_all(&self) {
        let mut by_project: HashMap<_, Vec<Process>> = HashMap::new();
        for entry in self.registry.values() {
            by_project
                .entry(entry.process.project_id.clone())
                .or_default()
                .push(entry.process.clone());
        }

        let mut saves = JoinSet::new();
        for (project, processes) in by_project {
            let store = self.store.clone();
            saves.spawn_blocking(move || store.save_processes(&project, &processes));
        }
        while let Some(result) = saves.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "shutdown flush failed"),
                Err(e) => error!(error = %e, "shutdown flush task failed"),
            }
        }
    }
}

/// Persist a record without blocking the loop.
///
/// Takes the store field directly so callers can persist while holding
/// a mutable borrow of the registry.
fn persist(store: &ProcessStore, process: Process) {
    let store = store.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = store.save_process(&process) {
            error!(process_id = %process.id, error = %e, "failed to persist process");
        }
    });
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
