// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator: the public façade of the supervisor.
//!
//! Holds no per-process state of its own — the registry lives in the
//! state manager. The orchestrator owns the wiring and the global
//! policy: validation, port conflicts, prefix resolution, command
//! dispatch with timeouts, the actor event loop, restart policy, the
//! health monitor, and shutdown ordering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use compass_core::{
    build_process, validate, Clock, IdGen, Process, ProcessEvent, ProcessFilter, ProcessGroup,
    ProcessId, ProcessSpec, ProcessStatus, ProjectId, SupervisorError, SystemClock, UuidIdGen,
};
use compass_core::{EnvMap, GroupId, ProcessLog, RestartPolicy};
use compass_storage::ProcessStore;
use serde::Deserialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::actor::{self, ActorConfig, ActorHandle};
use crate::command::StartReceipt;
use crate::config::SupervisorConfig;
use crate::pipeline::{self, LogPipelineHandle};
use crate::state::{self, StateHandle};
use crate::stats::{Counters, Statistics};

/// Mutable fields accepted by the update operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub environment: Option<EnvMap>,
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
}

/// Caller-supplied definition for creating a group.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    #[serde(default)]
    pub project_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub process_ids: Vec<String>,
}

/// The supervisor façade. Cheap to clone; clones share every component.
pub struct Orchestrator<C: Clock = SystemClock, G: IdGen = UuidIdGen> {
    state: StateHandle,
    pipeline: LogPipelineHandle,
    events_tx: mpsc::Sender<ProcessEvent>,
    counters: Arc<Counters>,
    clock: C,
    id_gen: G,
    config: Arc<SupervisorConfig>,
    store: ProcessStore,
    started: Instant,
    shutdown: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
}

impl<C: Clock, G: IdGen> Clone for Orchestrator<C, G> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            pipeline: self.pipeline.clone(),
            events_tx: self.events_tx.clone(),
            counters: Arc::clone(&self.counters),
            clock: self.clock.clone(),
            id_gen: self.id_gen.clone(),
            config: Arc::clone(&self.config),
            store: self.store.clone(),
            started: self.started,
            shutdown: Arc::clone(&self.shutdown),
            shutting_down: Arc::clone(&self.shutting_down),
        }
    }
}

impl<C: Clock, G: IdGen> Orchestrator<C, G> {
    /// Wire up and start every component: state manager, log pipeline,
    /// event loop, health monitor.
    pub fn start(store: ProcessStore, config: SupervisorConfig, clock: C, id_gen: G) -> Self {
        let counters = Arc::new(Counters::default());
        let state = state::spawn(
            store.clone(),
            config.state_channel_capacity,
            config.event_channel_capacity,
            config.query_timeout,
        );
        let pipeline = pipeline::spawn(store.clone(), config.pipeline.clone(), Arc::clone(&counters));
        let (events_tx, events_rx) = mpsc::channel(config.event_channel_capacity);

        let orchestrator = Self {
            state,
            pipeline,
            events_tx,
            counters,
            clock,
            id_gen,
            config: Arc::new(config),
            store,
            started: Instant::now(),
            shutdown: Arc::new(Notify::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
        };

        tokio::spawn(orchestrator.clone().run_event_loop(events_rx));
        tokio::spawn(orchestrator.clone().run_health_monitor());

        orchestrator
    }

    // ── process operations ──────────────────────────────────────────────

    /// Validate and register a process; its actor is created alongside
    /// the record. The process comes back in `Pending`.
    pub async fn create(&self, spec: ProcessSpec) -> Result<Process, SupervisorError> {
        let process = build_process(spec, self.id_gen.next(), self.clock.now())?;

        if process.port > 0 {
            self.check_port(&process).await?;
        }

        let actor = self.spawn_actor_for(&process);
        if let Err(e) = self.state.register(process.clone(), Some(actor.clone())).await {
            actor.trigger_shutdown();
            return Err(e);
        }
        self.pipeline
            .register(process.id.clone(), process.project_id.clone())
            .await;

        info!(process_id = %process.id, name = %process.name, "process created");
        Ok(process)
    }

    /// Start a process by id or unique prefix.
    pub async fn start_process(&self, id: &str) -> Result<StartReceipt, SupervisorError> {
        let id = self.state.resolve(id).await?;
        self.start_resolved(&id).await
    }

    async fn start_resolved(&self, id: &ProcessId) -> Result<StartReceipt, SupervisorError> {
        let process = self
            .state
            .get_process(id)
            .await?
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
        if !process.can_start() {
            return Err(SupervisorError::IllegalState(format!(
                "process '{}' is already {}",
                process.name, process.status
            )));
        }

        let actor = self.ensure_actor(&process).await?;
        // Starting is advisory; the registry flips to Running only on
        // the actor's started event.
        let _ = self
            .state
            .update_status(id.clone(), ProcessStatus::Starting, self.clock.now())
            .await;

        actor
            .start(
                self.config.command_send_timeout,
                self.config.command_reply_timeout,
            )
            .await
    }

    /// Graceful stop by id or unique prefix. Stopping an already
    /// terminated (or never started) process succeeds without effect.
    pub async fn stop_process(&self, id: &str) -> Result<(), SupervisorError> {
        let id = self.state.resolve(id).await?;
        self.stop_resolved(&id).await
    }

    async fn stop_resolved(&self, id: &ProcessId) -> Result<(), SupervisorError> {
        let process = self
            .state
            .get_process(id)
            .await?
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
        if process.status.is_terminal() || process.status == ProcessStatus::Pending {
            return Ok(());
        }
        let Some(actor) = self.state.get_actor(id).await? else {
            // Active status without an actor only happens for records
            // that predate this supervisor run; nothing to stop.
            return Ok(());
        };

        actor
            .stop(
                self.config.command_send_timeout,
                self.config.command_reply_timeout,
            )
            .await?;
        let _ = self
            .state
            .update_status(id.clone(), ProcessStatus::Stopping, self.clock.now())
            .await;
        Ok(())
    }

    /// Restart by id or unique prefix: stop if running, wait for the
    /// exit, then spawn again.
    pub async fn restart_process(&self, id: &str) -> Result<StartReceipt, SupervisorError> {
        let id = self.state.resolve(id).await?;
        let process = self
            .state
            .get_process(&id)
            .await?
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
        let actor = self.ensure_actor(&process).await?;
        let reply_budget = self.config.command_reply_timeout + self.config.restart_wait_timeout;
        actor
            .restart(self.config.command_send_timeout, reply_budget)
            .await
    }

    /// Current snapshot of a process.
    pub async fn get(&self, id: &str) -> Result<Process, SupervisorError> {
        let id = self.state.resolve(id).await?;
        self.state
            .get_process(&id)
            .await?
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))
    }

    /// Snapshot listing, ordered by creation time.
    pub async fn list(&self, filter: ProcessFilter) -> Result<Vec<Process>, SupervisorError> {
        let mut processes = self.state.list(filter).await?;
        processes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(processes)
    }

    /// Up to `limit` most-recent log entries, oldest-first.
    /// `limit = 0` means everything available.
    pub async fn get_logs(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<ProcessLog>, SupervisorError> {
        let id = self.state.resolve(id).await?;
        self.pipeline.get_logs(&id, limit).await
    }

    /// Update mutable configuration (name, environment, restart policy).
    pub async fn update(
        &self,
        id: &str,
        update: ProcessUpdate,
    ) -> Result<Process, SupervisorError> {
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(SupervisorError::InvalidConfig(
                    "process name must not be empty".to_string(),
                ));
            }
        }
        if let Some(environment) = &update.environment {
            validate::validate_env(environment)?;
        }
        let id = self.state.resolve(id).await?;
        self.state
            .update_config(
                id,
                update.name,
                update.environment,
                update.restart_policy,
                self.clock.now(),
            )
            .await
    }

    /// Supervisor-wide statistics and health.
    pub async fn statistics(&self) -> Result<Statistics, SupervisorError> {
        let processes = self.state.list(ProcessFilter::default()).await?;
        let running = processes
            .iter()
            .filter(|p| p.status == ProcessStatus::Running)
            .count();
        Ok(self
            .counters
            .snapshot(self.started, processes.len(), running))
    }

    // ── groups ──────────────────────────────────────────────────────────

    /// Create a group. Member ids must resolve.
    pub async fn create_group(&self, spec: GroupSpec) -> Result<ProcessGroup, SupervisorError> {
        if spec.name.trim().is_empty() {
            return Err(SupervisorError::InvalidConfig(
                "group name must not be empty".to_string(),
            ));
        }
        let mut process_ids = Vec::with_capacity(spec.process_ids.len());
        for id in &spec.process_ids {
            process_ids.push(self.state.resolve(id).await?);
        }

        let now = self.clock.now();
        let group = ProcessGroup {
            id: GroupId::new(self.id_gen.next()),
            project_id: ProjectId::new(
                spec.project_id
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| "default".to_string()),
            ),
            name: spec.name,
            description: spec.description,
            process_ids,
            created_at: now,
            updated_at: now,
        };

        let store = self.store.clone();
        let to_save = group.clone();
        tokio::task::spawn_blocking(move || store.save_group(&to_save))
            .await
            .map_err(|e| SupervisorError::Internal(format!("group save task failed: {e}")))?
            .map_err(|e| SupervisorError::Internal(format!("group save failed: {e}")))?;

        info!(group_id = %group.id, name = %group.name, "group created");
        Ok(group)
    }

    /// Start every member, best-effort: all members are attempted and
    /// the last real error (if any) is returned. Members that are
    /// already running do not count as failures.
    pub async fn start_group(&self, id: &str) -> Result<(), SupervisorError> {
        let group = self.find_group(id).await?;
        let mut last_error = None;
        for member in &group.process_ids {
            match self.start_resolved(member).await {
                Ok(_) | Err(SupervisorError::IllegalState(_)) => {}
                Err(e) => {
                    warn!(group_id = %group.id, process_id = %member, error = %e, "group member failed to start");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop every member, best-effort (stop itself is idempotent).
    pub async fn stop_group(&self, id: &str) -> Result<(), SupervisorError> {
        let group = self.find_group(id).await?;
        let mut last_error = None;
        for member in &group.process_ids {
            if let Err(e) = self.stop_resolved(member).await {
                warn!(group_id = %group.id, process_id = %member, error = %e, "group member failed to stop");
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn find_group(&self, prefix: &str) -> Result<ProcessGroup, SupervisorError> {
        let store = self.store.clone();
        let groups = tokio::task::spawn_blocking(move || store.load_all_groups())
            .await
            .map_err(|e| SupervisorError::Internal(format!("group load task failed: {e}")))?
            .map_err(|e| SupervisorError::Internal(format!("group load failed: {e}")))?;

        if let Some(group) = groups.iter().find(|g| g.id == *prefix) {
            return Ok(group.clone());
        }
        let mut hits = groups.iter().filter(|g| g.id.as_str().starts_with(prefix));
        match (hits.next(), hits.next()) {
            (Some(group), None) => Ok(group.clone()),
            (None, _) => Err(SupervisorError::NotFound(prefix.to_string())),
            (Some(_), Some(_)) => Err(SupervisorError::AmbiguousId {
                prefix: prefix.to_string(),
                matches: groups
                    .iter()
                    .filter(|g| g.id.as_str().starts_with(prefix))
                    .count(),
            }),
        }
    }

    // ── shutdown ────────────────────────────────────────────────────────

    /// Stop running processes (parallel, best-effort), cancel the loops,
    /// then stop the state manager and the log pipeline.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        info!("supervisor shutting down");

        let processes = self
            .state
            .list(ProcessFilter::default())
            .await
            .unwrap_or_default();

        let mut stops = JoinSet::new();
        for process in processes.iter().filter(|p| p.status.can_stop()) {
            let this = self.clone();
            let id = process.id.clone();
            stops.spawn(async move {
                if let Err(e) = this.stop_resolved(&id).await {
                    debug!(process_id = %id, error = %e, "shutdown stop failed");
                }
            });
        }
        let drain = async {
            while stops.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.config.shutdown_timeout, drain)
            .await
            .is_err()
        {
            warn!("shutdown stops exceeded their ceiling");
        }

        // Cancel the event loop and health monitor
        self.shutdown.notify_waiters();

        // Tear down remaining actors
        for process in &processes {
            if let Ok(Some(actor)) = self.state.get_actor(&process.id).await {
                actor.trigger_shutdown();
            }
        }

        self.state.shutdown(self.config.shutdown_timeout).await;
        self.pipeline.shutdown().await;
        info!("supervisor stopped");
    }

    // ── internals ───────────────────────────────────────────────────────

    fn spawn_actor_for(&self, process: &Process) -> ActorHandle {
        actor::spawn_actor(
            process.clone(),
            self.events_tx.clone(),
            self.pipeline.sink(),
            self.clock.clone(),
            ActorConfig {
                graceful_stop_timeout: self.config.graceful_stop_timeout,
                restart_wait_timeout: self.config.restart_wait_timeout,
                restart_settle_delay: self.config.restart_settle_delay,
                command_channel_capacity: self.config.command_channel_capacity,
            },
        )
    }

    /// Get the live actor, lazily creating one for records recovered
    /// from disk without an actor.
    ///
    /// Creation happens inside the state manager's registry mutation,
    /// so concurrent starts on the same id cannot each spawn an actor.
    async fn ensure_actor(&self, process: &Process) -> Result<ActorHandle, SupervisorError> {
        if let Some(actor) = self.state.get_actor(&process.id).await? {
            return Ok(actor);
        }
        let this = self.clone();
        let actor = self
            .state
            .ensure_actor(
                process.id.clone(),
                Box::new(move |process: &Process| this.spawn_actor_for(process)),
            )
            .await?;
        self.pipeline
            .register(process.id.clone(), process.project_id.clone())
            .await;
        Ok(actor)
    }

    /// Reject a declared port that is already claimed by a live process
    /// or unbindable on localhost.
    async fn check_port(&self, process: &Process) -> Result<(), SupervisorError> {
        let all = self.state.list(ProcessFilter::default()).await?;
        if let Some(holder) = all
            .iter()
            .find(|p| p.id != process.id && p.status.is_active() && p.port == process.port)
        {
            return Err(SupervisorError::Conflict(format!(
                "port {} is declared by process {} ({})",
                process.port, holder.id, holder.name
            )));
        }

        let probe = tokio::net::TcpListener::bind(("127.0.0.1", process.port));
        match tokio::time::timeout(Duration::from_secs(1), probe).await {
            Ok(Ok(_listener)) => Ok(()),
            Ok(Err(e)) => Err(SupervisorError::Conflict(format!(
                "port {} is already in use on localhost: {e}",
                process.port
            ))),
            Err(_) => Err(SupervisorError::Conflict(format!(
                "port {} probe timed out",
                process.port
            ))),
        }
    }

    /// Main loop: absorb actor events, feed the registry, apply restart
    /// policy.
    async fn run_event_loop(self, mut events_rx: mpsc::Receiver<ProcessEvent>) {
        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    match event {
                        Some(event) => self.on_event(event),
                        None => break,
                    }
                }
                _ = self.shutdown.notified() => break,
            }
        }
        debug!("orchestrator event loop stopped");
    }

    fn on_event(&self, event: ProcessEvent) {
        if !self.state.forward_event(event.clone()) {
            self.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
            warn!("state event queue full, event dropped");
        }

        // Abnormal terminations are restart-eligible; a clean stop and
        // an operator-requested stop never are.
        if let ProcessEvent::Stopped { id, status, .. } = event {
            if matches!(status, ProcessStatus::Failed | ProcessStatus::Crashed)
                && !self.shutting_down.load(Ordering::SeqCst)
            {
                self.consider_restart(id);
            }
        }
    }

    /// Restart policy, enacted here so the actor stays single-purpose
    /// and the retry counter has a single writer (the state manager).
    fn consider_restart(&self, id: ProcessId) {
        let this = self.clone();
        tokio::spawn(async move {
            let Ok(Some(process)) = this.state.get_process(&id).await else {
                return;
            };
            if !process.restart_policy.can_retry() {
                if process.restart_policy.enabled {
                    info!(
                        process_id = %id,
                        retries = process.restart_policy.retry_count,
                        "restart retries exhausted"
                    );
                }
                return;
            }

            tokio::time::sleep(Duration::from_millis(process.restart_policy.retry_delay_ms)).await;

            // Re-check: the operator may have restarted or removed the
            // process during the delay.
            let Ok(Some(current)) = this.state.get_process(&id).await else {
                return;
            };
            if !current.status.can_start()
                || !current.restart_policy.can_retry()
                || this.shutting_down.load(Ordering::SeqCst)
            {
                return;
            }

            if this
                .state
                .record_restart(id.clone(), this.clock.now())
                .await
                .is_err()
            {
                return;
            }
            this.counters.restarts.fetch_add(1, Ordering::Relaxed);
            info!(process_id = %id, "automatic restart");
            if let Err(e) = this.start_resolved(&id).await {
                warn!(process_id = %id, error = %e, "automatic restart failed");
            }
        });
    }

    /// Samples queue depths and aggregates them into the health flag.
    async fn run_health_monitor(self) {
        let mut interval = tokio::time::interval(self.config.health_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let healthy = self.state.query_fill_ratio() < 0.8
                        && self.state.event_fill_ratio() < 0.8
                        && self.event_fill_ratio() < 0.8
                        && self.pipeline.fill_ratio() < 0.9;
                    self.counters.healthy.store(healthy, Ordering::Relaxed);
                    if !healthy {
                        warn!("supervisor health degraded: a queue is near capacity");
                    }
                    let _ = self.state.touch_health(self.clock.now()).await;
                }
                _ = self.shutdown.notified() => break,
            }
        }
    }

    fn event_fill_ratio(&self) -> f64 {
        let max = self.events_tx.max_capacity();
        if max == 0 {
            return 0.0;
        }
        1.0 - (self.events_tx.capacity() as f64 / max as f64)
    }
}

#[cfg(test)]
#[path = "orchestrator_tests/mod.rs"]
mod tests;
