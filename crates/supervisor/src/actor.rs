// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process actor: exclusive owner of one child process.
//!
//! All mutations of the child (spawn, signal, wait, capture) happen in
//! this actor's task; other components hold only an [`ActorHandle`] that
//! forwards typed commands. Output readers and the wait watcher run as
//! subtasks; neither touches actor state directly — they report back
//! over channels.

use std::process::Stdio;
use std::time::Duration;

use compass_core::{
    Clock, LogKind, LogLevel, Process, ProcessEvent, ProcessId, ProcessLog, ProcessStatus,
    SupervisorError,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{ActorCommand, ActorStatus, StartReceipt};
use crate::pipeline::LogSink;

/// Env overlay forcing line-buffered output from common runtimes, so
/// capture sees lines as they are printed rather than on exit.
const UNBUFFERED_ENV: &[(&str, &str)] = &[
    ("PYTHONUNBUFFERED", "1"),
    ("PYTHONIOENCODING", "utf-8"),
    ("NODE_NO_READLINE", "1"),
    ("FORCE_COLOR", "0"),
];

/// Timing knobs the actor needs, taken from the supervisor config.
#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub graceful_stop_timeout: Duration,
    pub restart_wait_timeout: Duration,
    pub restart_settle_delay: Duration,
    pub command_channel_capacity: usize,
}

/// Handle to a running actor. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ActorHandle {
    id: ProcessId,
    command_tx: mpsc::Sender<ActorCommand>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ActorHandle {
    pub fn id(&self) -> &ProcessId {
        &self.id
    }

    /// Enqueue a command with a bounded send timeout. A saturated queue
    /// surfaces as `Timeout` rather than blocking the caller.
    async fn send(&self, command: ActorCommand, timeout: Duration) -> Result<(), SupervisorError> {
        let name = command.name();
        match tokio::time::timeout(timeout, self.command_tx.send(command)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SupervisorError::Internal(format!(
                "actor for {} is gone",
                self.id
            ))),
            Err(_) => Err(SupervisorError::Timeout(format!(
                "{name} command queue full for {}",
                self.id
            ))),
        }
    }

    async fn round_trip<T>(
        &self,
        command: ActorCommand,
        reply_rx: oneshot::Receiver<Result<T, SupervisorError>>,
        send_timeout: Duration,
        reply_timeout: Duration,
    ) -> Result<T, SupervisorError> {
        let name = command.name();
        self.send(command, send_timeout).await?;
        match tokio::time::timeout(reply_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SupervisorError::Internal(format!(
                "actor for {} dropped the {name} reply",
                self.id
            ))),
            Err(_) => Err(SupervisorError::Timeout(format!(
                "no {name} reply from {} within {reply_timeout:?}",
                self.id
            ))),
        }
    }

    pub async fn start(
        &self,
        send_timeout: Duration,
        reply_timeout: Duration,
    ) -> Result<StartReceipt, SupervisorError> {
        let (reply, reply_rx) = oneshot::channel();
        self.round_trip(ActorCommand::Start { reply }, reply_rx, send_timeout, reply_timeout)
            .await
    }

    pub async fn stop(
        &self,
        send_timeout: Duration,
        reply_timeout: Duration,
    ) -> Result<(), SupervisorError> {
        let (reply, reply_rx) = oneshot::channel();
        self.round_trip(ActorCommand::Stop { reply }, reply_rx, send_timeout, reply_timeout)
            .await
    }

    pub async fn kill(
        &self,
        send_timeout: Duration,
        reply_timeout: Duration,
    ) -> Result<(), SupervisorError> {
        let (reply, reply_rx) = oneshot::channel();
        self.round_trip(ActorCommand::Kill { reply }, reply_rx, send_timeout, reply_timeout)
            .await
    }

    pub async fn restart(
        &self,
        send_timeout: Duration,
        reply_timeout: Duration,
    ) -> Result<StartReceipt, SupervisorError> {
        let (reply, reply_rx) = oneshot::channel();
        self.round_trip(ActorCommand::Restart { reply }, reply_rx, send_timeout, reply_timeout)
            .await
    }

    pub async fn status(
        &self,
        send_timeout: Duration,
        reply_timeout: Duration,
    ) -> Result<ActorStatus, SupervisorError> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(ActorCommand::Status { reply }, send_timeout).await?;
        match tokio::time::timeout(reply_timeout, reply_rx).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(_)) => Err(SupervisorError::Internal(format!(
                "actor for {} dropped the status reply",
                self.id
            ))),
            Err(_) => Err(SupervisorError::Timeout(format!(
                "no status reply from {}",
                self.id
            ))),
        }
    }

    /// Ask the actor to tear down. The actor force-kills its child and
    /// emits `actor:stopped` on the way out.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.try_send(());
    }
}

/// Spawn an actor task for a process definition.
///
/// At most one actor may exist per process id; the registry enforces
/// this by routing every command through the stored handle.
pub fn spawn_actor<C: Clock>(
    process: Process,
    events: mpsc::Sender<ProcessEvent>,
    sink: LogSink,
    clock: C,
    config: ActorConfig,
) -> ActorHandle {
    let (command_tx, command_rx) = mpsc::channel(config.command_channel_capacity.max(1));
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let (exit_tx, exit_rx) = mpsc::channel(4);

    let handle = ActorHandle {
        id: process.id.clone(),
        command_tx,
        shutdown_tx,
    };

    let actor = Actor {
        definition: process,
        status: ProcessStatus::Pending,
        pid: None,
        generation: 0,
        events,
        sink,
        clock,
        config,
        exit_tx,
        reader_handles: Vec::new(),
    };
    tokio::spawn(actor.run(command_rx, exit_rx, shutdown_rx));

    handle
}

/// Outcome reported by the wait watcher: the spawn generation it
/// belongs to plus the raw wait result.
type ExitReport = (u64, std::io::Result<std::process::ExitStatus>);

struct Actor<C: Clock> {
    definition: Process,
    status: ProcessStatus,
    pid: Option<u32>,
    /// Increments per spawn so a stale exit from a replaced child is
    /// ignored.
    generation: u64,
    events: mpsc::Sender<ProcessEvent>,
    sink: LogSink,
    clock: C,
    config: ActorConfig,
    exit_tx: mpsc::Sender<ExitReport>,
    reader_handles: Vec<JoinHandle<u64>>,
}

impl<C: Clock> Actor<C> {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<ActorCommand>,
        mut exit_rx: mpsc::Receiver<ExitReport>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        // Reconciled records may start from a terminal status.
        self.status = self.definition.status;
        let id = self.definition.id.clone();
        debug!(process_id = %id, "actor started");

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command, &mut exit_rx).await,
                        None => break,
                    }
                }

                Some((generation, outcome)) = exit_rx.recv() => {
                    self.handle_exit(generation, outcome).await;
                }

                _ = shutdown_rx.recv() => {
                    self.teardown().await;
                    break;
                }
            }
        }

        if self
            .events
            .try_send(ProcessEvent::ActorStopped { id: id.clone() })
            .is_err()
        {
            warn!(process_id = %id, "event channel full, actor-stopped event dropped");
        }
        debug!(process_id = %id, "actor stopped");
    }

    async fn handle_command(
        &mut self,
        command: ActorCommand,
        exit_rx: &mut mpsc::Receiver<ExitReport>,
    ) {
        debug!(process_id = %self.definition.id, command = command.name(), "actor command");
        match command {
            ActorCommand::Start { reply } => {
                let result = if self.status.can_start() {
                    self.do_spawn().await
                } else {
                    Err(SupervisorError::IllegalState(format!(
                        "process {} is {}",
                        self.definition.id, self.status
                    )))
                };
                let _ = reply.send(result);
            }

            ActorCommand::Stop { reply } => {
                let result = self.do_stop();
                let _ = reply.send(result);
            }

            ActorCommand::Kill { reply } => {
                if let Some(pid) = self.pid {
                    let _ = signal_pid(pid, Signal::Kill);
                    self.status = ProcessStatus::Stopping;
                }
                let _ = reply.send(Ok(()));
            }

            ActorCommand::Restart { reply } => {
                let result = self.do_restart(exit_rx).await;
                let _ = reply.send(result);
            }

            ActorCommand::Status { reply } => {
                let _ = reply.send(ActorStatus {
                    status: self.status,
                    pid: self.pid,
                });
            }
        }
    }

    /// Spawn the child with captured pipes and report the pid.
    async fn do_spawn(&mut self) -> Result<StartReceipt, SupervisorError> {
        self.status = ProcessStatus::Starting;

        let mut command = Command::new(&self.definition.command);
        command
            .args(&self.definition.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.definition.working_dir {
            command.current_dir(dir);
        }
        for (name, value) in UNBUFFERED_ENV {
            command.env(name, value);
        }
        for (name, value) in &self.definition.environment {
            command.env(name, value);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to spawn {}: {e}", self.definition.command);
                warn!(process_id = %self.definition.id, error = %e, "spawn failed");
                self.status = ProcessStatus::Failed;
                self.emit_stopped(ProcessStatus::Failed, None, Some(message.clone()))
                    .await;
                self.system_log(message, LogLevel::Error);
                return Err(SupervisorError::StartFailed(e.to_string()));
            }
        };

        let Some(pid) = child.id() else {
            // Child already reaped between spawn and here
            self.status = ProcessStatus::Failed;
            let message = "child exited before a pid could be observed".to_string();
            self.emit_stopped(ProcessStatus::Failed, None, Some(message.clone()))
                .await;
            return Err(SupervisorError::StartFailed(message));
        };

        self.generation += 1;
        let generation = self.generation;

        // Pipes were created by spawn; a missing handle means capture
        // can't be trusted, so fail the start.
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.start_kill();
            self.status = ProcessStatus::Failed;
            let message = "could not attach output pipes".to_string();
            self.emit_stopped(ProcessStatus::Failed, None, Some(message.clone()))
                .await;
            return Err(SupervisorError::StartFailed(message));
        };

        let stdout_reader = self.spawn_reader(LogKind::Stdout, stdout);
        let stderr_reader = self.spawn_reader(LogKind::Stderr, stderr);
        self.reader_handles.push(stdout_reader);
        self.reader_handles.push(stderr_reader);

        // Dedicated wait watcher owns the child from here on.
        let exit_tx = self.exit_tx.clone();
        tokio::spawn(async move {
            let outcome = child.wait().await;
            let _ = exit_tx.send((generation, outcome)).await;
        });

        let started_at = self.clock.now();
        self.pid = Some(pid);
        self.status = ProcessStatus::Running;

        info!(process_id = %self.definition.id, pid, "process started");
        self.system_log(
            format!("started '{}' (pid {pid})", self.definition.command),
            LogLevel::Info,
        );
        let started = ProcessEvent::Started {
            id: self.definition.id.clone(),
            pid,
            started_at,
        };
        if self.events.try_send(started).is_err() {
            warn!(process_id = %self.definition.id, "event channel full, started event dropped");
        }

        Ok(StartReceipt { pid, started_at })
    }

    /// Graceful stop: SIGTERM now, SIGKILL from a one-shot escalation
    /// task if the child ignores it. Idempotent on non-running states.
    fn do_stop(&mut self) -> Result<(), SupervisorError> {
        if !self.status.can_stop() {
            // Already terminated (or never started): absorb the race
            // between wait completion and a user-initiated stop.
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };

        let _ = signal_pid(pid, Signal::Term);
        self.status = ProcessStatus::Stopping;
        self.system_log(format!("sent SIGTERM to pid {pid}"), LogLevel::Info);

        // Escalation task: sends at most one SIGKILL, then exits. It
        // never touches actor state.
        let grace = self.config.graceful_stop_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if pid_alive(pid) {
                warn!(pid, "graceful stop expired, escalating to SIGKILL");
                let _ = signal_pid(pid, Signal::Kill);
            }
        });

        Ok(())
    }

    /// Stop (if running), wait for the exit, settle, spawn again.
    async fn do_restart(
        &mut self,
        exit_rx: &mut mpsc::Receiver<ExitReport>,
    ) -> Result<StartReceipt, SupervisorError> {
        if self.status.can_stop() {
            if let Some(pid) = self.pid {
                let _ = signal_pid(pid, Signal::Term);
                self.status = ProcessStatus::Stopping;
            }
            match tokio::time::timeout(self.config.restart_wait_timeout, exit_rx.recv()).await {
                Ok(Some((generation, outcome))) => self.handle_exit(generation, outcome).await,
                Ok(None) => {}
                Err(_) => {
                    // Old child ignored SIGTERM for the whole window
                    if let Some(pid) = self.pid {
                        warn!(pid, "restart wait expired, escalating to SIGKILL");
                        let _ = signal_pid(pid, Signal::Kill);
                    }
                    if let Ok(Some((generation, outcome))) =
                        tokio::time::timeout(Duration::from_secs(2), exit_rx.recv()).await
                    {
                        self.handle_exit(generation, outcome).await;
                    }
                }
            }
        }

        tokio::time::sleep(self.config.restart_settle_delay).await;
        self.do_spawn().await
    }

    /// Interpret a wait result and emit the terminal event.
    async fn handle_exit(
        &mut self,
        generation: u64,
        outcome: std::io::Result<std::process::ExitStatus>,
    ) {
        if generation != self.generation {
            debug!(process_id = %self.definition.id, generation, "stale exit ignored");
            return;
        }

        let stopped_at = self.clock.now();
        let was_stopping = self.status == ProcessStatus::Stopping;

        let (status, exit_code, detail) = match outcome {
            Ok(exit) => interpret_exit(exit, was_stopping),
            Err(e) => (
                ProcessStatus::Failed,
                None,
                format!("wait failed: {e}"),
            ),
        };

        self.pid = None;
        self.status = status;
        self.join_readers().await;

        info!(
            process_id = %self.definition.id,
            status = %status,
            exit_code,
            "process exited"
        );
        self.system_log(detail.clone(), LogLevel::Info);
        self.emit_stopped(status, exit_code, Some(detail)).await;
    }

    /// Surface reader subtask panics as system log entries; they must
    /// never take the actor down.
    async fn join_readers(&mut self) {
        for handle in self.reader_handles.drain(..) {
            match tokio::time::timeout(Duration::from_secs(1), handle).await {
                Ok(Ok(_lines)) => {}
                Ok(Err(e)) if e.is_panic() => {
                    self.sink.submit(ProcessLog::system(
                        uuid::Uuid::new_v4().to_string(),
                        self.definition.id.clone(),
                        "output reader panicked",
                        LogLevel::Error,
                        self.clock.now(),
                    ));
                }
                _ => {}
            }
        }
    }

    /// Line reader for one pipe. Submits each line non-blocking; on a
    /// full pipeline the line is dropped and counted, never waited for.
    fn spawn_reader<R>(&self, kind: LogKind, stream: R) -> JoinHandle<u64>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let id = self.definition.id.clone();
        let sink = self.sink.clone();
        let clock = self.clock.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            let mut count: u64 = 0;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        count += 1;
                        sink.submit(ProcessLog::line(
                            uuid::Uuid::new_v4().to_string(),
                            id.clone(),
                            kind,
                            line,
                            clock.now(),
                        ));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(process_id = %id, error = %e, "pipe read error");
                        break;
                    }
                }
            }
            sink.submit(ProcessLog::system(
                uuid::Uuid::new_v4().to_string(),
                id.clone(),
                format!("{kind} closed after {count} lines"),
                LogLevel::Info,
                clock.now(),
            ));
            count
        })
    }

    /// Forced teardown on cancellation: kill the child, report, exit.
    async fn teardown(&mut self) {
        if let Some(pid) = self.pid {
            let _ = signal_pid(pid, Signal::Kill);
            self.status = ProcessStatus::Stopped;
            self.emit_stopped(
                ProcessStatus::Stopped,
                None,
                Some("killed during supervisor shutdown".to_string()),
            )
            .await;
        }
    }

    async fn emit_stopped(
        &self,
        status: ProcessStatus,
        exit_code: Option<i32>,
        error: Option<String>,
    ) {
        let event = ProcessEvent::Stopped {
            id: self.definition.id.clone(),
            status,
            exit_code,
            stopped_at: self.clock.now(),
            error,
        };
        if self.events.try_send(event).is_err() {
            warn!(process_id = %self.definition.id, "event channel full, exit event dropped");
        }
    }

    fn system_log(&self, message: String, level: LogLevel) {
        self.sink.submit(ProcessLog::system(
            uuid::Uuid::new_v4().to_string(),
            self.definition.id.clone(),
            message,
            level,
            self.clock.now(),
        ));
    }
}

/// Translate an `ExitStatus` into a terminal status + detail line.
///
/// A child that dies to SIGTERM/SIGKILL while a graceful stop is in
/// flight counts as `Stopped` — that is the polite termination working,
/// not a crash.
fn interpret_exit(
    exit: std::process::ExitStatus,
    was_stopping: bool,
) -> (ProcessStatus, Option<i32>, String) {
    use std::os::unix::process::ExitStatusExt;

    if let Some(code) = exit.code() {
        let status = if code == 0 || was_stopping {
            ProcessStatus::Stopped
        } else {
            ProcessStatus::Failed
        };
        (status, Some(code), format!("process exited with code {code}"))
    } else {
        let sig = exit.signal().unwrap_or(0);
        let status = if was_stopping && (sig == 15 || sig == 9) {
            ProcessStatus::Stopped
        } else {
            ProcessStatus::Crashed
        };
        (status, None, format!("process terminated by signal {sig}"))
    }
}

enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_pid(pid: u32, signal: Signal) -> Result<(), std::io::Error> {
    use nix::sys::signal::{kill, Signal as NixSignal};
    use nix::unistd::Pid;

    let sig = match signal {
        Signal::Term => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };
    kill(Pid::from_raw(pid as i32), sig)
        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
}

/// Probe whether a pid is still alive (signal 0).
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(test)]
#[path = "actor_tests.rs"]
mod tests;
