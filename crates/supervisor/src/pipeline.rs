// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log pipeline: bounded, batching sink for process output.
//!
//! A single writer task owns every per-process ring buffer. Producers
//! (actor output readers) submit with a non-blocking send and drop on a
//! full channel — a slow disk must never stall a reader. Persistence is
//! batched and dispatched to blocking tasks so the writer loop itself
//! never waits on storage.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use compass_core::{ProcessId, ProcessLog, ProjectId, SupervisorError};
use compass_storage::ProcessStore;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::config::LogPipelineConfig;
use crate::stats::Counters;

/// Non-blocking entry point handed to actors.
///
/// Cheap to clone; all clones share the drop counter.
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::Sender<ProcessLog>,
    counters: Arc<Counters>,
}

impl LogSink {
    /// Submit one entry. Returns false (and counts a drop) when the
    /// pipeline is saturated. Never blocks.
    pub fn submit(&self, log: ProcessLog) -> bool {
        match self.tx.try_send(log) {
            Ok(()) => true,
            Err(_) => {
                self.counters.logs_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Fraction of the input channel currently occupied (0.0 - 1.0).
    pub fn fill_ratio(&self) -> f64 {
        let max = self.tx.max_capacity();
        if max == 0 {
            return 0.0;
        }
        1.0 - (self.tx.capacity() as f64 / max as f64)
    }
}

/// Control messages served by the writer loop between log entries.
enum Control {
    /// Record which project a process persists under.
    Register {
        process: ProcessId,
        project: ProjectId,
    },
    /// Drop a process' ring buffer (process removed).
    RemoveBuffer { process: ProcessId },
    /// Copy out a buffer tail for a read.
    ReadBuffer {
        process: ProcessId,
        limit: usize,
        reply: oneshot::Sender<BufferRead>,
    },
    /// Flush everything and stop; ack when done.
    Shutdown { reply: oneshot::Sender<()> },
}

struct BufferRead {
    entries: Vec<ProcessLog>,
    project: Option<ProjectId>,
}

/// Handle for reading from and controlling the pipeline.
#[derive(Clone)]
pub struct LogPipelineHandle {
    sink: LogSink,
    control_tx: mpsc::Sender<Control>,
    store: ProcessStore,
    config: LogPipelineConfig,
}

impl LogPipelineHandle {
    pub fn sink(&self) -> LogSink {
        self.sink.clone()
    }

    /// Fraction of the input channel currently occupied.
    pub fn fill_ratio(&self) -> f64 {
        self.sink.fill_ratio()
    }

    /// Tell the pipeline which project a process persists under.
    pub async fn register(&self, process: ProcessId, project: ProjectId) {
        let _ = self
            .control_tx
            .send(Control::Register { process, project })
            .await;
    }

    /// Drop the in-memory buffer for a removed process.
    pub async fn remove_buffer(&self, process: ProcessId) {
        let _ = self.control_tx.send(Control::RemoveBuffer { process }).await;
    }

    /// Up to `limit` most-recent entries, oldest-first (`limit = 0`: all
    /// available). When the buffer alone cannot satisfy the window, the
    /// persisted file tops it up with older entries.
    pub async fn get_logs(
        &self,
        process: &ProcessId,
        limit: usize,
    ) -> Result<Vec<ProcessLog>, SupervisorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control_tx
            .send(Control::ReadBuffer {
                process: process.clone(),
                limit,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SupervisorError::Internal("log pipeline is gone".to_string()))?;
        let read = reply_rx
            .await
            .map_err(|_| SupervisorError::Internal("log pipeline dropped reply".to_string()))?;

        let buffered = read.entries;
        if limit > 0 && buffered.len() >= limit {
            return Ok(buffered);
        }
        // Buffer alone can't fill the window; merge older persisted entries.
        let Some(project) = read.project else {
            return Ok(buffered);
        };
        let store = self.store.clone();
        let process = process.clone();
        let stored = tokio::task::spawn_blocking(move || store.load_logs(&project, &process, 0))
            .await
            .map_err(|e| SupervisorError::Internal(format!("log read task failed: {e}")))?
            .map_err(|e| SupervisorError::Internal(format!("log read failed: {e}")))?;

        let have: HashSet<&str> = buffered.iter().map(|l| l.id.as_str()).collect();
        let mut merged: Vec<ProcessLog> = stored
            .into_iter()
            .filter(|l| !have.contains(l.id.as_str()))
            .collect();
        merged.extend(buffered);
        if limit > 0 && merged.len() > limit {
            let excess = merged.len() - limit;
            merged.drain(..excess);
        }
        Ok(merged)
    }

    /// Flush the pending batch and every buffer, then stop the writer.
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .control_tx
            .send(Control::Shutdown { reply: reply_tx })
            .await
            .is_err()
        {
            return;
        }
        if tokio::time::timeout(self.config.shutdown_flush_timeout, reply_rx)
            .await
            .is_err()
        {
            warn!("log pipeline shutdown flush exceeded its ceiling");
        }
    }
}

/// Spawn the pipeline writer task.
pub fn spawn(
    store: ProcessStore,
    config: LogPipelineConfig,
    counters: Arc<Counters>,
) -> LogPipelineHandle {
    let (log_tx, log_rx) = mpsc::channel(config.channel_capacity);
    let (control_tx, control_rx) = mpsc::channel(64);

    let sink = LogSink {
        tx: log_tx,
        counters: Arc::clone(&counters),
    };
    let writer = Writer {
        store: store.clone(),
        config: config.clone(),
        counters,
        buffers: HashMap::new(),
        projects: HashMap::new(),
        pending: Vec::new(),
    };
    tokio::spawn(writer.run(log_rx, control_rx));

    LogPipelineHandle {
        sink,
        control_tx,
        store,
        config,
    }
}

/// The single-writer loop state.
struct Writer {
    store: ProcessStore,
    config: LogPipelineConfig,
    counters: Arc<Counters>,
    buffers: HashMap<ProcessId, VecDeque<ProcessLog>>,
    projects: HashMap<ProcessId, ProjectId>,
    pending: Vec<ProcessLog>,
}

impl Writer {
    async fn run(
        mut self,
        mut log_rx: mpsc::Receiver<ProcessLog>,
        mut control_rx: mpsc::Receiver<Control>,
    ) {
        let mut flush = tokio::time::interval(self.config.flush_interval);
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                entry = log_rx.recv() => {
                    match entry {
                        Some(log) => {
                            self.absorb(log);
                            if self.pending.len() >= self.config.batch_size {
                                self.dispatch_batch();
                            }
                        }
                        None => {
                            // All sinks dropped; flush what's left and exit.
                            self.flush_everything().await;
                            return;
                        }
                    }
                }

                Some(control) = control_rx.recv() => {
                    match control {
                        Control::Register { process, project } => {
                            self.projects.insert(process, project);
                        }
                        Control::RemoveBuffer { process } => {
                            self.buffers.remove(&process);
                        }
                        Control::ReadBuffer { process, limit, reply } => {
                            let _ = reply.send(self.read_buffer(&process, limit));
                        }
                        Control::Shutdown { reply } => {
                            self.flush_everything().await;
                            let _ = reply.send(());
                            return;
                        }
                    }
                }

                _ = flush.tick() => {
                    if !self.pending.is_empty() {
                        self.dispatch_batch();
                    }
                }
            }
        }
    }

    /// Append one entry to its ring buffer and the pending batch.
    fn absorb(&mut self, log: ProcessLog) {
        let buffer = self.buffers.entry(log.process_id.clone()).or_default();
        buffer.push_back(log.clone());
        if buffer.len() > self.config.max_buffer_size {
            // Keep the most recent 75%, discard the oldest 25%.
            let keep = self.config.max_buffer_size * 3 / 4;
            while buffer.len() > keep {
                buffer.pop_front();
            }
        }
        self.pending.push(log);
        self.counters.logs_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy out a buffer tail. Readers always get a copy, never a view.
    fn read_buffer(&self, process: &ProcessId, limit: usize) -> BufferRead {
        let entries = match self.buffers.get(process) {
            Some(buffer) => {
                let take = if limit == 0 || limit > buffer.len() {
                    buffer.len()
                } else {
                    limit
                };
                buffer.iter().skip(buffer.len() - take).cloned().collect()
            }
            None => Vec::new(),
        };
        BufferRead {
            entries,
            project: self.projects.get(process).cloned(),
        }
    }

    /// Hand the pending batch to background persistence tasks.
    ///
    /// The writer loop never awaits storage: batches are grouped per
    /// process and saved on the blocking pool.
    fn dispatch_batch(&mut self) {
        let batch = std::mem::take(&mut self.pending);
        debug!(entries = batch.len(), "dispatching log batch");

        for (process, entries) in group_by_process(batch) {
            let project = self
                .projects
                .get(&process)
                .cloned()
                .unwrap_or_else(|| ProjectId::new("default"));
            let store = self.store.clone();
            let threshold = self.config.slow_save_threshold;
            tokio::spawn(async move {
                let started = Instant::now();
                let result = tokio::task::spawn_blocking(move || {
                    store.append_logs(&project, &process, &entries)
                })
                .await;
                let elapsed = started.elapsed();
                if elapsed > threshold {
                    warn!(?elapsed, "slow log batch save");
                }
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(error = %e, "log batch save failed"),
                    Err(e) => error!(error = %e, "log batch save task failed"),
                }
            });
        }
    }

    /// Shutdown path: persist the pending batch, then every buffer, in
    /// parallel under the configured ceiling.
    async fn flush_everything(&mut self) {
        self.dispatch_batch();

        let mut saves = JoinSet::new();
        for (process, buffer) in self.buffers.drain() {
            let Some(project) = self.projects.get(&process).cloned() else {
                continue;
            };
            let store = self.store.clone();
            let entries: Vec<ProcessLog> = buffer.into_iter().collect();
            saves.spawn_blocking(move || store.save_logs(&project, &process, &entries));
        }

        let flush_all = async {
            while let Some(result) = saves.join_next().await {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(error = %e, "buffer flush failed"),
                    Err(e) => error!(error = %e, "buffer flush task failed"),
                }
            }
        };
        if tokio::time::timeout(self.config.shutdown_flush_timeout, flush_all)
            .await
            .is_err()
        {
            warn!("log buffer flush exceeded shutdown ceiling");
        }
    }
}

fn group_by_process(batch: Vec<ProcessLog>) -> HashMap<ProcessId, Vec<ProcessLog>> {
    let mut groups: HashMap<ProcessId, Vec<ProcessLog>> = HashMap::new();
    for log in batch {
        groups.entry(log.process_id.clone()).or_default().push(log);
    }
    groups
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
