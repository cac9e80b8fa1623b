// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor tuning knobs.
//!
//! Defaults are production values; tests shrink the timeouts to keep
//! suites fast.

use std::time::Duration;

/// Configuration for the supervisor's channels and timeouts.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Budget for enqueueing a command onto an actor's queue.
    pub command_send_timeout: Duration,
    /// Budget for an actor's reply to a start/stop/restart command.
    pub command_reply_timeout: Duration,
    /// Budget for a registry query round-trip.
    pub query_timeout: Duration,
    /// Grace period before a polite stop escalates to SIGKILL.
    pub graceful_stop_timeout: Duration,
    /// How long a restart waits for the old child to exit before SIGKILL.
    pub restart_wait_timeout: Duration,
    /// Pause between the old child exiting and the respawn.
    pub restart_settle_delay: Duration,
    /// Health monitor sampling interval.
    pub health_interval: Duration,
    /// Ceiling on draining the main loop and flushing at shutdown.
    pub shutdown_timeout: Duration,
    /// Capacity of the actor→orchestrator event channel.
    pub event_channel_capacity: usize,
    /// Capacity of each actor's command queue.
    pub command_channel_capacity: usize,
    /// Capacity of the state manager's query/update queues.
    pub state_channel_capacity: usize,
    pub pipeline: LogPipelineConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            command_send_timeout: Duration::from_secs(5),
            command_reply_timeout: Duration::from_secs(15),
            query_timeout: Duration::from_secs(10),
            graceful_stop_timeout: Duration::from_secs(5),
            restart_wait_timeout: Duration::from_secs(10),
            restart_settle_delay: Duration::from_millis(200),
            health_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            event_channel_capacity: 256,
            command_channel_capacity: 32,
            state_channel_capacity: 128,
            pipeline: LogPipelineConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Fast variant for tests: same structure, millisecond budgets.
    pub fn fast() -> Self {
        Self {
            command_send_timeout: Duration::from_millis(500),
            command_reply_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(2),
            graceful_stop_timeout: Duration::from_millis(500),
            restart_wait_timeout: Duration::from_secs(2),
            restart_settle_delay: Duration::from_millis(20),
            health_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(2),
            pipeline: LogPipelineConfig {
                flush_interval: Duration::from_millis(20),
                ..LogPipelineConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Configuration for the log pipeline.
#[derive(Debug, Clone)]
pub struct LogPipelineConfig {
    /// Entries per persistence batch.
    pub batch_size: usize,
    /// Timer that flushes a partial batch.
    pub flush_interval: Duration,
    /// In-memory ring buffer cap per process.
    pub max_buffer_size: usize,
    /// Input channel capacity; senders drop (and count) beyond this.
    pub channel_capacity: usize,
    /// A batch save slower than this is logged.
    pub slow_save_threshold: Duration,
    /// Ceiling on the parallel buffer flush at shutdown.
    pub shutdown_flush_timeout: Duration,
}

impl Default for LogPipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval: Duration::from_millis(100),
            max_buffer_size: 10_000,
            channel_capacity: 1_000,
            slow_save_threshold: Duration::from_millis(500),
            shutdown_flush_timeout: Duration::from_secs(10),
        }
    }
}
