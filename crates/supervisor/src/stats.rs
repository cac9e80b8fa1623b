// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor statistics.
//!
//! Atomic counters only; nothing here carries correctness. The health
//! flag is written by the health monitor and read by `GetStatistics`.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

/// Shared counters incremented across tasks.
#[derive(Debug)]
pub struct Counters {
    pub logs_processed: AtomicU64,
    pub logs_dropped: AtomicU64,
    pub events_dropped: AtomicU64,
    pub restarts: AtomicU64,
    pub healthy: AtomicBool,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            logs_processed: AtomicU64::new(0),
            logs_dropped: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }
}

impl Counters {
    pub fn snapshot(&self, started: Instant, total: usize, running: usize) -> Statistics {
        Statistics {
            total_processes: total,
            running_processes: running,
            logs_processed: self.logs_processed.load(Ordering::Relaxed),
            logs_dropped: self.logs_dropped.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            is_healthy: self.healthy.load(Ordering::Relaxed),
            uptime_secs: started.elapsed().as_secs(),
        }
    }
}

/// Point-in-time supervisor statistics for `GetStatistics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_processes: usize,
    pub running_processes: usize,
    pub logs_processed: u64,
    pub logs_dropped: u64,
    pub events_dropped: u64,
    pub restarts: u64,
    pub is_healthy: bool,
    pub uptime_secs: u64,
}
