// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed commands addressed to a process actor.
//!
//! Every command carries a one-shot reply channel; the actor always
//! sends a reply (success or typed error) for every command it
//! receives, so callers can wait with a bounded timeout and never hang.

use chrono::{DateTime, Utc};
use compass_core::{ProcessStatus, SupervisorError};
use tokio::sync::oneshot;

/// Confirmation that a child was spawned.
#[derive(Debug, Clone, PartialEq)]
pub struct StartReceipt {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Actor-local view of the process, served without touching the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorStatus {
    pub status: ProcessStatus,
    pub pid: Option<u32>,
}

/// Commands an actor serves, in arrival order.
#[derive(Debug)]
pub enum ActorCommand {
    /// Spawn the child. Errors: `IllegalState` when not startable,
    /// `StartFailed` when the spawn itself fails.
    Start {
        reply: oneshot::Sender<Result<StartReceipt, SupervisorError>>,
    },
    /// Graceful termination; escalates to SIGKILL after the configured
    /// grace period. Idempotent: stopping a terminated process succeeds.
    Stop {
        reply: oneshot::Sender<Result<(), SupervisorError>>,
    },
    /// Unconditional forceful termination.
    Kill {
        reply: oneshot::Sender<Result<(), SupervisorError>>,
    },
    /// Stop (if running), wait for exit, settle, then spawn again.
    Restart {
        reply: oneshot::Sender<Result<StartReceipt, SupervisorError>>,
    },
    /// Current actor-local status.
    Status {
        reply: oneshot::Sender<ActorStatus>,
    },
}

impl ActorCommand {
    /// Command name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ActorCommand::Start { .. } => "start",
            ActorCommand::Stop { .. } => "stop",
            ActorCommand::Kill { .. } => "kill",
            ActorCommand::Restart { .. } => "restart",
            ActorCommand::Status { .. } => "status",
        }
    }
}
