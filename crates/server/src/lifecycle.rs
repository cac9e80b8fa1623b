// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server lifecycle: configuration, wiring, logging setup.

use std::path::PathBuf;

use compass_core::{SystemClock, UuidIdGen};
use compass_storage::ProcessStore;
use compass_supervisor::{Orchestrator, SupervisorConfig};
use thiserror::Error;

use crate::router::Router;

/// Errors that can occur during startup
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no usable state directory")]
    NoStateDir,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/compass)
    pub state_dir: PathBuf,
    /// Per-project data files live here
    pub data_dir: PathBuf,
    /// Path to the server log file (stdout carries the RPC stream)
    pub log_path: PathBuf,
}

impl Config {
    /// Load configuration.
    ///
    /// Uses `$COMPASS_STATE_DIR` when set, otherwise fixed paths under
    /// `$XDG_STATE_HOME/compass/` (or `~/.local/state/compass/`).
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = match std::env::var_os("COMPASS_STATE_DIR") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => state_dir()?,
        };

        Ok(Self {
            data_dir: state_dir.join("projects"),
            log_path: state_dir.join("server.log"),
            state_dir,
        })
    }
}

fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Some(dir) = dirs::state_dir() {
        return Ok(dir.join("compass"));
    }
    dirs::home_dir()
        .map(|home| home.join(".local").join("state").join("compass"))
        .ok_or(LifecycleError::NoStateDir)
}

/// Wire the store, supervisor, and router together.
///
/// The orchestrator is returned alongside the router so the caller can
/// drive graceful shutdown.
pub fn startup(
    config: &Config,
) -> Result<(Router, Orchestrator<SystemClock, UuidIdGen>), LifecycleError> {
    std::fs::create_dir_all(&config.data_dir)?;

    let store = ProcessStore::new(&config.data_dir);
    let orchestrator = Orchestrator::start(
        store,
        SupervisorConfig::default(),
        SystemClock,
        UuidIdGen,
    );
    Ok((Router::new(orchestrator.clone(), SystemClock), orchestrator))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
