// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validation of process definitions.
//!
//! Turns a caller-supplied [`ProcessSpec`] into a registered [`Process`],
//! filling defaults and rejecting bad input with `InvalidConfig`.

use crate::error::SupervisorError;
use crate::process::{EnvMap, Process, ProcessId, ProcessSpec, ProcessStatus, ProjectId};
use crate::template;
use chrono::{DateTime, Utc};
use tracing::warn;

/// Maximum size of a single environment variable value (32 KiB).
const MAX_ENV_VALUE_LEN: usize = 32 * 1024;

/// Env var names containing one of these are accepted but logged, since
/// they usually carry credentials.
const SENSITIVE_NAME_PARTS: &[&str] = &[
    "PASSWORD",
    "SECRET",
    "KEY",
    "TOKEN",
    "AUTH",
    "CREDENTIAL",
    "PRIVATE",
    "CERT",
];

/// Default project id when the caller does not scope the process.
const DEFAULT_PROJECT: &str = "default";

/// Validate a spec and build the process record it describes.
///
/// Applies the named template first (templates only fill fields the
/// caller left empty), then checks every field. The returned process is
/// in `Pending` with timestamps stamped from `now`.
pub fn build_process(
    mut spec: ProcessSpec,
    id: impl Into<String>,
    now: DateTime<Utc>,
) -> Result<Process, SupervisorError> {
    if let Some(name) = spec.template.take() {
        template::apply(&name, &mut spec)?;
    }

    if spec.name.trim().is_empty() {
        return Err(SupervisorError::InvalidConfig(
            "process name must not be empty".to_string(),
        ));
    }
    if spec.command.trim().is_empty() {
        return Err(SupervisorError::InvalidConfig(
            "command must not be empty".to_string(),
        ));
    }

    let port = validate_port(spec.port)?;

    if let Some(dir) = &spec.working_dir {
        if !dir.is_dir() {
            return Err(SupervisorError::InvalidConfig(format!(
                "working directory does not exist: {}",
                dir.display()
            )));
        }
    }

    validate_env(&spec.environment)?;

    let project_id = spec
        .project_id
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROJECT.to_string());

    Ok(Process {
        id: ProcessId::new(id),
        project_id: ProjectId::new(project_id),
        name: spec.name,
        kind: spec.kind.unwrap_or_default(),
        command: spec.command,
        args: spec.args,
        working_dir: spec.working_dir,
        environment: spec.environment,
        port,
        restart_policy: spec.restart_policy.unwrap_or_default(),
        status: ProcessStatus::Pending,
        pid: None,
        exit_code: None,
        created_at: now,
        updated_at: now,
        started_at: None,
        stopped_at: None,
        last_health_check: None,
    })
}

/// Check a declared port. `None` or `0` means unset.
pub fn validate_port(port: Option<u32>) -> Result<u16, SupervisorError> {
    match port {
        None | Some(0) => Ok(0),
        Some(p) if p <= u16::MAX as u32 => Ok(p as u16),
        Some(p) => Err(SupervisorError::InvalidConfig(format!(
            "port {p} out of range (1-65535)"
        ))),
    }
}

/// Check environment variable names and value sizes.
///
/// Names must match `[A-Za-z_][A-Za-z0-9_]*`. Sensitive-looking names
/// are accepted with a warning.
pub fn validate_env(env: &EnvMap) -> Result<(), SupervisorError> {
    for (name, value) in env {
        if !valid_env_name(name) {
            return Err(SupervisorError::InvalidConfig(format!(
                "invalid environment variable name: {name:?}"
            )));
        }
        if value.len() > MAX_ENV_VALUE_LEN {
            return Err(SupervisorError::InvalidConfig(format!(
                "environment variable {name} exceeds {MAX_ENV_VALUE_LEN} bytes"
            )));
        }
        let upper = name.to_ascii_uppercase();
        if SENSITIVE_NAME_PARTS.iter().any(|p| upper.contains(p)) {
            warn!(name, "environment variable looks like a credential");
        }
    }
    Ok(())
}

fn valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
