// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-definition templates for well-known dev stacks.
//!
//! A template pre-fills command, args, type, and port on a spec — but
//! only the fields the caller left empty, so explicit values always win.

use crate::error::SupervisorError;
use crate::process::{ProcessSpec, ProcessType};

/// A well-known stack definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTemplate {
    pub name: &'static str,
    pub command: &'static str,
    pub args: &'static [&'static str],
    pub kind: ProcessType,
    /// 0 = no conventional port
    pub port: u16,
}

/// The closed set of known templates, sorted by name.
const TEMPLATES: &[ProcessTemplate] = &[
    ProcessTemplate {
        name: "django-dev",
        command: "python",
        args: &["manage.py", "runserver"],
        kind: ProcessType::WebServer,
        port: 8000,
    },
    ProcessTemplate {
        name: "express-dev",
        command: "npm",
        args: &["run", "dev"],
        kind: ProcessType::ApiServer,
        port: 3000,
    },
    ProcessTemplate {
        name: "flask-dev",
        command: "flask",
        args: &["run"],
        kind: ProcessType::WebServer,
        port: 5000,
    },
    ProcessTemplate {
        name: "go-server",
        command: "go",
        args: &["run", "."],
        kind: ProcessType::ApiServer,
        port: 8080,
    },
    ProcessTemplate {
        name: "jest-watch",
        command: "npx",
        args: &["jest", "--watch"],
        kind: ProcessType::Test,
        port: 0,
    },
    ProcessTemplate {
        name: "mysql",
        command: "mysqld",
        args: &[],
        kind: ProcessType::Database,
        port: 3306,
    },
    ProcessTemplate {
        name: "next-dev",
        command: "npx",
        args: &["next", "dev"],
        kind: ProcessType::WebServer,
        port: 3000,
    },
    ProcessTemplate {
        name: "node-server",
        command: "node",
        args: &["server.js"],
        kind: ProcessType::ApiServer,
        port: 3000,
    },
    ProcessTemplate {
        name: "postgres",
        command: "postgres",
        args: &[],
        kind: ProcessType::Database,
        port: 5432,
    },
    ProcessTemplate {
        name: "python-server",
        command: "python",
        args: &["-m", "http.server"],
        kind: ProcessType::WebServer,
        port: 8000,
    },
    ProcessTemplate {
        name: "react-dev",
        command: "npm",
        args: &["start"],
        kind: ProcessType::WebServer,
        port: 3000,
    },
    ProcessTemplate {
        name: "redis",
        command: "redis-server",
        args: &[],
        kind: ProcessType::Database,
        port: 6379,
    },
    ProcessTemplate {
        name: "tailwind-watch",
        command: "npx",
        args: &["tailwindcss", "--watch"],
        kind: ProcessType::Watcher,
        port: 0,
    },
    ProcessTemplate {
        name: "vite-dev",
        command: "npx",
        args: &["vite"],
        kind: ProcessType::WebServer,
        port: 5173,
    },
    ProcessTemplate {
        name: "webpack-dev",
        command: "npx",
        args: &["webpack", "serve"],
        kind: ProcessType::BuildTool,
        port: 8080,
    },
];

/// Look up a template by name.
pub fn get(name: &str) -> Option<&'static ProcessTemplate> {
    TEMPLATES.iter().find(|t| t.name == name)
}

/// All template names, for error messages and discovery.
pub fn names() -> Vec<&'static str> {
    TEMPLATES.iter().map(|t| t.name).collect()
}

/// Fill empty fields of `spec` from the named template.
///
/// Unknown names are a validation error listing the available set.
pub fn apply(name: &str, spec: &mut ProcessSpec) -> Result<(), SupervisorError> {
    let Some(template) = get(name) else {
        return Err(SupervisorError::InvalidConfig(format!(
            "unknown template '{}' (available: {})",
            name,
            names().join(", ")
        )));
    };

    if spec.command.trim().is_empty() {
        spec.command = template.command.to_string();
        if spec.args.is_empty() {
            spec.args = template.args.iter().map(|s| s.to_string()).collect();
        }
    }
    if spec.kind.is_none() {
        spec.kind = Some(template.kind);
    }
    if spec.port.is_none() && template.port > 0 {
        spec.port = Some(template.port as u32);
    }
    if spec.name.trim().is_empty() {
        spec.name = template.name.to_string();
    }
    Ok(())
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
