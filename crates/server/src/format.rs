// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Markdown formatters for process listings, details, and logs.

use chrono::{DateTime, Utc};
use compass_core::{format_elapsed_ms, Process, ProcessLog};

/// Render a process listing as a markdown table.
pub fn process_table(processes: &[Process], now: DateTime<Utc>) -> String {
    if processes.is_empty() {
        return "No processes found.".to_string();
    }

    let mut out = String::from("| ID | Name | Type | Status | PID | Port | Uptime |\n");
    out.push_str("|---|---|---|---|---|---|---|\n");
    for process in processes {
        let pid = process
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let port = if process.port > 0 {
            process.port.to_string()
        } else {
            "-".to_string()
        };
        let uptime = process
            .uptime_ms(now)
            .map(format_elapsed_ms)
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            process.id.short(8),
            process.name,
            process.kind,
            process.status,
            pid,
            port,
            uptime,
        ));
    }
    out
}

/// Render one process as a markdown detail block.
pub fn process_detail(process: &Process, now: DateTime<Utc>) -> String {
    let mut out = format!("## {} ({})\n\n", process.name, process.id.short(8));
    out.push_str(&format!("- **Status**: {}\n", process.status));
    out.push_str(&format!("- **Type**: {}\n", process.kind));
    out.push_str(&format!(
        "- **Command**: `{} {}`\n",
        process.command,
        process.args.join(" ")
    ));
    if let Some(pid) = process.pid {
        out.push_str(&format!("- **PID**: {pid}\n"));
    }
    if process.port > 0 {
        out.push_str(&format!("- **Port**: {}\n", process.port));
    }
    if let Some(uptime) = process.uptime_ms(now) {
        out.push_str(&format!("- **Uptime**: {}\n", format_elapsed_ms(uptime)));
    }
    if let Some(code) = process.exit_code {
        out.push_str(&format!("- **Exit code**: {code}\n"));
    }
    if process.restart_policy.enabled {
        out.push_str(&format!(
            "- **Restarts**: {}/{}\n",
            process.restart_policy.retry_count, process.restart_policy.max_retries
        ));
    }
    out
}

/// Render log entries one per line: `[HH:MM:SS] [kind] message`.
pub fn log_lines(logs: &[ProcessLog]) -> String {
    if logs.is_empty() {
        return "No logs.".to_string();
    }
    let mut out = String::new();
    for log in logs {
        out.push_str(&format!(
            "[{}] [{}] {}\n",
            log.timestamp.format("%H:%M:%S"),
            log.kind,
            log.message
        ));
    }
    out
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
