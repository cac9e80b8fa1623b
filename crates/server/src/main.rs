// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compass server (compassd)
//!
//! MCP-style tool server speaking line-delimited JSON-RPC on stdio.
//!
//! Architecture:
//! - Read loop: one request per stdin line, handled on its own task
//! - Writer task: sole owner of stdout, one response per line
//! - Supervisor: orchestrator + actors + state manager + log pipeline

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use compass_server::lifecycle::{self, Config, LifecycleError};
use compass_server::{Router, MAX_LINE_LENGTH, PROTOCOL_VERSION};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config or state dir access
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("compassd {PROTOCOL_VERSION}");
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("compassd {PROTOCOL_VERSION}");
                println!("Compass server - developer workflow tools over stdio JSON-RPC");
                println!();
                println!("USAGE:");
                println!("    compassd");
                println!();
                println!("The server reads one JSON-RPC request per line on stdin and");
                println!("writes one response per line on stdout. Process supervision");
                println!("tools live under the `compass.process.*` method namespace.");
                println!();
                println!("ENVIRONMENT:");
                println!("    COMPASS_STATE_DIR    Override the state directory");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: compassd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    // Rotate the log file if it has grown too large
    rotate_log_if_needed(&config.log_path);

    // Logging goes to a file: stdout is the RPC transport
    let _log_guard = setup_logging(&config)?;

    info!(state_dir = %config.state_dir.display(), "starting compass server");

    let (router, orchestrator) = match lifecycle::startup(&config) {
        Ok(wired) => wired,
        Err(e) => {
            error!("failed to start server: {e}");
            return Err(e.into());
        }
    };

    // Writer task: sole owner of stdout
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if stdout.write_all(b"\n").await.is_err() {
                break;
            }
            if stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("server ready on stdio");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.len() > MAX_LINE_LENGTH {
                            warn!(length = line.len(), "request line too large, ignored");
                            continue;
                        }
                        spawn_handler(&router, &out_tx, line);
                    }
                    Ok(None) => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                    Err(e) => {
                        error!("stdin read error: {e}");
                        break;
                    }
                }
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    orchestrator.shutdown().await;
    drop(out_tx);
    let _ = writer.await;
    info!("server stopped");
    Ok(())
}

/// Handle one request line on its own task so a slow operation (e.g. a
/// start waiting on its reply) never blocks the read loop.
fn spawn_handler(router: &Router, out_tx: &mpsc::Sender<String>, line: String) {
    let router = router.clone();
    let out_tx = out_tx.clone();
    tokio::spawn(async move {
        if let Some(response) = router.handle_line(&line).await {
            if out_tx.send(response).await.is_err() {
                warn!("stdout writer gone, response dropped");
            }
        }
    });
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (server.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the server log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `server.log` → `server.log.1` → `server.log.2` → `server.log.3`,
/// deleting the oldest. Best-effort: rotation failures are ignored so
/// the server still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}
