//! Shared helpers for driving a compassd instance over stdio.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

/// Returns a Command configured to run the compassd binary.
pub fn compassd_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin("compassd"))
}

/// A running compassd with a scratch state directory.
///
/// Requests are written one per line; responses are read back and
/// matched by request id, so ordering between concurrent handlers does
/// not matter.
pub struct Server {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    _state: Option<TempDir>,
}

impl Server {
    pub fn spawn() -> Self {
        let state = TempDir::new().unwrap();
        let mut server = Self::spawn_in(state.path());
        server._state = Some(state);
        server
    }

    /// Spawn against an existing state directory (restart scenarios).
    pub fn spawn_in(state_dir: &std::path::Path) -> Self {
        let mut child = compassd_cmd()
            .env("COMPASS_STATE_DIR", state_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn compassd");
        let stdin = child.stdin.take();
        let stdout = BufReader::new(child.stdout.take().unwrap());
        Self {
            child,
            stdin,
            stdout,
            next_id: 1,
            _state: None,
        }
    }

    fn stdin(&mut self) -> &mut ChildStdin {
        self.stdin.as_mut().expect("stdin already closed")
    }

    /// Send one request and wait for its response.
    pub fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        let line = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let stdin = self.stdin();
        writeln!(stdin, "{line}").unwrap();
        stdin.flush().unwrap();

        loop {
            let mut response_line = String::new();
            let read = self.stdout.read_line(&mut response_line).unwrap();
            assert!(read > 0, "server closed stdout waiting for id {id}");
            let response: Value = serde_json::from_str(response_line.trim()).unwrap();
            if response["id"] == json!(id) {
                return response;
            }
        }
    }

    /// Send a request and unwrap its `result`.
    pub fn call(&mut self, method: &str, params: Value) -> Value {
        let response = self.request(method, params);
        assert!(
            response["error"].is_null(),
            "unexpected error from {method}: {}",
            response["error"]
        );
        response["result"].clone()
    }

    /// Poll a process until it reaches `status` (seconds-scale budget).
    pub fn wait_for_status(&mut self, id: &str, status: &str) -> Value {
        for _ in 0..100 {
            let process = self.call("compass.process.get", json!({ "id": id }));
            if process["status"] == status {
                return process;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        panic!("process {id} never reached {status}");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // Closing stdin asks the server to shut down gracefully.
        drop(self.stdin.take());
        // Best-effort: give it a moment, then make sure it's gone.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(std::time::Duration::from_millis(50));
                }
                _ => {
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    break;
                }
            }
        }
    }
}
