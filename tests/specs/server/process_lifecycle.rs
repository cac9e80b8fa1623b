//! Full process lifecycle driven over the stdio protocol.

use crate::prelude::*;
use serde_json::json;

#[test]
fn start_observe_stop() {
    let mut server = Server::spawn();
    let created = server.call(
        "compass.process.create",
        json!({
            "name": "echo",
            "command": "/bin/sh",
            "args": ["-c", "echo hi; sleep 60"],
        }),
    );
    let id = created["id"].as_str().unwrap().to_string();

    let started = server.call("compass.process.start", json!({"id": id}));
    assert_eq!(started["status"], "started");
    assert!(started["pid"].as_u64().unwrap() > 0);

    let running = server.wait_for_status(&id, "running");
    assert!(running["pid"].as_u64().unwrap() > 0);
    assert!(running["startedAt"].is_string());

    let stopped = server.call("compass.process.stop", json!({"id": id}));
    assert_eq!(stopped["status"], "stopped");
    server.wait_for_status(&id, "stopped");

    // Captured output is served back with the most recent entries
    let logs = server.call("compass.process.logs", json!({"id": id, "limit": 100}));
    let rendered = logs["markdown"].as_str().unwrap();
    assert!(rendered.contains("[stdout] hi"), "logs were: {rendered}");
}

#[test]
fn spawn_failure_marks_the_record_failed() {
    let mut server = Server::spawn();
    let created = server.call(
        "compass.process.create",
        json!({"name": "noexec", "command": "/no/such/bin"}),
    );
    let id = created["id"].as_str().unwrap().to_string();

    let response = server.request("compass.process.start", json!({"id": id}));
    assert_eq!(response["error"]["data"]["kind"], "start_failed");

    server.wait_for_status(&id, "failed");
}

#[test]
fn prefix_addressing_works_when_unique() {
    let mut server = Server::spawn();
    let created = server.call(
        "compass.process.create",
        json!({"name": "solo", "command": "/bin/true"}),
    );
    let id = created["id"].as_str().unwrap().to_string();
    let prefix = &id[..8];

    let fetched = server.call("compass.process.get", json!({"id": prefix}));
    assert_eq!(fetched["id"], id.as_str());
}

#[test]
fn stop_is_idempotent_over_the_wire() {
    let mut server = Server::spawn();
    let created = server.call(
        "compass.process.create",
        json!({"name": "quick", "command": "/bin/true"}),
    );
    let id = created["id"].as_str().unwrap().to_string();

    server.call("compass.process.start", json!({"id": id}));
    server.wait_for_status(&id, "stopped");

    // Stop after exit, twice: both succeed without changing state
    server.call("compass.process.stop", json!({"id": id}));
    server.call("compass.process.stop", json!({"id": id}));
    let process = server.call("compass.process.get", json!({"id": id}));
    assert_eq!(process["status"], "stopped");
}
