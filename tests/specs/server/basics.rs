//! Protocol basics over stdio: status, create/get/list, errors.

use crate::prelude::*;
use serde_json::json;

#[test]
fn status_reports_health() {
    let mut server = Server::spawn();
    let status = server.call("compass.status", json!({}));
    assert_eq!(status["isHealthy"], true);
    assert_eq!(status["totalProcesses"], 0);
}

#[test]
fn create_get_list_roundtrip() {
    let mut server = Server::spawn();

    let created = server.call(
        "compass.process.create",
        json!({"name": "api", "command": "/bin/true"}),
    );
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "pending");

    let fetched = server.call("compass.process.get", json!({"id": id}));
    assert_eq!(fetched, created);

    let listed = server.call("compass.process.list", json!({}));
    assert_eq!(listed["count"], 1);
    assert!(listed["markdown"].as_str().unwrap().contains("| api |"));
}

#[test]
fn template_fills_empty_fields() {
    let mut server = Server::spawn();
    let created = server.call(
        "compass.process.create",
        json!({"name": "cache", "template": "redis"}),
    );
    assert_eq!(created["command"], "redis-server");
    assert_eq!(created["port"], 6379);
}

#[test]
fn invalid_config_is_a_structured_error() {
    let mut server = Server::spawn();
    let response = server.request(
        "compass.process.create",
        json!({"name": "bad", "command": "", "port": 99999}),
    );
    assert_eq!(response["error"]["data"]["kind"], "invalid_config");
}

#[test]
fn unknown_method_is_rejected() {
    let mut server = Server::spawn();
    let response = server.request("compass.tasks.list", json!({}));
    assert_eq!(response["error"]["code"], -32601);
}

#[test]
fn records_survive_a_server_restart() {
    let state = tempfile::TempDir::new().unwrap();
    let id;
    {
        let mut server = Server::spawn_in(state.path());
        let created = server.call(
            "compass.process.create",
            json!({"name": "persisted", "command": "/bin/true"}),
        );
        id = created["id"].as_str().unwrap().to_string();
    }
    {
        let mut server = Server::spawn_in(state.path());
        let fetched = server.call("compass.process.get", json!({"id": id}));
        assert_eq!(fetched["name"], "persisted");
    }
}
