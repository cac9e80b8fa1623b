// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use compass_core::{SequentialIdGen, SystemClock};
use compass_storage::ProcessStore;
use compass_supervisor::SupervisorConfig;
use serde_json::json;
use tempfile::TempDir;

type TestRouter = Router<SystemClock, SequentialIdGen>;

fn harness() -> (TempDir, TestRouter) {
    let dir = TempDir::new().unwrap();
    let store = ProcessStore::new(dir.path());
    let orchestrator = compass_supervisor::Orchestrator::start(
        store,
        SupervisorConfig::fast(),
        SystemClock,
        SequentialIdGen::new("p"),
    );
    (dir, Router::new(orchestrator, SystemClock))
}

fn request(method: &str, params: Value) -> RpcRequest {
    RpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(json!(1)),
        method: method.to_string(),
        params,
    }
}

async fn expect_result(router: &TestRouter, method: &str, params: Value) -> Value {
    let response = router.dispatch(request(method, params)).await;
    assert!(
        response.error.is_none(),
        "unexpected error: {:?}",
        response.error
    );
    response.result.unwrap()
}

async fn expect_error(router: &TestRouter, method: &str, params: Value) -> crate::protocol::RpcError {
    let response = router.dispatch(request(method, params)).await;
    response.error.expect("expected an error response")
}

#[tokio::test]
async fn create_then_get_roundtrip() {
    let (_dir, router) = harness();
    let created = expect_result(
        &router,
        "compass.process.create",
        json!({"name": "api", "command": "/bin/true"}),
    )
    .await;
    assert_eq!(created["id"], "p-1");
    assert_eq!(created["status"], "pending");

    let fetched = expect_result(&router, "compass.process.get", json!({"id": "p-1"})).await;
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn create_applies_templates() {
    let (_dir, router) = harness();
    let created = expect_result(
        &router,
        "compass.process.create",
        json!({"name": "cache", "template": "redis"}),
    )
    .await;
    assert_eq!(created["command"], "redis-server");
    assert_eq!(created["type"], "database");
    assert_eq!(created["port"], 6379);
}

#[tokio::test]
async fn unknown_template_is_invalid_params() {
    let (_dir, router) = harness();
    let error = expect_error(
        &router,
        "compass.process.create",
        json!({"name": "x", "template": "laravel"}),
    )
    .await;
    assert_eq!(error.code, crate::protocol::INVALID_PARAMS);
    assert!(error.message.contains("laravel"));
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let (_dir, router) = harness();
    let error = expect_error(&router, "compass.tasks.create", json!({})).await;
    assert_eq!(error.code, crate::protocol::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn get_unknown_id_maps_to_not_found_kind() {
    let (_dir, router) = harness();
    let error = expect_error(&router, "compass.process.get", json!({"id": "ghost"})).await;
    assert_eq!(error.code, -32004);
    assert_eq!(error.data.unwrap()["kind"], "not_found");
}

#[tokio::test]
async fn list_defaults_to_markdown() {
    let (_dir, router) = harness();
    expect_result(
        &router,
        "compass.process.create",
        json!({"name": "api", "command": "/bin/true"}),
    )
    .await;

    let listed = expect_result(&router, "compass.process.list", Value::Null).await;
    assert_eq!(listed["count"], 1);
    assert!(listed["markdown"].as_str().unwrap().contains("| api |"));
}

#[tokio::test]
async fn list_json_format_returns_records() {
    let (_dir, router) = harness();
    expect_result(
        &router,
        "compass.process.create",
        json!({"name": "api", "command": "/bin/true"}),
    )
    .await;

    let listed = expect_result(&router, "compass.process.list", json!({"format": "json"})).await;
    let records = listed.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], "api");
}

#[tokio::test]
async fn list_filters_by_type() {
    let (_dir, router) = harness();
    expect_result(
        &router,
        "compass.process.create",
        json!({"name": "db", "command": "/bin/true", "type": "database"}),
    )
    .await;
    expect_result(
        &router,
        "compass.process.create",
        json!({"name": "web", "command": "/bin/true", "type": "web-server"}),
    )
    .await;

    let listed = expect_result(
        &router,
        "compass.process.list",
        json!({"type": "database", "format": "json"}),
    )
    .await;
    let records = listed.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], "db");
}

#[tokio::test]
async fn start_stop_roundtrip_over_rpc() {
    let (_dir, router) = harness();
    expect_result(
        &router,
        "compass.process.create",
        json!({"name": "sleeper", "command": "/bin/sh", "args": ["-c", "sleep 60"]}),
    )
    .await;

    let started = expect_result(&router, "compass.process.start", json!({"id": "p-1"})).await;
    assert_eq!(started["status"], "started");
    assert!(started["pid"].as_u64().unwrap() > 0);

    let stopped = expect_result(&router, "compass.process.stop", json!({"id": "p-1"})).await;
    assert_eq!(stopped["status"], "stopped");
}

#[tokio::test]
async fn status_adds_runtime_fields() {
    let (_dir, router) = harness();
    expect_result(
        &router,
        "compass.process.create",
        json!({"name": "api", "command": "/bin/true"}),
    )
    .await;

    let status = expect_result(&router, "compass.process.status", json!({"id": "p-1"})).await;
    assert!(status["markdown"].as_str().unwrap().contains("## api"));
    assert!(status.get("uptimeMs").is_some());
}

#[tokio::test]
async fn update_over_rpc() {
    let (_dir, router) = harness();
    expect_result(
        &router,
        "compass.process.create",
        json!({"name": "old", "command": "/bin/true"}),
    )
    .await;

    let updated = expect_result(
        &router,
        "compass.process.update",
        json!({"id": "p-1", "updates": {"name": "new"}}),
    )
    .await;
    assert_eq!(updated["name"], "new");
}

#[tokio::test]
async fn group_lifecycle_over_rpc() {
    let (_dir, router) = harness();
    expect_result(
        &router,
        "compass.process.create",
        json!({"name": "a", "command": "/bin/true"}),
    )
    .await;

    let group = expect_result(
        &router,
        "compass.process.group.create",
        json!({"name": "stack", "processIds": ["p-1"]}),
    )
    .await;
    let group_id = group["id"].as_str().unwrap().to_string();

    let started = expect_result(
        &router,
        "compass.process.group.start",
        json!({"id": group_id}),
    )
    .await;
    assert_eq!(started["status"], "group started");

    let stopped = expect_result(
        &router,
        "compass.process.group.stop",
        json!({"id": group_id}),
    )
    .await;
    assert_eq!(stopped["status"], "group stopped");
}

#[tokio::test]
async fn server_status_reports_statistics() {
    let (_dir, router) = harness();
    let status = expect_result(&router, "compass.status", Value::Null).await;
    assert_eq!(status["totalProcesses"], 0);
    assert_eq!(status["isHealthy"], true);
}

#[tokio::test]
async fn handle_line_parse_error_has_null_id() {
    let (_dir, router) = harness();
    let response = router.handle_line("{not json").await.unwrap();
    let value: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(value["error"]["code"], -32700);
    assert_eq!(value["id"], Value::Null);
}

#[tokio::test]
async fn notifications_get_no_response() {
    let (_dir, router) = harness();
    let response = router
        .handle_line(r#"{"jsonrpc":"2.0","method":"compass.status"}"#)
        .await;
    assert!(response.is_none());
}

#[tokio::test]
async fn blank_lines_are_ignored() {
    let (_dir, router) = harness();
    assert!(router.handle_line("   ").await.is_none());
}

#[tokio::test]
async fn invalid_params_are_rejected() {
    let (_dir, router) = harness();
    let error = expect_error(&router, "compass.process.get", json!({"nope": true})).await;
    assert_eq!(error.code, crate::protocol::INVALID_PARAMS);
}
