// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Method router: `compass.process.*` dispatch onto the orchestrator.

use compass_core::{Clock, IdGen, ProcessFilter, ProcessSpec, SupervisorError, SystemClock};
use compass_supervisor::{GroupSpec, Orchestrator, ProcessUpdate};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::format;
use crate::protocol::{RpcRequest, RpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND};

#[derive(Debug, Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LogsParams {
    id: String,
    #[serde(default = "default_log_limit")]
    limit: usize,
}

fn default_log_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    id: String,
    updates: ProcessUpdate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(flatten)]
    filter: ProcessFilter,
    /// "markdown" (default) or "json"
    #[serde(default)]
    format: Option<String>,
}

/// Routes parsed requests to the orchestrator and shapes the replies.
#[derive(Clone)]
pub struct Router<C: Clock = SystemClock, G: IdGen = compass_core::UuidIdGen> {
    orchestrator: Orchestrator<C, G>,
    clock: C,
}

impl<C: Clock, G: IdGen> Router<C, G> {
    pub fn new(orchestrator: Orchestrator<C, G>, clock: C) -> Self {
        Self {
            orchestrator,
            clock,
        }
    }

    /// Handle one raw input line. Returns `None` for notifications
    /// (requests without an id), which get no response per JSON-RPC.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let request: RpcRequest = match serde_json::from_str(trimmed) {
            Ok(request) => request,
            Err(e) => {
                let response = RpcResponse::error(
                    Value::Null,
                    crate::protocol::PARSE_ERROR,
                    format!("parse error: {e}"),
                );
                return serde_json::to_string(&response).ok();
            }
        };

        let is_notification = request.id.is_none();
        let response = self.dispatch(request).await;
        if is_notification {
            return None;
        }
        serde_json::to_string(&response).ok()
    }

    /// Dispatch one request by method name.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);
        debug!(method = %request.method, "rpc request");

        let result = match request.method.as_str() {
            "compass.process.create" => self.create(request.params).await,
            "compass.process.start" => self.start(request.params).await,
            "compass.process.stop" => self.stop(request.params).await,
            "compass.process.restart" => self.restart(request.params).await,
            "compass.process.list" => self.list(request.params).await,
            "compass.process.get" => self.get(request.params).await,
            "compass.process.logs" => self.logs(request.params).await,
            "compass.process.status" => self.status(request.params).await,
            "compass.process.update" => self.update(request.params).await,
            "compass.process.group.create" => self.group_create(request.params).await,
            "compass.process.group.start" => self.group_start(request.params).await,
            "compass.process.group.stop" => self.group_stop(request.params).await,
            "compass.status" => self.server_status().await,
            other => {
                return RpcResponse::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("unknown method: {other}"),
                )
            }
        };

        match result {
            Ok(value) => RpcResponse::result(id, value),
            Err(RouteError::Params(message)) => RpcResponse::error(id, INVALID_PARAMS, message),
            Err(RouteError::Supervisor(error)) => {
                RpcResponse::from_supervisor_error(id, &error)
            }
        }
    }

    async fn create(&self, params: Value) -> Result<Value, RouteError> {
        let spec: ProcessSpec = parse(params)?;
        let process = self.orchestrator.create(spec).await?;
        Ok(to_value(&process)?)
    }

    async fn start(&self, params: Value) -> Result<Value, RouteError> {
        let params: IdParams = parse(params)?;
        let receipt = self.orchestrator.start_process(&params.id).await?;
        Ok(json!({
            "status": "started",
            "pid": receipt.pid,
            "startedAt": receipt.started_at,
        }))
    }

    async fn stop(&self, params: Value) -> Result<Value, RouteError> {
        let params: IdParams = parse(params)?;
        self.orchestrator.stop_process(&params.id).await?;
        Ok(json!({ "status": "stopped" }))
    }

    async fn restart(&self, params: Value) -> Result<Value, RouteError> {
        let params: IdParams = parse(params)?;
        let receipt = self.orchestrator.restart_process(&params.id).await?;
        Ok(json!({
            "status": "restarted",
            "pid": receipt.pid,
            "startedAt": receipt.started_at,
        }))
    }

    async fn list(&self, params: Value) -> Result<Value, RouteError> {
        let params: ListParams = if params.is_null() {
            ListParams::default()
        } else {
            parse(params)?
        };
        let processes = self.orchestrator.list(params.filter).await?;
        match params.format.as_deref() {
            Some("json") => Ok(to_value(&processes)?),
            _ => Ok(json!({
                "markdown": format::process_table(&processes, self.clock.now()),
                "count": processes.len(),
            })),
        }
    }

    async fn get(&self, params: Value) -> Result<Value, RouteError> {
        let params: IdParams = parse(params)?;
        let process = self.orchestrator.get(&params.id).await?;
        Ok(to_value(&process)?)
    }

    async fn logs(&self, params: Value) -> Result<Value, RouteError> {
        let params: LogsParams = parse(params)?;
        let logs = self.orchestrator.get_logs(&params.id, params.limit).await?;
        Ok(json!({
            "logs": to_value(&logs)?,
            "markdown": format::log_lines(&logs),
        }))
    }

    async fn status(&self, params: Value) -> Result<Value, RouteError> {
        let params: IdParams = parse(params)?;
        let process = self.orchestrator.get(&params.id).await?;
        let now = self.clock.now();
        let mut value = to_value(&process)?;
        if let Value::Object(map) = &mut value {
            map.insert("uptimeMs".to_string(), json!(process.uptime_ms(now)));
            map.insert(
                "markdown".to_string(),
                json!(format::process_detail(&process, now)),
            );
        }
        Ok(value)
    }

    async fn update(&self, params: Value) -> Result<Value, RouteError> {
        let params: UpdateParams = parse(params)?;
        let process = self.orchestrator.update(&params.id, params.updates).await?;
        Ok(to_value(&process)?)
    }

    async fn group_create(&self, params: Value) -> Result<Value, RouteError> {
        let spec: GroupSpec = parse(params)?;
        let group = self.orchestrator.create_group(spec).await?;
        Ok(to_value(&group)?)
    }

    async fn group_start(&self, params: Value) -> Result<Value, RouteError> {
        let params: IdParams = parse(params)?;
        self.orchestrator.start_group(&params.id).await?;
        Ok(json!({ "status": "group started" }))
    }

    async fn group_stop(&self, params: Value) -> Result<Value, RouteError> {
        let params: IdParams = parse(params)?;
        self.orchestrator.stop_group(&params.id).await?;
        Ok(json!({ "status": "group stopped" }))
    }

    async fn server_status(&self) -> Result<Value, RouteError> {
        let statistics = self.orchestrator.statistics().await?;
        Ok(to_value(&statistics)?)
    }
}

enum RouteError {
    Params(String),
    Supervisor(SupervisorError),
}

impl From<SupervisorError> for RouteError {
    fn from(error: SupervisorError) -> Self {
        RouteError::Supervisor(error)
    }
}

fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RouteError> {
    serde_json::from_value(params).map_err(|e| RouteError::Params(format!("invalid params: {e}")))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RouteError> {
    serde_json::to_value(value)
        .map_err(|e| RouteError::Supervisor(SupervisorError::Internal(e.to_string())))
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
