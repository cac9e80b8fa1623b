// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC 2.0 message types for the stdio transport.
//!
//! Wire format: one JSON object per line, newline-delimited, in both
//! directions. Requests without an `id` are notifications and get no
//! response line.

use compass_core::SupervisorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum accepted request line (1 MiB).
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Protocol version string.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Incoming request.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Outgoing response.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object. `data.kind` carries the stable machine kind.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32000;

impl RpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Translate a supervisor error into its wire form.
    pub fn from_supervisor_error(id: Value, error: &SupervisorError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code: error_code(error),
                message: error.to_string(),
                data: Some(serde_json::json!({ "kind": error.kind() })),
            }),
        }
    }
}

/// Server-defined codes in the -32000..-32099 range, one per error kind.
fn error_code(error: &SupervisorError) -> i64 {
    match error {
        SupervisorError::InvalidConfig(_) => INVALID_PARAMS,
        SupervisorError::NotFound(_) => -32004,
        SupervisorError::AmbiguousId { .. } => -32005,
        SupervisorError::Conflict(_) => -32006,
        SupervisorError::IllegalState(_) => -32007,
        SupervisorError::StartFailed(_) => -32008,
        SupervisorError::Timeout(_) => -32009,
        SupervisorError::Internal(_) => INTERNAL_ERROR,
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
