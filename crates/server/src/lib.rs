// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Compass server library
//!
//! Line-delimited JSON-RPC over stdio: each request is one JSON object
//! per line, each response one line back. Process tools are exposed
//! under the `compass.process.*` method namespace.

pub mod format;
pub mod lifecycle;
pub mod protocol;
pub mod router;

pub use lifecycle::Config;
pub use protocol::{RpcError, RpcRequest, RpcResponse, MAX_LINE_LENGTH, PROTOCOL_VERSION};
pub use router::Router;
