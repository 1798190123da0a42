//! High-level MCP operations.
//!
//! Thin wrappers over [`Session::request`] and [`Session::notify`] for the
//! handshake and the tool methods.

// ============================================================================
// Imports
// ============================================================================

use futures_util::future::join_all;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{ClientInfo, InitializeParams, Tool, method};

use super::core::Session;
use super::options::RequestOptions;

// ============================================================================
// ToolCall
// ============================================================================

/// One entry of a parallel batch.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Tool arguments. `null` is sent as `{}`.
    pub arguments: Value,
    /// Per-call options, including the progress callback.
    pub options: RequestOptions,
}

impl ToolCall {
    /// Creates a call with default options.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            options: RequestOptions::new(),
        }
    }

    /// Replaces the options.
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// Outcome of one entry of a parallel batch.
#[derive(Debug)]
pub struct ToolCallOutcome {
    /// Position in the input batch.
    pub index: usize,
    /// Tool name.
    pub name: String,
    /// Tool result or the call's own failure.
    pub result: Result<Value>,
}

impl ToolCallOutcome {
    /// Returns `true` if the call succeeded.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

// ============================================================================
// Session operations
// ============================================================================

impl Session {
    /// Performs the `initialize` handshake, then sends
    /// `notifications/initialized`.
    ///
    /// Returns the server's `initialize` result.
    ///
    /// # Errors
    ///
    /// Any request or notification failure.
    pub async fn initialize(&self, client_info: ClientInfo) -> Result<Value> {
        let params = serde_json::to_value(InitializeParams::new(client_info))?;
        let result = self
            .request(method::INITIALIZE, params, RequestOptions::new())
            .await?;

        self.notify(method::NOTIFICATIONS_INITIALIZED, None).await?;

        let server = result
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(server, "Session initialized");
        Ok(result)
    }

    /// Lists the server's tools.
    ///
    /// A result without `tools` yields an empty list.
    ///
    /// # Errors
    ///
    /// - Any request failure
    /// - [`Error::Protocol`] if `tools` is not a list of tools
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let mut result = self
            .request(method::TOOLS_LIST, json!({}), RequestOptions::new())
            .await?;

        let tools = match result.get_mut("tools").map(Value::take) {
            Some(Value::Null) | None => Vec::new(),
            Some(tools) => serde_json::from_value::<Vec<Tool>>(tools)
                .map_err(|e| Error::protocol(format!("invalid tools list: {e}")))?,
        };

        debug!(count = tools.len(), "Tools listed");
        Ok(tools)
    }

    /// Invokes a tool.
    ///
    /// The request's progress token is injected into the arguments so the
    /// server can report progress to `options.on_progress`.
    ///
    /// # Errors
    ///
    /// Any request failure, including [`Error::Remote`] from the tool.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        options: RequestOptions,
    ) -> Result<Value> {
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        self.request(
            method::TOOLS_CALL,
            json!({ "name": name, "arguments": arguments }),
            options,
        )
        .await
    }

    /// Invokes several tools concurrently.
    ///
    /// Outcomes come back in input order. A failed call never fails the
    /// batch.
    pub async fn call_tools_parallel(&self, calls: Vec<ToolCall>) -> Vec<ToolCallOutcome> {
        let futures = calls.into_iter().enumerate().map(|(index, call)| async move {
            let result = self.call_tool(&call.name, call.arguments, call.options).await;
            ToolCallOutcome {
                index,
                name: call.name,
                result,
            }
        });

        let outcomes = join_all(futures).await;
        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        debug!(total = outcomes.len(), failed, "Parallel tool calls finished");
        outcomes
    }
}

// ============================================================================
// Tests
// ============================================================================
