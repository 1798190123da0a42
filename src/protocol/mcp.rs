//! MCP payload types used by the high-level session helpers.
//!
//! Only the fields the helpers read or write are typed; everything else is
//! preserved as raw JSON so newer servers do not break deserialization.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

// ============================================================================
// Constants
// ============================================================================

/// Protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

// ============================================================================
// ClientInfo
// ============================================================================

/// Client identification sent during `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl ClientInfo {
    /// Creates client info.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

// ============================================================================
// InitializeParams
// ============================================================================

/// Params of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Announced protocol revision.
    pub protocol_version: String,
    /// Client capabilities.
    pub capabilities: Value,
    /// Client identification.
    pub client_info: ClientInfo,
}

impl InitializeParams {
    /// Creates params announcing roots (with change notifications) and sampling.
    #[must_use]
    pub fn new(client_info: ClientInfo) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_owned(),
            capabilities: json!({
                "roots": { "listChanged": true },
                "sampling": {}
            }),
            client_info,
        }
    }
}

// ============================================================================
// Tool
// ============================================================================

/// A tool advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Tool name, used in `tools/call`.
    pub name: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON schema of the arguments.
    #[serde(default)]
    pub input_schema: Value,

    /// Fields this client does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Tests
// ============================================================================
