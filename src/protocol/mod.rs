//! JSON-RPC message types.
//!
//! This module defines the message format exchanged with the remote.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Remote | Correlated call |
//! | `Notification` | Local → Remote | Fire-and-forget |
//! | `Envelope::Response` | Remote → Local | Terminal answer |
//! | `Envelope::Progress` | Remote → Local | Progress for a token |
//! | `Envelope::Notification` | Remote → Local | Anything else |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Inbound payload classification |
//! | `mcp` | MCP handshake and tool types |
//! | `method` | Method name constants |
//! | `request` | Outbound requests and notifications |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound payload classification.
pub mod envelope;

/// MCP handshake and tool types.
pub mod mcp;

/// Method name constants.
pub mod method;

/// Outbound requests and notifications.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{Envelope, ProgressParams, Response, RpcError};
pub use mcp::{ClientInfo, InitializeParams, PROTOCOL_VERSION, Tool};
pub use request::{JSONRPC_VERSION, Message, Notification, Request};
