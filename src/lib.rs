//! MCP stream client - request/response correlation over a server-sent
//! event stream.
//!
//! This library lets one client multiplex many concurrent JSON-RPC requests
//! over a single event stream, matching each asynchronous response and each
//! progress notification back to the request that caused it.
//!
//! # Architecture
//!
//! ```text
//! bytes ──► FrameReassembler ──► Frame::parse ──► Envelope::parse ──┐
//!                                                                   │
//!        ┌──────────────────────────────────────────────────────────┘
//!        ▼
//!   Response ──► CorrelationTable::settle        (exactly once per id)
//!   Progress ──► CorrelationTable::route_progress (never settles)
//!   Other    ──► notification handler
//! ```
//!
//! Key design principles:
//!
//! - A pending entry is registered before its request is sent
//! - Every pending request settles exactly once: response, timeout or disconnect
//! - Malformed frames and unknown ids are logged, never fatal
//! - The stream ending fails every pending request
//!
//! # Quick Start
//!
//! ```no_run
//! use mcp_stream_client::{ClientInfo, RequestOptions, Result, Session};
//! use mcp_stream_client::transport::HttpTransport;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::builder()
//!         .legacy_sse("http://localhost:5050/mcp/sse")
//!         .build(HttpTransport::new())?;
//!
//!     session.open().await?;
//!     session.initialize(ClientInfo::default()).await?;
//!
//!     let tools = session.list_tools().await?;
//!     println!("{} tools", tools.len());
//!
//!     let result = session
//!         .call_tool(
//!             "toolA",
//!             json!({"hostName": "device01"}),
//!             RequestOptions::new().on_progress(|p| {
//!                 println!("{:?}% {:?}", p.percentage, p.message);
//!             }),
//!         )
//!         .await?;
//!     println!("{result}");
//!
//!     session.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`frame`] | Event-stream framing |
//! | [`identifiers`] | Request ids and progress tokens |
//! | [`protocol`] | JSON-RPC message types |
//! | [`session`] | [`Session`], correlation and progress |
//! | [`transport`] | [`Transport`] trait and implementations |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Server-sent event framing.
pub mod frame;

/// Type-safe identifiers.
///
/// Newtype wrappers for request ids and progress tokens.
pub mod identifiers;

/// JSON-RPC message types.
pub mod protocol;

/// Client session.
///
/// Use [`Session::builder()`] to create a configured session.
pub mod session;

/// Transport layer.
pub mod transport;

#[cfg(test)]
mod test_log;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ProgressToken, RequestId};

// Protocol types
pub use protocol::{ClientInfo, Tool};

// Session types
pub use session::{
    ConnectionMode, ConnectionStatus, ProgressUpdate, RequestOptions, ResponseHandle, Session,
    SessionBuilder, SessionConfig, ToolCall, ToolCallOutcome,
};

// Transport types
pub use transport::{HttpTransport, MemoryTransport, Transport};
