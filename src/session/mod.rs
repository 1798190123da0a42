//! Client session: request lifecycle, correlation and progress.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | Connection owner; issues requests and notifications |
//! | [`SessionBuilder`] | Fluent configuration builder |
//! | [`RequestOptions`] | Per-request token, timeout and progress callback |
//! | [`ResponseHandle`] | Future of one request's terminal outcome |
//! | [`CorrelationTable`] | Pending requests by id and by progress token |
//! | [`ProgressUpdate`] | One progress report handed to a callback |
//!
//! # Example
//!
//! ```no_run
//! use mcp_stream_client::{ClientInfo, RequestOptions, Session};
//! use mcp_stream_client::transport::HttpTransport;
//! use serde_json::json;
//!
//! # async fn example() -> mcp_stream_client::Result<()> {
//! let session = Session::builder()
//!     .legacy_sse("http://localhost:5050/mcp/sse")
//!     .build(HttpTransport::new())?;
//! session.open().await?;
//! session.initialize(ClientInfo::default()).await?;
//!
//! let result = session
//!     .call_tool(
//!         "toolA",
//!         json!({"hostName": "device01"}),
//!         RequestOptions::new().on_progress(|p| println!("{:?}%", p.percentage)),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Session configuration and validation.
pub mod builder;

/// Pending request table.
pub mod correlation;

/// Session and request lifecycle.
pub mod core;

/// High-level MCP operations.
pub mod mcp;

/// Per-request options.
pub mod options;

/// Progress routing.
pub mod progress;

mod reader;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{ConnectionMode, SessionBuilder, SessionConfig};
pub use core::{ConnectionStatus, NotificationHandler, ResponseHandle, Session};
pub use correlation::{CorrelationTable, Outcome, PendingRequest, ProgressHandler};
pub use mcp::{ToolCall, ToolCallOutcome};
pub use options::RequestOptions;
pub use progress::ProgressUpdate;
