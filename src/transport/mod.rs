//! Transport layer.
//!
//! The engine never touches sockets itself. A [`Transport`] opens the
//! standing event stream and delivers outbound messages; everything the
//! remote says comes back as raw bytes on a [`ByteStream`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     open(url)  GET  ──────►  ┌─────────────────┐
//! │  Session        │ ◄──── ByteStream (events) ── │  MCP server     │
//! │                 │                              │                 │
//! │  Transport      │     send(endpoint, msg) POST │                 │
//! │                 │ ◄─ Option<ByteStream> reply ─│                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `http` | reqwest-backed transport for real servers |
//! | `memory` | In-process transport driven by the caller |

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use url::Url;

use crate::error::Result;
use crate::protocol::Message;

// ============================================================================
// Submodules
// ============================================================================

/// HTTP transport.
pub mod http;

/// In-memory transport.
pub mod memory;

// ============================================================================
// Re-exports
// ============================================================================

pub use http::HttpTransport;
pub use memory::MemoryTransport;

// ============================================================================
// Types
// ============================================================================

/// Raw event-stream bytes, chunked however the transport likes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

// ============================================================================
// Transport
// ============================================================================

/// Byte-stream delivery and outbound send.
///
/// Implementations must be shareable across tasks: the session calls
/// [`send`](Transport::send) from every request issuer concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the standing event stream at `url`.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the stream cannot be established.
    async fn open(&self, url: &Url) -> Result<ByteStream>;

    /// Delivers `message` to `endpoint`.
    ///
    /// Returns `Some` when the reply itself is an event stream that the
    /// session must read; `None` when replies arrive on the standing stream.
    ///
    /// # Errors
    ///
    /// Returns a connection or HTTP error if delivery fails.
    async fn send(&self, endpoint: &Url, message: &Message) -> Result<Option<ByteStream>>;
}
