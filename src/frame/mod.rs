//! Server-sent event framing.
//!
//! Turns the raw byte stream of an event-stream response into discrete
//! frames and splits each frame into its event type, id and data payload.
//!
//! # Wire Format
//!
//! ```text
//! event: endpoint
//! data: /mcp/messages?sessionId=abc
//!
//! data: {"jsonrpc":"2.0","id":1,"result":{}}
//!
//! ```
//!
//! Frames are separated by a blank line (`\n\n`). Within a frame, `event:`,
//! `id:` and `data:` lines are recognised; everything else is ignored.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `reassembler` | Byte chunks → complete frame strings |
//! | `classifier` | Frame string → [`Frame`] |

// ============================================================================
// Submodules
// ============================================================================

/// Frame string parsing.
pub mod classifier;

/// Incremental frame reassembly.
pub mod reassembler;

// ============================================================================
// Re-exports
// ============================================================================

pub use classifier::{EVENT_ENDPOINT, EVENT_MESSAGE, Frame};
pub use reassembler::{FRAME_DELIMITER, FrameReassembler};
