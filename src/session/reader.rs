//! Stream reading and inbound dispatch.
//!
//! One task per stream. Bytes go through the [`FrameReassembler`], frames
//! through [`Frame::parse`] and payloads through [`Envelope::parse`], then
//! each envelope is dispatched against the shared correlation table.
//! Nothing here returns an error: a malformed frame is logged and skipped.
//!
//! Every stream belongs to one connection epoch. Once the session moves on
//! to another epoch, the stream's remaining frames are ignored.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, error, trace, warn};

use crate::frame::{Frame, FrameReassembler};
use crate::protocol::Envelope;
use crate::transport::ByteStream;

use super::core::Shared;
use super::progress;

// ============================================================================
// StreamRole
// ============================================================================

/// What a stream's end means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StreamRole {
    /// The connection's event stream. Its end fails every pending request.
    Standing {
        /// Connection generation the stream belongs to.
        epoch: u64,
    },
    /// Reply to a single send. Its end changes nothing.
    Reply {
        /// Connection generation the send was made on.
        epoch: u64,
    },
}

impl StreamRole {
    #[inline]
    fn epoch(self) -> u64 {
        match self {
            Self::Standing { epoch } | Self::Reply { epoch } => epoch,
        }
    }
}

// ============================================================================
// Reader loop
// ============================================================================

/// Reads `stream` to its end, dispatching every complete frame.
pub(super) async fn run(mut stream: ByteStream, shared: Arc<Shared>, role: StreamRole) {
    let mut reassembler = FrameReassembler::new();

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                if !shared.is_current(role.epoch()) {
                    debug!(?role, "Stream outlived its connection");
                    break;
                }
                for text in reassembler.push(&chunk) {
                    dispatch_frame(&shared, role, &text);
                }
            }
            Some(Err(e)) => {
                error!(error = %e, ?role, "Event stream read failed");
                break;
            }
            None => {
                debug!(?role, "Event stream ended");
                break;
            }
        }
    }

    let discarded = reassembler.finish();
    if discarded > 0 {
        debug!(discarded, "Dropped incomplete trailing frame");
    }

    if let StreamRole::Standing { epoch } = role {
        shared.standing_stream_ended(epoch);
    }
}

// ============================================================================
// Dispatch
// ============================================================================

fn dispatch_frame(shared: &Shared, role: StreamRole, text: &str) {
    let frame = Frame::parse(text);
    trace!(event = %frame.event_type, id = ?frame.id, len = frame.data.len(), "Frame");

    if frame.is_endpoint() {
        match role {
            StreamRole::Standing { epoch } => shared.resolve_endpoint(epoch, &frame.data),
            StreamRole::Reply { .. } => debug!("Ignoring endpoint event on a reply stream"),
        }
        return;
    }

    if !frame.is_message() || !frame.has_data() {
        return;
    }

    match Envelope::parse(&frame.data) {
        Ok(envelope) => dispatch_envelope(shared, envelope),
        Err(e) => warn!(error = %e, data = %frame.data, "Discarding malformed payload"),
    }
}

fn dispatch_envelope(shared: &Shared, envelope: Envelope) {
    match envelope {
        Envelope::Response(response) => {
            let Some(id) = response.request_id() else {
                warn!(id = %response.id, "Response with a foreign id");
                return;
            };
            shared.table.settle(id, response.into_result());
        }

        Envelope::Progress(params) => {
            progress::route(&shared.table, params);
        }

        Envelope::Notification { method, params } => {
            shared.notify_handler(&method, params.as_ref());
        }

        Envelope::Request { id, method } => {
            warn!(%id, method, "Ignoring server request");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
