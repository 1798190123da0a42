//! Incremental frame reassembly.
//!
//! The transport hands over byte chunks of arbitrary size. A chunk may end
//! in the middle of a frame, in the middle of the delimiter, or in the middle
//! of a multi-byte UTF-8 sequence. [`FrameReassembler`] carries all three
//! across chunk boundaries so that the emitted frames do not depend on how
//! the stream was split.

// ============================================================================
// Imports
// ============================================================================

use std::mem;

use tracing::warn;

// ============================================================================
// Constants
// ============================================================================

/// Separator between two frames.
pub const FRAME_DELIMITER: &str = "\n\n";

/// Substituted for byte sequences that are not valid UTF-8.
const REPLACEMENT: char = '\u{FFFD}';

// ============================================================================
// Utf8Decoder
// ============================================================================

/// Streaming UTF-8 decoder.
///
/// Holds back an incomplete trailing sequence until the next chunk arrives.
/// Invalid sequences decode to U+FFFD instead of failing the stream.
#[derive(Debug, Default)]
struct Utf8Decoder {
    /// Bytes of an incomplete trailing sequence.
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decodes `chunk`, prefixed by whatever was held back last time.
    fn decode(&mut self, chunk: &[u8]) -> String {
        let bytes = if self.pending.is_empty() {
            chunk.to_vec()
        } else {
            let mut joined = mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            joined
        };

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        let mut dropped = 0;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));

                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            dropped += len;
                            rest = &rest[valid + len..];
                        }
                        None => {
                            self.pending = rest[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }

        if dropped > 0 {
            warn!(dropped, "Replaced invalid UTF-8 in event stream");
        }
        out
    }
}

// ============================================================================
// FrameReassembler
// ============================================================================

/// Accumulates stream chunks and yields complete frames.
///
/// # Example
///
/// ```
/// use mcp_stream_client::frame::FrameReassembler;
///
/// let mut reassembler = FrameReassembler::new();
/// assert!(reassembler.push(b"data: {\"a\"").is_empty());
///
/// let frames = reassembler.push(b":1}\n\ndata: x");
/// assert_eq!(frames, vec!["data: {\"a\":1}".to_string()]);
/// assert_eq!(reassembler.buffered(), "data: x");
/// ```
#[derive(Debug, Default)]
pub struct FrameReassembler {
    /// Text decoder state across chunks.
    decoder: Utf8Decoder,
    /// Prefix of a not-yet-complete frame.
    buffer: String,
}

impl FrameReassembler {
    /// Creates an empty reassembler.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a raw byte chunk, returning every frame it completes.
    ///
    /// Frames are returned in arrival order. The trailing segment stays
    /// buffered until a later chunk completes it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(chunk);
        self.push_str(&text)
    }

    /// Feeds already-decoded text.
    pub fn push_str(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].find(FRAME_DELIMITER) {
            frames.push(self.buffer[start..start + offset].to_owned());
            start += offset + FRAME_DELIMITER.len();
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        frames
    }

    /// Returns the buffered, incomplete trailing segment.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Ends the stream.
    ///
    /// An incomplete trailing frame is not an error; it is dropped. Returns
    /// the number of bytes discarded so the caller can log it.
    pub fn finish(self) -> usize {
        self.buffer.len() + self.decoder.pending.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
