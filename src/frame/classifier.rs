//! Frame string parsing.
//!
//! Parsing is line-oriented and tolerant: unknown prefixes (comments,
//! `retry:`) are skipped, a missing `event:` line means `message`, and a
//! frame without data is still a valid [`Frame`], just one with nothing to
//! dispatch.

// ============================================================================
// Constants
// ============================================================================

/// Event type of a frame without an `event:` line.
pub const EVENT_MESSAGE: &str = "message";

/// Event type announcing the message endpoint.
pub const EVENT_ENDPOINT: &str = "endpoint";

const EVENT_PREFIX: &str = "event:";
const DATA_PREFIX: &str = "data:";
const ID_PREFIX: &str = "id:";

// ============================================================================
// Frame
// ============================================================================

/// One delimited unit of the event stream.
///
/// Transient: produced by the reader loop and dropped after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Event type, `message` unless the frame says otherwise.
    pub event_type: String,
    /// Value of the `id:` line, if any.
    pub id: Option<String>,
    /// Concatenated `data:` line contents.
    pub data: String,
}

impl Frame {
    /// Parses a frame string.
    ///
    /// `event:` and `id:` values are trimmed. Each `data:` value loses at
    /// most one leading space, and the values are concatenated in order
    /// without a separator.
    ///
    /// # Example
    ///
    /// ```
    /// use mcp_stream_client::frame::Frame;
    ///
    /// let frame = Frame::parse("event: endpoint\ndata: /messages?s=1");
    /// assert_eq!(frame.event_type, "endpoint");
    /// assert_eq!(frame.data, "/messages?s=1");
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut event_type = None;
        let mut id = None;
        let mut data = String::new();

        for line in text.split('\n') {
            if let Some(value) = line.strip_prefix(EVENT_PREFIX) {
                event_type = Some(value.trim().to_owned());
            } else if let Some(value) = line.strip_prefix(DATA_PREFIX) {
                data.push_str(value.strip_prefix(' ').unwrap_or(value));
            } else if let Some(value) = line.strip_prefix(ID_PREFIX) {
                id = Some(value.trim().to_owned());
            }
        }

        Self {
            event_type: event_type.unwrap_or_else(|| EVENT_MESSAGE.to_owned()),
            id,
            data,
        }
    }

    /// Returns `true` for `message` frames.
    #[inline]
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.event_type == EVENT_MESSAGE
    }

    /// Returns `true` for `endpoint` frames.
    #[inline]
    #[must_use]
    pub fn is_endpoint(&self) -> bool {
        self.event_type == EVENT_ENDPOINT
    }

    /// Returns `true` if the frame carries a payload worth dispatching.
    #[inline]
    #[must_use]
    pub fn has_data(&self) -> bool {
        !self.data.trim().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_message() {
        let frame = Frame::parse("data: {\"jsonrpc\":\"2.0\"}");
        assert_eq!(frame.event_type, EVENT_MESSAGE);
        assert!(frame.is_message());
        assert_eq!(frame.id, None);
        assert_eq!(frame.data, "{\"jsonrpc\":\"2.0\"}");
    }

    #[test]
    fn test_endpoint_event() {
        let frame = Frame::parse("event: endpoint\ndata: /mcp/messages?sessionId=abc");
        assert!(frame.is_endpoint());
        assert_eq!(frame.data, "/mcp/messages?sessionId=abc");
    }

    #[test]
    fn test_id_line() {
        let frame = Frame::parse("id: 42 \ndata: x");
        assert_eq!(frame.id.as_deref(), Some("42"));
    }

    #[test]
    fn test_multiple_data_lines_concatenate() {
        let frame = Frame::parse("data: {\"a\":\ndata: 1}");
        assert_eq!(frame.data, "{\"a\":1}");
    }

    #[test]
    fn test_only_one_leading_space_stripped() {
        let frame = Frame::parse("data:  indented\ndata:tight");
        assert_eq!(frame.data, " indentedtight");
    }

    #[test]
    fn test_unknown_lines_ignored() {
        let frame = Frame::parse(": keep-alive\nretry: 1000\nfoo: bar\ndata: ok");
        assert_eq!(frame.event_type, EVENT_MESSAGE);
        assert_eq!(frame.data, "ok");
    }

    #[test]
    fn test_empty_frame_has_no_data() {
        let frame = Frame::parse("");
        assert!(frame.is_message());
        assert!(!frame.has_data());

        let comment_only = Frame::parse(": ping");
        assert!(!comment_only.has_data());
    }

    #[test]
    fn test_event_without_space() {
        let frame = Frame::parse("event:endpoint\ndata:/messages");
        assert!(frame.is_endpoint());
        assert_eq!(frame.data, "/messages");
    }
}
