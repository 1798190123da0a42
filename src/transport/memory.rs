//! In-process transport.
//!
//! The caller plays the server: it pushes frames into the standing stream,
//! inspects what the session sent, and can script replies. Used by the
//! crate's own tests and by embedders that bridge some other channel into
//! the engine.
//!
//! # Example
//!
//! ```ignore
//! let transport = MemoryTransport::new();
//! transport.push_event("endpoint", "/messages");
//!
//! let session = Session::builder()
//!     .legacy_sse("http://localhost/sse")
//!     .build(transport.clone())?;
//! session.open().await?;
//!
//! let handle = session.issue("tools/list", Value::Null, RequestOptions::new()).await?;
//! transport.push_message(&json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
//! let result = handle.await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};
use crate::frame::FRAME_DELIMITER;
use crate::protocol::Message;

use super::{ByteStream, Transport};

// ============================================================================
// Types
// ============================================================================

/// Scripted server reply.
///
/// Receives every sent message and returns raw event-stream text to deliver
/// (already delimited), or `None` for no reply.
pub type Responder = Box<dyn Fn(&Message) -> Option<String> + Send + Sync>;

type Feed = mpsc::UnboundedSender<Result<Bytes>>;
type Drain = mpsc::UnboundedReceiver<Result<Bytes>>;

// ============================================================================
// MemoryTransport
// ============================================================================

/// Transport backed by an in-process channel.
///
/// Cloning yields another handle to the same transport.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

struct Inner {
    /// Producer side of the standing stream.
    feed: Mutex<Option<Feed>>,
    /// Consumer side, taken by `open`.
    drain: Mutex<Option<Drain>>,
    /// Every message delivered through `send`, as JSON.
    sent: Mutex<Vec<Value>>,
    /// Endpoints `send` was called with, parallel to `sent`.
    endpoints: Mutex<Vec<Url>>,
    fail_sends: AtomicBool,
    reply_streams: AtomicBool,
    responder: Mutex<Option<Responder>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Creates a transport with an empty standing stream.
    #[must_use]
    pub fn new() -> Self {
        let (feed, drain) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                feed: Mutex::new(Some(feed)),
                drain: Mutex::new(Some(drain)),
                sent: Mutex::new(Vec::new()),
                endpoints: Mutex::new(Vec::new()),
                fail_sends: AtomicBool::new(false),
                reply_streams: AtomicBool::new(false),
                responder: Mutex::new(None),
            }),
        }
    }

    // ========================================================================
    // Server side: standing stream
    // ========================================================================

    /// Pushes raw bytes onto the standing stream.
    ///
    /// Returns `false` once the stream has ended.
    pub fn push_raw(&self, bytes: impl Into<Bytes>) -> bool {
        match self.inner.feed.lock().as_ref() {
            Some(feed) => feed.send(Ok(bytes.into())).is_ok(),
            None => false,
        }
    }

    /// Pushes one frame, appending the delimiter.
    pub fn push_frame(&self, frame: &str) -> bool {
        self.push_raw(format!("{frame}{FRAME_DELIMITER}"))
    }

    /// Pushes a named event with a single data line.
    pub fn push_event(&self, event: &str, data: &str) -> bool {
        self.push_frame(&format!("event: {event}\ndata: {data}"))
    }

    /// Pushes a JSON payload as a `message` frame.
    pub fn push_message(&self, payload: &Value) -> bool {
        self.push_frame(&format!("data: {payload}"))
    }

    /// Ends the standing stream cleanly.
    pub fn end_stream(&self) {
        self.inner.feed.lock().take();
    }

    /// Ends the standing stream with a read error.
    pub fn fail_stream(&self, message: impl Into<String>) {
        if let Some(feed) = self.inner.feed.lock().take() {
            let _ = feed.send(Err(Error::connection(message)));
        }
    }

    // ========================================================================
    // Server side: send behaviour
    // ========================================================================

    /// Makes every subsequent `send` fail with HTTP 500.
    pub fn fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Routes responder output to a per-send reply stream instead of the
    /// standing stream.
    pub fn reply_streams(&self, enabled: bool) {
        self.inner.reply_streams.store(enabled, Ordering::SeqCst);
    }

    /// Installs a responder invoked synchronously inside every `send`.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&Message) -> Option<String> + Send + Sync + 'static,
    {
        *self.inner.responder.lock() = Some(Box::new(responder));
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Returns every message sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Value> {
        self.inner.sent.lock().clone()
    }

    /// Returns the number of messages sent so far.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.inner.sent.lock().len()
    }

    /// Returns the endpoints messages were sent to.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Url> {
        self.inner.endpoints.lock().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, _url: &Url) -> Result<ByteStream> {
        let drain = self
            .inner
            .drain
            .lock()
            .take()
            .ok_or_else(|| Error::connection("memory stream already opened"))?;

        Ok(Box::pin(stream::unfold(drain, |mut drain| async move {
            drain.recv().await.map(|item| (item, drain))
        })))
    }

    async fn send(&self, endpoint: &Url, message: &Message) -> Result<Option<ByteStream>> {
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::http(500, "Internal Server Error"));
        }

        self.inner.sent.lock().push(serde_json::to_value(message)?);
        self.inner.endpoints.lock().push(endpoint.clone());

        let reply = self
            .inner
            .responder
            .lock()
            .as_ref()
            .and_then(|responder| responder(message));

        let Some(reply) = reply else {
            return Ok(None);
        };

        if self.inner.reply_streams.load(Ordering::SeqCst) {
            let chunk: Result<Bytes> = Ok(Bytes::from(reply));
            return Ok(Some(Box::pin(stream::iter(vec![chunk]))));
        }

        self.push_raw(reply);
        Ok(None)
    }
}

// ============================================================================
// Tests
// ============================================================================
