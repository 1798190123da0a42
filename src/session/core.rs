//! Session: connection lifecycle and request issuance.
//!
//! A [`Session`] owns one logical connection. In legacy mode it holds a
//! standing event stream read by a single background task; in streamable
//! mode each send may return its own reply stream, read by a task of its
//! own. Both kinds of stream feed the same dispatcher and the same
//! [`CorrelationTable`].
//!
//! # Request lifecycle
//!
//! 1. Allocate the next id (1, 2, 3, ... for a fresh session)
//! 2. Pick the progress token (caller's, or generated from the id)
//! 3. Register the pending entry
//! 4. Arm the timeout timer
//! 5. Start the send in a task of its own
//! 6. Hand the caller a [`ResponseHandle`]
//!
//! Registration always precedes the send, so a reply delivered while the
//! send is still in flight finds its entry. The caller never waits on the
//! send itself: a blocked send cannot hold back the timeout, and a failed
//! send settles the entry with its error.
//!
//! Send tasks and reply streams are tagged with the connection epoch. Once
//! the session is closed, anything they return is dropped, so an id reused
//! after a reopen is never settled by the previous connection.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, sleep_until, timeout, timeout_at};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{ProgressToken, RequestId};
use crate::protocol::{Message, Notification, Request};
use crate::transport::Transport;

use super::builder::{ConnectionMode, SessionBuilder, SessionConfig};
use super::correlation::{CorrelationTable, Outcome, PendingRequest};
use super::options::RequestOptions;
use super::reader::{self, StreamRole};

// ============================================================================
// Types
// ============================================================================

/// Observer for notifications other than progress.
///
/// Receives the method name and the params, if any.
pub type NotificationHandler = Arc<dyn Fn(&str, Option<&Value>) + Send + Sync>;

/// Where the session currently sends messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum EndpointState {
    /// Waiting for the `endpoint` event.
    Pending,
    /// Messages go here.
    Ready(Url),
    /// The standing stream ended or the session was closed.
    Closed,
}

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Snapshot of a session's connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Whether an endpoint is known and the stream is live.
    pub connected: bool,
    /// Resolved message endpoint.
    pub endpoint: Option<Url>,
    /// Number of pending requests.
    pub pending: usize,
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between the session and its reader tasks.
///
/// Reader tasks hold only this, never the session itself.
pub(super) struct Shared {
    pub(super) table: CorrelationTable,
    pub(super) endpoint: watch::Sender<EndpointState>,
    pub(super) connected: AtomicBool,
    /// Bumped on every open and close. Readers and send tasks act only
    /// while their epoch is still current.
    pub(super) epoch: AtomicU64,
    pub(super) endpoint_base: Url,
    pub(super) notification_handler: Mutex<Option<NotificationHandler>>,
}

impl Shared {
    pub(super) fn new(endpoint_base: Url, max_pending: usize) -> Self {
        let (endpoint, _) = watch::channel(EndpointState::Pending);
        Self {
            table: CorrelationTable::with_limit(max_pending),
            endpoint,
            connected: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            endpoint_base,
            notification_handler: Mutex::new(None),
        }
    }

    /// Returns `true` if `epoch` is the current connection.
    pub(super) fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Returns the endpoint if one is ready.
    pub(super) fn current_endpoint(&self) -> Option<Url> {
        match &*self.endpoint.borrow() {
            EndpointState::Ready(url) => Some(url.clone()),
            _ => None,
        }
    }

    /// Resolves the `endpoint` event data against the base URL.
    ///
    /// Only the first event of a connection counts.
    pub(super) fn resolve_endpoint(&self, epoch: u64, data: &str) {
        if !self.is_current(epoch) {
            return;
        }

        let url = match self.endpoint_base.join(data.trim()) {
            Ok(url) => url,
            Err(e) => {
                warn!(data, error = %e, "Unusable endpoint event");
                return;
            }
        };

        let accepted = self.endpoint.send_if_modified(|state| {
            if matches!(state, EndpointState::Pending) {
                *state = EndpointState::Ready(url.clone());
                true
            } else {
                false
            }
        });

        if accepted {
            self.connected.store(true, Ordering::SeqCst);
            debug!(endpoint = %url, "Endpoint resolved");
        } else {
            debug!(data, "Ignoring repeated endpoint event");
        }
    }

    /// Tears the connection down after the standing stream ended.
    pub(super) fn standing_stream_ended(&self, epoch: u64) {
        if !self.is_current(epoch) {
            return;
        }

        self.connected.store(false, Ordering::SeqCst);
        self.endpoint.send_replace(EndpointState::Closed);
        let failed = self.table.drain_all(|| Error::Disconnected);
        info!(failed, "Event stream closed");
    }

    /// Hands a notification to the installed handler, if any.
    pub(super) fn notify_handler(&self, method: &str, params: Option<&Value>) {
        let handler = self.notification_handler.lock().clone();
        match handler {
            Some(handler) => handler(method, params),
            None => debug!(method, "Notification"),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// A client session over one logical connection.
///
/// Cheap to clone; clones share the connection and the pending requests.
///
/// # Example
///
/// ```no_run
/// use mcp_stream_client::{RequestOptions, Session};
/// use mcp_stream_client::transport::HttpTransport;
/// use serde_json::json;
///
/// # async fn example() -> mcp_stream_client::Result<()> {
/// let session = Session::builder()
///     .legacy_sse("http://localhost:5050/mcp/sse")
///     .build(HttpTransport::new())?;
/// session.open().await?;
///
/// let tools = session.request("tools/list", json!({}), RequestOptions::new()).await?;
/// println!("{tools}");
///
/// session.close();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
    /// Send tasks and reply readers; aborted on close.
    tasks: Mutex<Vec<AbortHandle>>,
    /// Serialises `open` calls.
    open_lock: tokio::sync::Mutex<()>,
    shared: Arc<Shared>,
}

impl Inner {
    fn abort_tasks(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    fn track(&self, task: AbortHandle) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|handle| !handle.is_finished());
        tasks.push(task);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.abort_tasks();
        self.shared.table.drain_all(|| Error::Disconnected);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.inner.config.mode)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Creates a closed session from a validated configuration.
    pub(crate) fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let shared = Arc::new(Shared::new(
            config.mode.endpoint_base(),
            config.max_pending,
        ));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                transport,
                next_id: AtomicU64::new(0),
                reader: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                open_lock: tokio::sync::Mutex::new(()),
                shared,
            }),
        })
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Opens the connection.
    ///
    /// In legacy mode, opens the event stream and waits for the `endpoint`
    /// event. Calling this on an open session does nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if no endpoint arrives in time
    /// - [`Error::ConnectionClosed`] if the stream ends first
    /// - Any transport error from opening the stream
    ///
    /// On failure the session is left closed.
    pub async fn open(&self) -> Result<()> {
        let _guard = self.inner.open_lock.lock().await;

        if self.is_connected() {
            debug!("Session already open");
            return Ok(());
        }

        let shared = &self.inner.shared;

        match &self.inner.config.mode {
            ConnectionMode::StreamableHttp { url } => {
                shared.epoch.fetch_add(1, Ordering::SeqCst);
                shared.endpoint.send_replace(EndpointState::Ready(url.clone()));
                shared.connected.store(true, Ordering::SeqCst);
                info!(endpoint = %url, "Session open");
                Ok(())
            }

            ConnectionMode::LegacySse { sse_url } => {
                debug!(url = %sse_url, "Opening event stream");
                let stream = self.inner.transport.open(sse_url).await?;

                let epoch = shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                shared.endpoint.send_replace(EndpointState::Pending);
                let mut endpoint_rx = shared.endpoint.subscribe();

                let reader = tokio::spawn(reader::run(
                    stream,
                    Arc::clone(shared),
                    StreamRole::Standing { epoch },
                ));
                if let Some(previous) = self.inner.reader.lock().replace(reader) {
                    previous.abort();
                }

                let wait = self.inner.config.endpoint_timeout;
                let resolved = match timeout(
                    wait,
                    endpoint_rx.wait_for(|state| !matches!(state, EndpointState::Pending)),
                )
                .await
                {
                    Ok(Ok(state)) => match &*state {
                        EndpointState::Ready(url) => Ok(url.clone()),
                        _ => Err(Error::ConnectionClosed),
                    },
                    Ok(Err(_)) => Err(Error::ConnectionClosed),
                    Err(_) => Err(Error::connection_timeout(wait.as_millis() as u64)),
                };

                match resolved {
                    Ok(endpoint) => {
                        info!(%endpoint, "Session open");
                        Ok(())
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to open session");
                        self.close();
                        Err(e)
                    }
                }
            }
        }
    }

    /// Closes the connection.
    ///
    /// Stops every reader and in-flight send, fails all pending requests with
    /// [`Error::Disconnected`], forgets the endpoint and resets the id
    /// counter. The session may be opened again.
    pub fn close(&self) {
        let shared = &self.inner.shared;

        self.inner.abort_tasks();
        shared.epoch.fetch_add(1, Ordering::SeqCst);
        shared.connected.store(false, Ordering::SeqCst);
        shared.endpoint.send_replace(EndpointState::Closed);

        let failed = shared.table.drain_all(|| Error::Disconnected);
        self.inner.next_id.store(0, Ordering::SeqCst);

        info!(failed, "Session closed");
    }

    /// Returns `true` if the session has a live endpoint.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.shared.connected.load(Ordering::SeqCst)
    }

    /// Returns the resolved message endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> Option<Url> {
        self.inner.shared.current_endpoint()
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.shared.table.len()
    }

    /// Returns a snapshot of the connection state.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.is_connected(),
            endpoint: self.endpoint(),
            pending: self.pending_count(),
        }
    }

    /// Returns the session configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Installs an observer for notifications other than progress.
    pub fn set_notification_handler<F>(&self, handler: F)
    where
        F: Fn(&str, Option<&Value>) + Send + Sync + 'static,
    {
        *self.inner.shared.notification_handler.lock() = Some(Arc::new(handler));
    }

    /// Removes the notification observer.
    pub fn clear_notification_handler(&self) {
        *self.inner.shared.notification_handler.lock() = None;
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Sends a request and waits for its terminal response.
    ///
    /// # Errors
    ///
    /// Everything [`Session::issue`] and [`ResponseHandle`] can fail with.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        options: RequestOptions,
    ) -> Result<Value> {
        self.issue(method, params, options).await?.await
    }

    /// Registers a request, starts sending it and returns a handle to its
    /// eventual outcome.
    ///
    /// Returns as soon as the entry is registered; the send runs in the
    /// background. A `tools/call` request gets the progress token injected
    /// into its arguments.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the session has no endpoint
    /// - [`Error::Protocol`] if too many requests are pending
    /// - [`Error::DuplicateKey`] if the caller's progress token is in use
    ///
    /// Send failures are not returned here; they settle the handle.
    pub async fn issue(
        &self,
        method: &str,
        params: Value,
        options: RequestOptions,
    ) -> Result<ResponseHandle> {
        let shared = &self.inner.shared;
        let epoch = shared.epoch.load(Ordering::SeqCst);
        let endpoint = shared.current_endpoint().ok_or(Error::NotConnected)?;

        let id = RequestId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let progress_token = options
            .progress_token
            .clone()
            .unwrap_or_else(|| ProgressToken::generate(id));

        let mut request = Request::new(id, method, params);
        if request.inject_progress_token(&progress_token) {
            trace!(%id, token = %progress_token, "Progress token injected");
        }

        let wait = options.effective_timeout(self.inner.config.request_timeout);
        let deadline = Instant::now() + wait;
        let (entry, rx) =
            PendingRequest::new(id, progress_token.clone(), deadline, options.on_progress);
        shared.table.register(entry)?;

        // Closed between the endpoint lookup and the registration.
        if !shared.is_current(epoch) {
            shared.table.settle(id, Err(Error::Disconnected));
            return Ok(ResponseHandle {
                id,
                progress_token,
                rx,
            });
        }

        let timer = tokio::spawn({
            let shared = Arc::clone(shared);
            let timeout_ms = wait.as_millis() as u64;
            async move {
                sleep_until(deadline).await;
                warn!(%id, timeout_ms, "Request timed out");
                shared.table.settle(id, Err(Error::request_timeout(id, timeout_ms)));
            }
        });
        shared.table.attach_timer(id, timer.abort_handle());

        trace!(%id, method, %endpoint, "Sending request");
        let send = tokio::spawn(send_request(
            Arc::clone(&self.inner.transport),
            Arc::clone(shared),
            epoch,
            endpoint,
            Message::from(request),
            deadline,
        ));
        self.inner.track(send.abort_handle());

        Ok(ResponseHandle {
            id,
            progress_token,
            rx,
        })
    }

    /// Sends a notification. No response is awaited.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the session has no endpoint
    /// - Any transport error from the send
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let shared = &self.inner.shared;
        let epoch = shared.epoch.load(Ordering::SeqCst);
        let endpoint = shared.current_endpoint().ok_or(Error::NotConnected)?;

        trace!(method, %endpoint, "Sending notification");
        let message = Message::from(Notification::new(method, params));
        if let Some(stream) = self.inner.transport.send(&endpoint, &message).await? {
            if shared.is_current(epoch) {
                let task = tokio::spawn(reader::run(
                    stream,
                    Arc::clone(shared),
                    StreamRole::Reply { epoch },
                ));
                self.inner.track(task.abort_handle());
            } else {
                debug!(method, "Dropping reply stream from a closed connection");
            }
        }
        Ok(())
    }
}

/// Sends one request and reads its reply stream, if the transport returns
/// one.
///
/// Gives up at the request's deadline; by then the timer has settled the
/// entry. Results from a connection that has since been closed are dropped.
async fn send_request(
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    epoch: u64,
    endpoint: Url,
    message: Message,
    deadline: Instant,
) {
    let id = message.id();
    let exchange = async {
        match transport.send(&endpoint, &message).await {
            Ok(Some(stream)) if shared.is_current(epoch) => {
                reader::run(stream, Arc::clone(&shared), StreamRole::Reply { epoch }).await;
            }
            Ok(Some(_)) => debug!(?id, "Dropping reply stream from a closed connection"),
            Ok(None) => {}
            Err(e) if shared.is_current(epoch) => {
                warn!(?id, error = %e, "Send failed");
                if let Some(id) = id {
                    shared.table.settle(id, Err(e));
                }
            }
            Err(e) => debug!(?id, error = %e, "Send failed after close"),
        }
    };

    if timeout_at(deadline, exchange).await.is_err() {
        debug!(?id, "Abandoning send past its deadline");
    }
}

// ============================================================================
// ResponseHandle
// ============================================================================

/// Future of one request's terminal outcome.
///
/// Resolves exactly once: with the result, the remote error, a timeout or
/// a disconnect. Dropping it does not cancel the request.
#[derive(Debug)]
#[must_use = "a response handle does nothing unless awaited"]
pub struct ResponseHandle {
    id: RequestId,
    progress_token: ProgressToken,
    rx: oneshot::Receiver<Outcome>,
}

impl ResponseHandle {
    /// Returns the request id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the progress token.
    #[inline]
    #[must_use]
    pub fn progress_token(&self) -> &ProgressToken {
        &self.progress_token
    }
}

impl Future for ResponseHandle {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::ConnectionClosed),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream;
    use serde_json::json;
    use tokio::sync::Notify;
    use tokio_test::{assert_pending, assert_ready};

    use crate::session::progress::ProgressUpdate;
    use crate::transport::{ByteStream, MemoryTransport};

    const SSE_URL: &str = "http://localhost:5050/mcp/sse";

    fn legacy(transport: &MemoryTransport) -> Session {
        Session::builder()
            .legacy_sse(SSE_URL)
            .endpoint_timeout(Duration::from_millis(500))
            .build(transport.clone())
            .expect("valid config")
    }

    async fn open_legacy(transport: &MemoryTransport) -> Session {
        transport.push_event("endpoint", "/mcp/messages?sessionId=abc");
        let session = legacy(transport);
        session.open().await.expect("open");
        session
    }

    fn response(id: u64, result: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "result": result})
    }

    fn progress(token: &str, progress: f64, total: f64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "notifications/progress",
            "params": {"progressToken": token, "progress": progress, "total": total}
        })
    }

    fn streamable<T: Transport + 'static>(transport: T) -> Session {
        Session::builder()
            .streamable_http("http://localhost/mcp")
            .build(transport)
            .expect("valid config")
    }

    /// Never finishes a send within a test's lifetime.
    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn open(&self, _url: &Url) -> Result<ByteStream> {
            Err(Error::connection("no standing stream"))
        }

        async fn send(&self, _endpoint: &Url, _message: &Message) -> Result<Option<ByteStream>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(None)
        }
    }

    /// Holds the first send until the gate opens, then answers it with
    /// "OLD" on a reply stream. Later sends return at once.
    struct GatedTransport {
        gate: Arc<Notify>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn open(&self, _url: &Url) -> Result<ByteStream> {
            Err(Error::connection("no standing stream"))
        }

        async fn send(&self, _endpoint: &Url, message: &Message) -> Result<Option<ByteStream>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
                return Ok(None);
            }
            self.gate.notified().await;

            let id = message.id().map_or(0, |id| id.as_u64());
            let frame = format!("data: {}\n\n", response(id, json!("OLD")));
            let chunk: Result<Bytes> = Ok(Bytes::from(frame));
            Ok(Some(Box::pin(stream::iter(vec![chunk]))))
        }
    }

    /// Waits until the reader has drained everything pushed so far.
    async fn settle_reader() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_open_resolves_relative_endpoint() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let status = session.status();
        assert!(status.connected);
        assert_eq!(
            status.endpoint.expect("endpoint").as_str(),
            "http://localhost:5050/mcp/messages?sessionId=abc"
        );
        assert_eq!(status.pending, 0);
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        // A second transport open would fail, so this proves no reconnect.
        session.open().await.expect("second open");
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_open_times_out_without_endpoint() {
        let transport = MemoryTransport::new();
        let session = Session::builder()
            .legacy_sse(SSE_URL)
            .endpoint_timeout(Duration::from_millis(50))
            .build(transport.clone())
            .expect("valid config");

        let err = session.open().await.expect_err("no endpoint");
        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 50 }));
        assert!(!session.is_connected());
        assert_eq!(session.endpoint(), None);
    }

    #[tokio::test]
    async fn test_open_fails_when_stream_ends_first() {
        let transport = MemoryTransport::new();
        transport.end_stream();
        let session = legacy(&transport);

        let err = session.open().await.expect_err("stream ended");
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_only_first_endpoint_counts() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        transport.push_event("endpoint", "/elsewhere");
        settle_reader().await;

        assert_eq!(
            session.endpoint().expect("endpoint").path(),
            "/mcp/messages"
        );
    }

    #[tokio::test]
    async fn test_request_before_open_fails() {
        let transport = MemoryTransport::new();
        let session = legacy(&transport);

        let err = session
            .issue("tools/list", json!({}), RequestOptions::new())
            .await
            .expect_err("not open");
        assert!(matches!(err, Error::NotConnected));
        assert!(session.notify("ping", None).await.is_err());
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_ids_start_at_one_and_increase() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let a = session
            .issue("a", json!({}), RequestOptions::new())
            .await
            .expect("a");
        let b = session
            .issue("b", json!({}), RequestOptions::new())
            .await
            .expect("b");
        assert_eq!(a.id(), RequestId::new(1));
        assert_eq!(b.id(), RequestId::new(2));

        settle_reader().await;
        let sent = transport.sent();
        assert_eq!(sent[0]["id"], 1);
        assert_eq!(sent[1]["id"], 2);
        assert_eq!(
            transport.endpoints()[0].as_str(),
            "http://localhost:5050/mcp/messages?sessionId=abc"
        );
    }

    #[tokio::test]
    async fn test_interleaved_progress_and_out_of_order_responses() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));
        let sink_a = Arc::clone(&seen_a);
        let sink_b = Arc::clone(&seen_b);

        let a = session
            .issue(
                "tools/call",
                json!({"name": "slow", "arguments": {}}),
                RequestOptions::new()
                    .with_progress_token("ta")
                    .on_progress(move |u: ProgressUpdate| sink_a.lock().push(u.percentage)),
            )
            .await
            .expect("a");
        let b = session
            .issue(
                "tools/call",
                json!({"name": "fast", "arguments": {}}),
                RequestOptions::new()
                    .with_progress_token("tb")
                    .on_progress(move |u: ProgressUpdate| sink_b.lock().push(u.percentage)),
            )
            .await
            .expect("b");

        transport.push_message(&progress("ta", 1.0, 2.0));
        transport.push_message(&progress("tb", 1.0, 4.0));
        transport.push_message(&response(2, json!("R2")));
        transport.push_message(&progress("ta", 2.0, 2.0));
        transport.push_message(&response(1, json!("R1")));

        assert_eq!(b.await.expect("b result"), json!("R2"));
        assert_eq!(a.await.expect("a result"), json!("R1"));

        assert_eq!(*seen_a.lock(), vec![Some(50), Some(100)]);
        assert_eq!(*seen_b.lock(), vec![Some(25)]);
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_many_responses_in_reverse_order() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let handle = session
                .issue("echo", json!({}), RequestOptions::new())
                .await
                .expect("issue");
            handles.push(handle);
        }
        for id in (1..=10u64).rev() {
            transport.push_message(&response(id, json!(id * 10)));
        }

        for handle in handles {
            let id = handle.id().as_u64();
            assert_eq!(handle.await.expect("result"), json!(id * 10));
        }
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_settles_with_remote() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let handle = session
            .issue("nope", json!({}), RequestOptions::new())
            .await
            .expect("issue");
        transport.push_message(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        }));

        let err = handle.await.expect_err("remote error");
        assert!(matches!(err, Error::Remote { code: -32601, .. }));
    }

    #[tokio::test]
    async fn test_timeout_then_late_response_is_ignored() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let handle = session
            .issue(
                "slow",
                json!({}),
                RequestOptions::new().with_timeout(Duration::from_millis(30)),
            )
            .await
            .expect("issue");

        let err = handle.await.expect_err("timed out");
        assert!(matches!(
            err,
            Error::RequestTimeout { timeout_ms: 30, .. }
        ));
        assert_eq!(session.pending_count(), 0);

        transport.push_message(&response(1, json!("late")));
        settle_reader().await;
        assert!(session.is_connected());
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_settles_handle() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;
        transport.fail_sends(true);

        let handle = session
            .issue("x", json!({}), RequestOptions::new())
            .await
            .expect("issue");
        let mut task = tokio_test::task::spawn(handle);
        settle_reader().await;

        let outcome = assert_ready!(task.poll());
        assert!(matches!(outcome, Err(Error::Http { status: 500, .. })));
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reply_during_send_finds_its_entry() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let observer = session.clone();
        let registered_at_send = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&registered_at_send);
        transport.set_responder(move |message| {
            let id = message.id()?;
            flag.store(observer.pending_count() == 1, Ordering::SeqCst);
            Some(format!("data: {}\n\n", response(id.as_u64(), json!("fast"))))
        });

        let result = session
            .request("ping", json!({}), RequestOptions::new())
            .await
            .expect("result");
        assert_eq!(result, json!("fast"));
        assert!(registered_at_send.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_pending_until_response() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let handle = session
            .issue("x", json!({}), RequestOptions::new())
            .await
            .expect("issue");
        let mut task = tokio_test::task::spawn(handle);
        assert_pending!(task.poll());

        transport.push_message(&progress("req-unrelated", 1.0, 2.0));
        settle_reader().await;
        assert_pending!(task.poll());

        transport.push_message(&response(1, json!(true)));
        settle_reader().await;
        assert!(task.is_woken());
        assert_eq!(assert_ready!(task.poll()).expect("ok"), json!(true));
    }

    #[tokio::test]
    async fn test_stream_end_drains_pending() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let mut handles = Vec::new();
        for _ in 0..3 {
            let handle = session
                .issue("x", json!({}), RequestOptions::new())
                .await
                .expect("issue");
            handles.push(handle);
        }
        transport.end_stream();

        for handle in handles {
            assert!(matches!(handle.await, Err(Error::Disconnected)));
        }
        assert!(!session.is_connected());
        assert_eq!(session.endpoint(), None);
    }

    #[tokio::test]
    async fn test_stream_error_drains_pending() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let handle = session
            .issue("x", json!({}), RequestOptions::new())
            .await
            .expect("issue");
        transport.fail_stream("connection reset");

        assert!(matches!(handle.await, Err(Error::Disconnected)));
    }

    #[tokio::test]
    async fn test_close_drains_and_resets_ids() {
        let transport = MemoryTransport::new();
        let session = Session::builder()
            .streamable_http("http://localhost/mcp")
            .build(transport.clone())
            .expect("valid config");
        session.open().await.expect("open");

        let first = session
            .issue("x", json!({}), RequestOptions::new())
            .await
            .expect("issue");
        session.close();
        assert!(matches!(first.await, Err(Error::Disconnected)));
        assert_eq!(session.status().pending, 0);
        assert!(!session.is_connected());

        session.open().await.expect("reopen");
        let again = session
            .issue("x", json!({}), RequestOptions::new())
            .await
            .expect("issue");
        assert_eq!(again.id(), RequestId::new(1));
    }

    #[tokio::test]
    async fn test_max_pending_is_enforced() {
        let transport = MemoryTransport::new();
        transport.push_event("endpoint", "/messages");
        let session = Session::builder()
            .legacy_sse(SSE_URL)
            .max_pending(2)
            .build(transport.clone())
            .expect("valid config");
        session.open().await.expect("open");

        let _a = session
            .issue("a", json!({}), RequestOptions::new())
            .await
            .expect("a");
        let _b = session
            .issue("b", json!({}), RequestOptions::new())
            .await
            .expect("b");
        let err = session
            .issue("c", json!({}), RequestOptions::new())
            .await
            .expect_err("over limit");
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_caller_token_rejected() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let _a = session
            .issue("a", json!({}), RequestOptions::new().with_progress_token("same"))
            .await
            .expect("a");
        let err = session
            .issue("b", json!({}), RequestOptions::new().with_progress_token("same"))
            .await
            .expect_err("duplicate token");
        assert!(matches!(err, Error::DuplicateKey { .. }));

        settle_reader().await;
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_notification_handler_and_server_requests() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.set_notification_handler(move |method, params| {
            sink.lock().push((method.to_string(), params.cloned()));
        });

        let handle = session
            .issue("x", json!({}), RequestOptions::new())
            .await
            .expect("issue");
        transport.push_message(&json!({
            "jsonrpc": "2.0",
            "method": "notifications/message",
            "params": {"level": "info"}
        }));
        transport.push_message(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sampling/createMessage"
        }));
        transport.push_frame("data: {not json");
        transport.push_message(&response(1, json!("done")));

        assert_eq!(handle.await.expect("result"), json!("done"));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "notifications/message");
        assert_eq!(seen[0].1, Some(json!({"level": "info"})));
    }

    #[tokio::test]
    async fn test_streamable_reply_stream() {
        let transport = MemoryTransport::new();
        transport.reply_streams(true);
        transport.set_responder(|message| {
            let id = message.id()?;
            Some(format!(
                "data: {}\n\ndata: {}\n\n",
                progress(&format!("req-{id}-x"), 1.0, 1.0),
                response(id.as_u64(), json!({"ok": id.as_u64()}))
            ))
        });

        let session = Session::builder()
            .streamable_http("http://localhost/mcp")
            .build(transport.clone())
            .expect("valid config");
        session.open().await.expect("open");
        assert_eq!(
            session.endpoint().expect("endpoint").as_str(),
            "http://localhost/mcp"
        );

        let result = session
            .request("tools/list", json!({}), RequestOptions::new())
            .await
            .expect("result");
        assert_eq!(result, json!({"ok": 1}));

        // A finished reply stream must not tear the session down.
        let again = session
            .request("tools/list", json!({}), RequestOptions::new())
            .await
            .expect("result");
        assert_eq!(again, json!({"ok": 2}));
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_notify_omits_empty_params() {
        let transport = MemoryTransport::new();
        let session = open_legacy(&transport).await;

        session
            .notify("notifications/initialized", Some(json!({})))
            .await
            .expect("notify");

        let sent = transport.sent();
        assert_eq!(
            sent[0],
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
        );
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_reaches_caller_while_send_blocks() {
        let session = streamable(StalledTransport);
        session.open().await.expect("open");

        let options = RequestOptions::new().with_timeout(Duration::from_millis(100));
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            session.request("slow", json!({}), options),
        )
        .await
        .expect("deadline reaches the caller");

        assert!(matches!(
            outcome,
            Err(Error::RequestTimeout { timeout_ms: 100, .. })
        ));
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_issue_returns_before_send_completes() {
        let session = streamable(StalledTransport);
        session.open().await.expect("open");

        let handle = tokio::time::timeout(
            Duration::from_secs(2),
            session.issue("slow", json!({}), RequestOptions::new()),
        )
        .await
        .expect("issue does not wait on the send")
        .expect("issue");

        assert_eq!(handle.id(), RequestId::new(1));
        assert_eq!(session.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_close_fails_request_with_blocked_send() {
        let session = streamable(StalledTransport);
        session.open().await.expect("open");

        let handle = session
            .issue("slow", json!({}), RequestOptions::new())
            .await
            .expect("issue");
        settle_reader().await;
        session.close();

        let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("close settles the handle");
        assert!(matches!(outcome, Err(Error::Disconnected)));
    }

    #[tokio::test]
    async fn test_reopen_ignores_reply_from_closed_connection() {
        let gate = Arc::new(Notify::new());
        let session = streamable(GatedTransport {
            gate: Arc::clone(&gate),
            calls: AtomicUsize::new(0),
        });
        session.open().await.expect("open");

        let old = session
            .issue("old", json!({}), RequestOptions::new())
            .await
            .expect("old");
        settle_reader().await;
        session.close();
        assert!(matches!(old.await, Err(Error::Disconnected)));

        session.open().await.expect("reopen");
        let new = session
            .issue("new", json!({}), RequestOptions::new())
            .await
            .expect("new");
        assert_eq!(new.id(), RequestId::new(1));

        gate.notify_one();
        settle_reader().await;

        let mut task = tokio_test::task::spawn(new);
        assert_pending!(task.poll());
        assert_eq!(session.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_send_outcome_from_closed_connection_is_dropped() {
        let transport = MemoryTransport::new();
        transport.reply_streams(true);
        transport.set_responder(|message| {
            let id = message.id()?;
            Some(format!("data: {}\n\n", response(id.as_u64(), json!("OLD"))))
        });

        let endpoint = Url::parse("http://localhost/mcp").expect("url");
        let shared = Arc::new(Shared::new(endpoint.clone(), 100));
        shared.epoch.store(2, Ordering::SeqCst);

        let deadline = Instant::now() + Duration::from_secs(60);
        let (entry, mut rx) =
            PendingRequest::new(RequestId::new(1), ProgressToken::new("t1"), deadline, None);
        shared.table.register(entry).expect("register");

        let message = Message::from(Request::new(RequestId::new(1), "old", json!({})));
        let stale: Arc<dyn Transport> = Arc::new(transport.clone());

        // A reply stream, then a failure, both from epoch 1.
        send_request(
            Arc::clone(&stale),
            Arc::clone(&shared),
            1,
            endpoint.clone(),
            message.clone(),
            deadline,
        )
        .await;
        transport.fail_sends(true);
        send_request(stale, Arc::clone(&shared), 1, endpoint, message, deadline).await;

        assert!(shared.table.contains(RequestId::new(1)));
        assert!(rx.try_recv().is_err());
    }
}
