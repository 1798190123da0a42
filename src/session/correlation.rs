//! Correlation table for pending requests.
//!
//! Two indexes over one set of entries:
//!
//! - request id → [`PendingRequest`]
//! - progress token → request id
//!
//! Both live behind a single mutex so an entry and its token mapping are
//! inserted and removed together. Callbacks and settlement channels are
//! always invoked after the lock is released, so a progress handler may
//! issue new requests without deadlocking.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ProgressToken, RequestId};

use super::progress::ProgressUpdate;

// ============================================================================
// Types
// ============================================================================

/// Terminal value delivered to the caller.
pub type Outcome = Result<Value>;

/// Progress callback.
///
/// Invoked zero or more times before settlement, from the stream-reading
/// task.
pub type ProgressHandler = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

// ============================================================================
// PendingRequest
// ============================================================================

/// State of one outstanding request.
///
/// Lives in the table from just before the outbound send until it settles.
pub struct PendingRequest {
    /// Correlation id.
    pub id: RequestId,
    /// Token the remote tags progress with.
    pub progress_token: ProgressToken,
    /// When the request times out.
    pub deadline: Instant,
    settle_tx: oneshot::Sender<Outcome>,
    on_progress: Option<ProgressHandler>,
    timer: Option<AbortHandle>,
}

impl PendingRequest {
    /// Creates an entry and the receiver its outcome will arrive on.
    #[must_use]
    pub fn new(
        id: RequestId,
        progress_token: ProgressToken,
        deadline: Instant,
        on_progress: Option<ProgressHandler>,
    ) -> (Self, oneshot::Receiver<Outcome>) {
        let (settle_tx, settle_rx) = oneshot::channel();
        let entry = Self {
            id,
            progress_token,
            deadline,
            settle_tx,
            on_progress,
            timer: None,
        };
        (entry, settle_rx)
    }

    /// Stops the timer and delivers the outcome.
    fn complete(self, outcome: Outcome) {
        if let Some(timer) = self.timer {
            timer.abort();
        }

        if self.settle_tx.send(outcome).is_err() {
            trace!(id = %self.id, "Caller dropped before settlement");
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("progress_token", &self.progress_token)
            .field("deadline", &self.deadline)
            .field("has_progress_handler", &self.on_progress.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// CorrelationTable
// ============================================================================

#[derive(Default)]
struct TableState {
    pending: FxHashMap<RequestId, PendingRequest>,
    tokens: FxHashMap<ProgressToken, RequestId>,
}

impl TableState {
    fn remove(&mut self, id: RequestId) -> Option<PendingRequest> {
        let entry = self.pending.remove(&id)?;
        self.tokens.remove(&entry.progress_token);
        Some(entry)
    }
}

/// Pending requests of one session, indexed by id and by progress token.
pub struct CorrelationTable {
    state: Mutex<TableState>,
    limit: usize,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

impl CorrelationTable {
    /// Creates an empty table with no limit on pending entries.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table holding at most `limit` pending entries.
    #[inline]
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: Mutex::new(TableState::default()),
            limit,
        }
    }

    /// Returns the maximum number of pending entries.
    #[inline]
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Inserts an entry under its id and its progress token.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the table is full
    /// - [`Error::DuplicateKey`] if either key is already live
    ///
    /// On error the table is left unchanged.
    pub fn register(&self, entry: PendingRequest) -> Result<()> {
        let mut state = self.state.lock();

        let pending = state.pending.len();
        if pending >= self.limit {
            warn!(pending, limit = self.limit, "Too many pending requests");
            return Err(Error::protocol(format!(
                "Too many pending requests: {pending}/{}",
                self.limit
            )));
        }
        if state.pending.contains_key(&entry.id) {
            return Err(Error::duplicate_key(entry.id.to_string()));
        }
        if state.tokens.contains_key(&entry.progress_token) {
            return Err(Error::duplicate_key(entry.progress_token.to_string()));
        }

        trace!(id = %entry.id, token = %entry.progress_token, "Pending request registered");
        state.tokens.insert(entry.progress_token.clone(), entry.id);
        state.pending.insert(entry.id, entry);
        Ok(())
    }

    /// Attaches the timeout timer to a live entry.
    ///
    /// If the entry already settled, the timer is aborted instead.
    pub fn attach_timer(&self, id: RequestId, timer: AbortHandle) {
        let mut state = self.state.lock();
        match state.pending.get_mut(&id) {
            Some(entry) => entry.timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Removes the entry for `id` and delivers `outcome` to its caller.
    ///
    /// Returns `false` if `id` is not live, which is expected for late or
    /// duplicate responses and for responses after a timeout.
    pub fn settle(&self, id: RequestId, outcome: Outcome) -> bool {
        let entry = self.state.lock().remove(id);

        match entry {
            Some(entry) => {
                debug!(%id, success = outcome.is_ok(), "Request settled");
                entry.complete(outcome);
                true
            }
            None => {
                warn!(%id, "Response for unknown request");
                false
            }
        }
    }

    /// Hands `update` to the progress callback of the request owning its
    /// token. Never settles.
    ///
    /// Returns `false` if the token is not live; the update is dropped.
    pub fn route_progress(&self, update: ProgressUpdate) -> bool {
        let handler = {
            let state = self.state.lock();
            let Some(entry) = state
                .tokens
                .get(&update.progress_token)
                .and_then(|id| state.pending.get(id))
            else {
                return false;
            };
            entry.on_progress.clone()
        };

        if let Some(handler) = handler {
            handler(update);
        }
        true
    }

    /// Settles every live entry with an error from `make_error` and clears
    /// both indexes.
    ///
    /// Returns the number of entries drained.
    pub fn drain_all(&self, make_error: impl Fn() -> Error) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut state = self.state.lock();
            state.tokens.clear();
            state.pending.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            entry.complete(Err(make_error()));
        }

        if count > 0 {
            debug!(count, "Failed pending requests");
        }
        count
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Returns `true` if `id` is pending.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.state.lock().pending.contains_key(&id)
    }

    /// Returns the id owning `token`, if live.
    #[inline]
    #[must_use]
    pub fn owner_of(&self, token: &ProgressToken) -> Option<RequestId> {
        self.state.lock().tokens.get(token).copied()
    }
}

impl fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CorrelationTable")
            .field("pending", &state.pending.len())
            .field("tokens", &state.tokens.len())
            .field("limit", &self.limit)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
