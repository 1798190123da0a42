//! Per-request options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use mcp_stream_client::RequestOptions;
//!
//! let options = RequestOptions::new()
//!     .with_timeout(Duration::from_secs(5))
//!     .on_progress(|p| println!("{:?}% {:?}", p.percentage, p.message));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::identifiers::ProgressToken;

use super::correlation::ProgressHandler;
use super::progress::ProgressUpdate;

// ============================================================================
// RequestOptions
// ============================================================================

/// Options for a single request.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Caller-chosen progress token. Generated from the id when absent.
    pub progress_token: Option<ProgressToken>,

    /// Deadline for the terminal response. Zero or absent means the
    /// session default.
    pub timeout: Option<Duration>,

    /// Progress callback.
    pub on_progress: Option<ProgressHandler>,
}

impl RequestOptions {
    /// Creates options with every field unset.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the progress token.
    #[inline]
    #[must_use]
    pub fn with_progress_token(mut self, token: impl Into<ProgressToken>) -> Self {
        self.progress_token = Some(token.into());
        self
    }

    /// Sets the timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the progress callback.
    #[must_use]
    pub fn on_progress<F>(mut self, handler: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(handler));
        self
    }

    /// Resolves the effective timeout against the session default.
    #[inline]
    #[must_use]
    pub(crate) fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout.filter(|t| !t.is_zero()).unwrap_or(default)
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("progress_token", &self.progress_token)
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
