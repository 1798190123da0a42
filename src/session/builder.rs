//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and creating [`Session`] instances.
//!
//! # Example
//!
//! ```no_run
//! use mcp_stream_client::Session;
//! use mcp_stream_client::transport::HttpTransport;
//!
//! # fn example() -> mcp_stream_client::Result<()> {
//! let session = Session::builder()
//!     .legacy_sse("http://localhost:5050/mcp/sse")
//!     .build(HttpTransport::new().with_access_token("token"))?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::Transport;

use super::core::Session;

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for a terminal response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Default wait for the `endpoint` event after opening the stream.
pub const DEFAULT_ENDPOINT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default cap on simultaneously pending requests.
pub const DEFAULT_MAX_PENDING: usize = 100;

// ============================================================================
// ConnectionMode
// ============================================================================

/// How the session reaches the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Standing `GET` event stream; messages go to the endpoint it announces.
    LegacySse {
        /// Event stream URL.
        sse_url: Url,
    },
    /// No standing stream; every `POST` goes to `url` and may reply with
    /// its own event stream.
    StreamableHttp {
        /// Message URL.
        url: Url,
    },
}

impl ConnectionMode {
    /// Base URL a relative `endpoint` event resolves against.
    ///
    /// For the legacy mode this is the stream URL with a trailing `sse`
    /// path segment removed. Host, query and other segments are kept.
    #[must_use]
    pub fn endpoint_base(&self) -> Url {
        match self {
            Self::LegacySse { sse_url } => {
                let mut base = sse_url.clone();
                let ends_in_sse = sse_url
                    .path_segments()
                    .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
                    == Some("sse");
                if ends_in_sse && let Ok(mut segments) = base.path_segments_mut() {
                    segments.pop_if_empty().pop();
                }
                base
            }
            Self::StreamableHttp { url } => url.clone(),
        }
    }
}

// ============================================================================
// SessionConfig
// ============================================================================

/// Validated session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Connection mode and URL.
    pub mode: ConnectionMode,
    /// Default request deadline.
    pub request_timeout: Duration,
    /// Wait for the `endpoint` event.
    pub endpoint_timeout: Duration,
    /// Cap on simultaneously pending requests.
    pub max_pending: usize,
}

// ============================================================================
// SessionBuilder
// ============================================================================

#[derive(Debug, Clone)]
enum ModeSpec {
    LegacySse(String),
    StreamableHttp(String),
}

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct SessionBuilder {
    mode: Option<ModeSpec>,
    request_timeout: Option<Duration>,
    endpoint_timeout: Option<Duration>,
    max_pending: Option<usize>,
}

impl SessionBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a standing event stream at `sse_url`.
    #[inline]
    #[must_use]
    pub fn legacy_sse(mut self, sse_url: impl Into<String>) -> Self {
        self.mode = Some(ModeSpec::LegacySse(sse_url.into()));
        self
    }

    /// Posts every message to `url` and reads per-request reply streams.
    #[inline]
    #[must_use]
    pub fn streamable_http(mut self, url: impl Into<String>) -> Self {
        self.mode = Some(ModeSpec::StreamableHttp(url.into()));
        self
    }

    /// Sets the default request deadline. Zero keeps the default.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets how long `open` waits for the `endpoint` event.
    #[inline]
    #[must_use]
    pub fn endpoint_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint_timeout = Some(timeout);
        self
    }

    /// Caps simultaneously pending requests.
    #[inline]
    #[must_use]
    pub fn max_pending(mut self, max: usize) -> Self {
        self.max_pending = Some(max);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no mode was chosen
    /// - [`Error::Config`] if the URL does not parse or the cap is zero
    pub fn config(&self) -> Result<SessionConfig> {
        let mode = self.validate_mode()?;

        let max_pending = self.max_pending.unwrap_or(DEFAULT_MAX_PENDING);
        if max_pending == 0 {
            return Err(Error::config("max_pending must be at least 1"));
        }

        Ok(SessionConfig {
            mode,
            request_timeout: self
                .request_timeout
                .filter(|t| !t.is_zero())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            endpoint_timeout: self
                .endpoint_timeout
                .filter(|t| !t.is_zero())
                .unwrap_or(DEFAULT_ENDPOINT_TIMEOUT),
            max_pending,
        })
    }

    /// Builds the session over `transport`.
    ///
    /// # Errors
    ///
    /// See [`SessionBuilder::config`].
    pub fn build<T>(self, transport: T) -> Result<Session>
    where
        T: Transport + 'static,
    {
        self.build_shared(Arc::new(transport))
    }

    /// Builds the session over an already shared transport.
    ///
    /// # Errors
    ///
    /// See [`SessionBuilder::config`].
    pub fn build_shared(self, transport: Arc<dyn Transport>) -> Result<Session> {
        let config = self.config()?;
        Session::new(config, transport)
    }

    fn validate_mode(&self) -> Result<ConnectionMode> {
        let mode = self.mode.as_ref().ok_or_else(|| {
            Error::config(
                "Connection mode is required. Use .legacy_sse() or .streamable_http().\n\
                 Example: Session::builder().legacy_sse(\"http://localhost:5050/mcp/sse\")",
            )
        })?;

        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| Error::config(format!("Invalid URL {raw:?}: {e}")))
        };

        match mode {
            ModeSpec::LegacySse(raw) => Ok(ConnectionMode::LegacySse {
                sse_url: parse(raw)?,
            }),
            ModeSpec::StreamableHttp(raw) => Ok(ConnectionMode::StreamableHttp {
                url: parse(raw)?,
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
