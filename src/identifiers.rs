//! Type-safe identifiers for request correlation.
//!
//! Newtype wrappers keep correlation ids and progress tokens from being
//! mixed up with each other or with arbitrary JSON values.
//!
//! | Type | Wire form | Scope |
//! |------|-----------|-------|
//! | [`RequestId`] | JSON number | Unique among outstanding requests of a session |
//! | [`ProgressToken`] | JSON string (numbers accepted inbound) | Unique among outstanding requests of a session |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// RequestId
// ============================================================================

/// JSON-RPC correlation id chosen by the client.
///
/// Allocated from a per-session monotonic counter starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Creates a request id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Reads a request id from a JSON value.
    ///
    /// Only non-negative integers are ids this client could have issued;
    /// anything else yields `None`.
    #[inline]
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        value.as_u64().map(Self)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ============================================================================
// ProgressToken
// ============================================================================

/// Opaque token the remote echoes in `notifications/progress`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressToken(String);

impl ProgressToken {
    /// Creates a token from a caller-supplied string.
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generates a token for `id` as `req-{id}-{unix millis}`.
    #[must_use]
    pub fn generate(id: RequestId) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self(format!("req-{id}-{millis}"))
    }

    /// Reads a token from a JSON value.
    ///
    /// Numeric tokens are accepted and compared by their decimal text.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Returns the token as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns at most the first `n` characters, for log lines.
    #[must_use]
    pub fn short(&self, n: usize) -> &str {
        match self.0.char_indices().nth(n) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProgressToken {
    #[inline]
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for ProgressToken {
    #[inline]
    fn from(token: String) -> Self {
        Self(token)
    }
}

// ============================================================================
// Tests
// ============================================================================
