//! Progress routing.
//!
//! All requests share one stream, so progress for different requests
//! arrives interleaved. Each `notifications/progress` is matched to its
//! request through the progress token and handed to that request's
//! callback; the request itself stays pending.

// ============================================================================
// Imports
// ============================================================================

use tracing::{trace, warn};

use crate::identifiers::ProgressToken;
use crate::protocol::ProgressParams;

use super::correlation::CorrelationTable;

// ============================================================================
// ProgressUpdate
// ============================================================================

/// One progress report, as seen by a request's progress callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Token of the owning request.
    pub progress_token: ProgressToken,
    /// Work done so far.
    pub progress: f64,
    /// Total work, if the remote knows it.
    pub total: Option<f64>,
    /// Status text from the remote.
    pub message: Option<String>,
    /// `round(100 * progress / total)`, absent without a usable total.
    pub percentage: Option<i64>,
}

impl ProgressUpdate {
    /// Creates an update, computing the percentage.
    #[must_use]
    pub fn new(
        progress_token: ProgressToken,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> Self {
        Self {
            percentage: percentage(progress, total),
            progress_token,
            progress,
            total,
            message,
        }
    }
}

impl From<ProgressParams> for ProgressUpdate {
    fn from(params: ProgressParams) -> Self {
        Self::new(
            params.progress_token,
            params.progress,
            params.total,
            params.message,
        )
    }
}

/// Computes `round(100 * progress / total)`.
///
/// A missing, zero or non-finite total yields `None`.
#[must_use]
pub fn percentage(progress: f64, total: Option<f64>) -> Option<i64> {
    let total = total.filter(|t| *t != 0.0 && t.is_finite())?;
    let ratio = (progress / total * 100.0).round();
    ratio.is_finite().then_some(ratio as i64)
}

// ============================================================================
// Routing
// ============================================================================

/// Routes a progress notification to its owning request.
///
/// Returns `false` if no live request owns the token. That is expected
/// when progress trails the final response, so it is only logged.
pub(crate) fn route(table: &CorrelationTable, params: ProgressParams) -> bool {
    let update = ProgressUpdate::from(params);

    trace!(
        token = update.progress_token.short(8),
        progress = update.progress,
        percentage = ?update.percentage,
        message = update.message.as_deref().unwrap_or_default(),
        "Progress"
    );

    let token = update.progress_token.clone();
    let routed = table.route_progress(update);
    if !routed {
        warn!(%token, "Progress for unknown token dropped");
    }
    routed
}

// ============================================================================
// Tests
// ============================================================================
