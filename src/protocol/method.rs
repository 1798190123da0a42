//! Method names used by the engine and the MCP helpers.

/// Session handshake request.
pub const INITIALIZE: &str = "initialize";

/// Sent once the handshake result has been received.
pub const NOTIFICATIONS_INITIALIZED: &str = "notifications/initialized";

/// Out-of-band progress for a pending request.
pub const NOTIFICATIONS_PROGRESS: &str = "notifications/progress";

/// Tool enumeration.
pub const TOOLS_LIST: &str = "tools/list";

/// Tool invocation. Gets the progress token injected into its arguments.
pub const TOOLS_CALL: &str = "tools/call";
