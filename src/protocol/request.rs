//! Outbound JSON-RPC messages.
//!
//! # Format
//!
//! Request:
//! ```json
//! { "jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {} }
//! ```
//!
//! Notification (no `id`, `params` omitted when empty):
//! ```json
//! { "jsonrpc": "2.0", "method": "notifications/initialized" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Map, Value};

use crate::identifiers::{ProgressToken, RequestId};

use super::method;

// ============================================================================
// Constants
// ============================================================================

/// JSON-RPC protocol version tag.
pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// Request
// ============================================================================

/// A request expecting exactly one terminal response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,

    /// Correlation id echoed by the remote.
    pub id: RequestId,

    /// Method name, e.g. `tools/call`.
    pub method: String,

    /// Method parameters, `{}` when none were given.
    pub params: Value,
}

impl Request {
    /// Creates a new request.
    ///
    /// A `null` params value is normalised to an empty object.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        let params = if params.is_null() {
            Value::Object(Map::new())
        } else {
            params
        };

        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }

    /// Returns `true` for tool invocations.
    #[inline]
    #[must_use]
    pub fn is_tool_call(&self) -> bool {
        self.method == method::TOOLS_CALL
    }

    /// Injects `token` so the remote can tag its progress emissions.
    ///
    /// Only applies to tool calls whose `params.arguments` is an object. The
    /// token lands in `arguments.progressToken` and in
    /// `_meta.progressToken`. Returns `true` if the request was modified.
    pub fn inject_progress_token(&mut self, token: &ProgressToken) -> bool {
        if !self.is_tool_call() {
            return false;
        }

        let Some(params) = self.params.as_object_mut() else {
            return false;
        };

        let Some(arguments) = params.get_mut("arguments").and_then(Value::as_object_mut) else {
            return false;
        };
        arguments.insert(
            "progressToken".to_owned(),
            Value::String(token.as_str().to_owned()),
        );

        let meta = params
            .entry("_meta")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(meta) = meta.as_object_mut() {
            meta.insert(
                "progressToken".to_owned(),
                Value::String(token.as_str().to_owned()),
            );
        }

        true
    }
}

// ============================================================================
// Notification
// ============================================================================

/// A fire-and-forget message; no response is expected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,

    /// Method name, e.g. `notifications/initialized`.
    pub method: String,

    /// Parameters, omitted on the wire when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    /// Creates a new notification.
    ///
    /// `null` and `{}` params are dropped from the message.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        let params = params.filter(|p| match p {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            _ => true,
        });

        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// Anything the client sends to the remote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    /// Correlated request.
    Request(Request),
    /// Uncorrelated notification.
    Notification(Notification),
}

impl Message {
    /// Returns the method name.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Request(r) => &r.method,
            Self::Notification(n) => &n.method,
        }
    }

    /// Returns the correlation id, if this is a request.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<RequestId> {
        match self {
            Self::Request(r) => Some(r.id),
            Self::Notification(_) => None,
        }
    }
}

impl From<Request> for Message {
    #[inline]
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Notification> for Message {
    #[inline]
    fn from(notification: Notification) -> Self {
        Self::Notification(notification)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = Request::new(RequestId::new(1), "tools/list", Value::Null);
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {}})
        );
    }

    #[test]
    fn test_notification_omits_empty_params() {
        let notification = Notification::new("notifications/initialized", Some(json!({})));
        let json = serde_json::to_string(&notification).expect("serialize");
        assert_eq!(
            json,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#
        );
    }

    #[test]
    fn test_notification_keeps_params() {
        let notification =
            Notification::new("notifications/cancelled", Some(json!({"requestId": 3})));
        let value = serde_json::to_value(&notification).expect("serialize");
        assert_eq!(value["params"]["requestId"], 3);
    }

    #[test]
    fn test_inject_progress_token_into_tool_call() {
        let mut request = Request::new(
            RequestId::new(4),
            method::TOOLS_CALL,
            json!({"name": "toolA", "arguments": {"hostName": "device01"}}),
        );
        let token = ProgressToken::new("tok-4");

        assert!(request.inject_progress_token(&token));
        assert_eq!(request.params["arguments"]["progressToken"], "tok-4");
        assert_eq!(request.params["arguments"]["hostName"], "device01");
        assert_eq!(request.params["_meta"]["progressToken"], "tok-4");
    }

    #[test]
    fn test_inject_skips_other_methods() {
        let mut request = Request::new(
            RequestId::new(1),
            "tools/list",
            json!({"arguments": {}}),
        );
        assert!(!request.inject_progress_token(&ProgressToken::new("t")));
        assert_eq!(request.params, json!({"arguments": {}}));
    }

    #[test]
    fn test_inject_skips_tool_call_without_arguments() {
        let mut request = Request::new(RequestId::new(1), method::TOOLS_CALL, json!({"name": "x"}));
        assert!(!request.inject_progress_token(&ProgressToken::new("t")));
        assert!(request.params.get("_meta").is_none());
    }

    #[test]
    fn test_message_accessors() {
        let message: Message = Request::new(RequestId::new(2), "ping", Value::Null).into();
        assert_eq!(message.method(), "ping");
        assert_eq!(message.id(), Some(RequestId::new(2)));

        let message: Message = Notification::new("notifications/initialized", None).into();
        assert_eq!(message.id(), None);
    }
}
