//! Inbound payload classification.
//!
//! Every `message` frame carries one JSON-RPC payload. [`Envelope::parse`]
//! decodes it and decides where it goes:
//!
//! | Payload shape | Variant | Destination |
//! |---------------|---------|-------------|
//! | `id`, no `method` | [`Envelope::Response`] | Settles the pending request |
//! | `method: notifications/progress` | [`Envelope::Progress`] | Progress router |
//! | `method`, no `id` | [`Envelope::Notification`] | Notification handler |
//! | `method` and `id` | [`Envelope::Request`] | Logged and ignored |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::{ProgressToken, RequestId};

use super::method;

// ============================================================================
// Envelope
// ============================================================================

/// A decoded inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Terminal answer to a client request.
    Response(Response),

    /// `notifications/progress` for some progress token.
    Progress(ProgressParams),

    /// Any other notification.
    Notification {
        /// Method name.
        method: String,
        /// Parameters, if present.
        params: Option<Value>,
    },

    /// Server-initiated request. This client does not serve any.
    Request {
        /// Remote-chosen id.
        id: Value,
        /// Method name.
        method: String,
    },
}

impl Envelope {
    /// Decodes and classifies a frame's data payload.
    ///
    /// A payload is a [`Response`](Self::Response) only if it has an `id`
    /// and no `method`. One carrying both is a server-initiated
    /// [`Request`](Self::Request), so it can never settle a client request
    /// that happens to share its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the payload is not a JSON object, has
    /// neither `id` nor `method`, or its progress params are malformed.
    pub fn parse(data: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(data)
            .map_err(|e| Error::protocol(format!("invalid JSON payload: {e}")))?;

        let Value::Object(mut object) = value else {
            return Err(Error::protocol("payload is not a JSON object"));
        };

        let method = match object.remove("method") {
            Some(Value::String(method)) => Some(method),
            Some(other) => {
                return Err(Error::protocol(format!("method is not a string: {other}")));
            }
            None => None,
        };

        match method {
            Some(method) if method == method::NOTIFICATIONS_PROGRESS => {
                let params = object.remove("params").unwrap_or(Value::Null);
                ProgressParams::deserialize(params)
                    .map(Self::Progress)
                    .map_err(|e| Error::protocol(format!("invalid progress params: {e}")))
            }
            Some(method) => match object.remove("id") {
                Some(id) if !id.is_null() => Ok(Self::Request { id, method }),
                _ => Ok(Self::Notification {
                    method,
                    params: object.remove("params"),
                }),
            },
            None if object.contains_key("id") => Response::from_object(object).map(Self::Response),
            None => Err(Error::protocol("payload has neither id nor method")),
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A JSON-RPC response.
///
/// # Format
///
/// ```json
/// { "jsonrpc": "2.0", "id": 1, "result": { ... } }
/// { "jsonrpc": "2.0", "id": 1, "error": { "code": -32601, "message": "..." } }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    /// Raw id as sent by the remote.
    pub id: Value,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error object (if error).
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Response {
    fn from_object(object: Map<String, Value>) -> Result<Self> {
        Self::deserialize(Value::Object(object))
            .map_err(|e| Error::protocol(format!("invalid response: {e}")))
    }

    /// Returns the id if it is one this client could have issued.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        RequestId::from_json(&self.id)
    }

    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Converts into the settlement outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the response carries an error object.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// RpcError
// ============================================================================

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcError {
    /// Error code.
    #[serde(default)]
    pub code: i64,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Optional structured data.
    #[serde(default)]
    pub data: Option<Value>,
}

impl From<RpcError> for Error {
    fn from(error: RpcError) -> Self {
        Self::remote(error.code, error.message, error.data)
    }
}

// ============================================================================
// ProgressParams
// ============================================================================

/// Params of a `notifications/progress` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    /// Token identifying the owning request.
    #[serde(deserialize_with = "deserialize_token")]
    pub progress_token: ProgressToken,

    /// Work done so far.
    #[serde(default)]
    pub progress: f64,

    /// Total work, if known.
    #[serde(default)]
    pub total: Option<f64>,

    /// Human-readable status.
    #[serde(default)]
    pub message: Option<String>,
}

fn deserialize_token<'de, D>(deserializer: D) -> std::result::Result<ProgressToken, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    ProgressToken::from_json(&value)
        .ok_or_else(|| serde::de::Error::custom("progressToken must be a string or number"))
}

// ============================================================================
// Tests
// ============================================================================
