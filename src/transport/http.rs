//! reqwest-backed transport.
//!
//! - `open` issues `GET` with `Accept: text/event-stream`.
//! - `send` issues `POST` with a JSON body. An event-stream reply is handed
//!   back as a [`ByteStream`]; a JSON reply is re-framed as a single
//!   `data:` frame so it travels the same path; an empty reply (`202
//!   Accepted`) yields `None`.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Message;

use super::{ByteStream, Transport};

// ============================================================================
// Constants
// ============================================================================

const EVENT_STREAM: &str = "text/event-stream";
const APPLICATION_JSON: &str = "application/json";
const POST_ACCEPT: &str = "application/json, text/event-stream";

// ============================================================================
// HttpTransport
// ============================================================================

/// HTTP transport with optional bearer authentication.
///
/// # Example
///
/// ```ignore
/// use mcp_stream_client::transport::HttpTransport;
///
/// let transport = HttpTransport::new().with_access_token("secret");
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
    access_token: Option<String>,
}

impl HttpTransport {
    /// Creates a transport with a default client.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport around an existing client.
    #[inline]
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            access_token: None,
        }
    }

    /// Sets the bearer token. An empty token disables authentication.
    #[inline]
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.access_token = (!token.is_empty()).then_some(token);
        self
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &Url) -> Result<ByteStream> {
        let request = self
            .authorize(self.client.get(url.clone()))
            .header(ACCEPT, EVENT_STREAM);

        let response = request
            .send()
            .await
            .map_err(|e| Error::connection(format!("SSE connection failed: {e}")))?;
        let response = check_status(response)?;

        debug!(%url, "Event stream opened");
        Ok(body_stream(response))
    }

    async fn send(&self, endpoint: &Url, message: &Message) -> Result<Option<ByteStream>> {
        let body = serde_json::to_vec(message)?;

        let request = self
            .authorize(self.client.post(endpoint.clone()))
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT, POST_ACCEPT)
            .body(body);

        let response = check_status(request.send().await?)?;
        trace!(method = message.method(), status = %response.status(), "Message posted");

        match content_type(&response) {
            Some(ct) if ct.starts_with(EVENT_STREAM) => Ok(Some(body_stream(response))),
            Some(ct) if ct.starts_with(APPLICATION_JSON) => {
                let body = response.bytes().await?;
                Ok(json_reply_stream(&body))
            }
            _ => Ok(None),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::http(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
        ))
    }
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase)
}

fn body_stream(response: Response) -> ByteStream {
    Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(Error::from)))
}

/// Wraps a plain JSON body as one `data:` frame.
///
/// Raw newlines in JSON are insignificant whitespace, so every body line
/// becomes its own `data:` line and concatenation restores the payload.
fn json_reply_stream(body: &[u8]) -> Option<ByteStream> {
    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        return None;
    }

    let frame = Bytes::from(frame_json(&text));
    Some(Box::pin(stream::once(async move { Ok(frame) })))
}

fn frame_json(text: &str) -> String {
    let mut frame = String::with_capacity(text.len() + 16);
    for line in text.lines() {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

// ============================================================================
// Tests
// ============================================================================
