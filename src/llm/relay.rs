//! Relay from a provider response to the caller.
//!
//! A streamed completion is reduced to its text deltas and re-emitted as a
//! plain byte stream. Anything that is not a stream is treated as an error
//! body: it is redacted and wrapped in a fenced `json` block for display.

use std::borrow::Cow;
use std::pin::Pin;
use std::sync::LazyLock;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use regex::Regex;

use super::sse::SseParser;

/// Data payload that terminates a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

static CREDENTIAL_ECHO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"provided:.*. You").expect("credential redaction pattern"));

/// Errors that terminate a relayed stream.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The upstream byte stream failed mid-response.
    #[error("Upstream stream error: {0}")]
    Upstream(String),

    /// An event payload was not a completion chunk.
    #[error("Malformed stream event: {0}")]
    Malformed(String),
}

/// What a single event-stream payload means to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Text to forward; empty for role-only and finish chunks.
    Delta(String),
    /// The terminal sentinel.
    Done,
    /// The payload could not be interpreted.
    Malformed(String),
}

impl RelayEvent {
    /// Interpret the `data` of one event.
    pub fn from_data(data: &str) -> Self {
        if data == DONE_SENTINEL {
            return Self::Done;
        }

        let chunk: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return Self::Malformed(e.to_string()),
        };

        let Some(delta) = chunk
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
        else {
            return Self::Malformed("missing choices[0].delta".to_string());
        };

        match delta.get("content") {
            None | Some(serde_json::Value::Null) => Self::Delta(String::new()),
            Some(serde_json::Value::String(text)) => Self::Delta(text.clone()),
            Some(other) => Self::Malformed(format!("non-text delta content: {other}")),
        }
    }
}

/// Byte stream of response text handed back to the caller.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>;

/// Outcome of relaying a provider response.
pub enum Relayed {
    /// The provider did not stream; a displayable error block.
    ErrorBlock(String),
    /// Incremental response text.
    Stream(TextStream),
}

impl std::fmt::Debug for Relayed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ErrorBlock(block) => f.debug_tuple("ErrorBlock").field(block).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Hide credentials that provider error messages echo back.
pub fn redact(body: &str) -> Cow<'_, str> {
    CREDENTIAL_ECHO.replace(body, "provided: ***. You")
}

/// Wrap a non-stream provider body for display.
pub fn render_error_body(body: &str) -> String {
    format!("```json\n{}```", redact(body))
}

/// Relay a provider response.
///
/// Only a failure to read a non-stream body is an error here; stream
/// failures surface on the returned [`TextStream`].
pub async fn relay(resp: reqwest::Response) -> reqwest::Result<Relayed> {
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if !content_type.contains("stream") {
        let status = resp.status();
        let body = resp.text().await?;
        let block = render_error_body(&body);
        tracing::warn!(
            name: "relay.upstream_error",
            status = %status,
            content_type = %content_type,
            body = %redact(&body),
            "Upstream returned a non-stream response"
        );
        return Ok(Relayed::ErrorBlock(block));
    }

    Ok(Relayed::Stream(relay_stream(resp.bytes_stream())))
}

/// Reduce an event-stream byte stream to its text deltas.
///
/// The output ends right after the `[DONE]` event without reading further,
/// or when the upstream ends. A malformed event or a transport error ends it
/// with an error.
pub fn relay_stream<S, B, E>(upstream: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let out = async_stream::try_stream! {
        let mut decoder = Utf8Decoder::default();
        let mut parser = SseParser::new();
        let mut delta_count = 0usize;
        let mut done = false;

        futures::pin_mut!(upstream);
        'read: while let Some(chunk) = upstream.next().await {
            let chunk = chunk.map_err(|e| {
                tracing::error!(name: "relay.upstream_failed", error = %e, "Upstream stream failed");
                RelayError::Upstream(e.to_string())
            })?;
            parser.feed(&decoder.decode(chunk.as_ref()));

            for event in parser.by_ref() {
                match RelayEvent::from_data(&event.data) {
                    RelayEvent::Delta(text) => {
                        if !text.is_empty() {
                            delta_count += 1;
                            yield Bytes::from(text);
                        }
                    }
                    RelayEvent::Done => {
                        tracing::debug!(deltas = delta_count, "Upstream stream done");
                        done = true;
                        break 'read;
                    }
                    RelayEvent::Malformed(reason) => {
                        tracing::error!(name: "relay.malformed_event", reason = %reason, "Malformed stream event");
                        Err::<(), _>(RelayError::Malformed(reason))?;
                    }
                }
            }
        }

        if !done {
            let dropped = decoder.finish();
            tracing::debug!(
                deltas = delta_count,
                incomplete_utf8_bytes = dropped,
                "Upstream ended without [DONE]"
            );
        }
    };

    Box::pin(out)
}

/// Streaming UTF-8 decoder that keeps incomplete trailing sequences for the
/// next chunk. Invalid bytes decode to U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    if let Some(invalid_len) = e.error_len() {
                        out.push(char::REPLACEMENT_CHARACTER);
                        self.pending.drain(..valid + invalid_len);
                    } else {
                        self.pending.drain(..valid);
                        break;
                    }
                }
            }
        }

        out
    }

    /// Discard an incomplete trailing sequence, returning its length.
    fn finish(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
