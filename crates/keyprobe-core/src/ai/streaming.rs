//! Streaming Response Handling
//!
//! Chat replies arrive as Server-Sent Events. This module splits the raw byte
//! stream into events, lets each provider turn events into text fragments, and
//! offers a few combinators over the resulting [`ChatStream`].

use futures::{Stream, StreamExt};
use keyprobe_shared::{KeyprobeError, Result};
use std::pin::Pin;
use tracing::{debug, trace, warn};

/// A streamed chat reply: text fragments in arrival order, finite and not restartable
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A single Server-Sent Event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if the server sent one
    pub event: Option<String>,

    /// All `data:` lines of the event joined with `\n`
    pub data: String,
}

/// Incremental SSE parser.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences and events split across network chunks are handled.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk, returning every event it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }

        events
    }

    /// Flush whatever is pending once the body has ended
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }

        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }

        // Comment line
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => trace!("Ignoring SSE field: {}", field),
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event, data })
    }
}

/// Turn a stream of body chunks into a stream of SSE events.
///
/// A transport error is yielded once and ends the stream.
pub fn decode_sse<S, B>(body: S) -> impl Stream<Item = Result<SseEvent>> + Send
where
    S: Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    async_stream::stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.push(chunk.as_ref()) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        if let Some(event) = decoder.finish() {
            yield Ok(event);
        }
    }
}

/// What a provider makes of a single SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamControl {
    /// A text fragment to hand to the caller
    Text(String),
    /// Nothing to emit (pings, metadata, empty deltas)
    Skip,
    /// The provider signalled the end of the reply
    Done,
}

/// Build a [`ChatStream`] from SSE events and a provider-specific interpreter.
///
/// Empty fragments are dropped. The first error, from the transport or the
/// interpreter, is yielded and ends the stream.
pub fn text_stream<S, F>(events: S, mut interpret: F) -> ChatStream
where
    S: Stream<Item = Result<SseEvent>> + Send + 'static,
    F: FnMut(&SseEvent) -> Result<StreamControl> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut events = Box::pin(events);

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            match interpret(&event) {
                Ok(StreamControl::Text(text)) => {
                    if !text.is_empty() {
                        yield Ok(text);
                    }
                }
                Ok(StreamControl::Skip) => {}
                Ok(StreamControl::Done) => return,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    })
}

/// Utilities for streaming operations
pub struct StreamUtils;

impl StreamUtils {
    /// Drain a stream into a single string, stopping at the first error
    pub async fn collect_text(mut stream: ChatStream) -> Result<String> {
        let mut result = String::new();

        while let Some(chunk) = stream.next().await {
            result.push_str(&chunk?);
        }

        Ok(result)
    }

    /// Log streaming progress
    pub fn with_logging(stream: ChatStream, prefix: &str) -> ChatStream {
        let prefix = prefix.to_string();
        let stream = stream.inspect(move |chunk| match chunk {
            Ok(text) => debug!("{}: Received {} chars", prefix, text.len()),
            Err(e) => warn!("{}: Stream error: {}", prefix, e),
        });

        Box::pin(stream)
    }
}

/// Parse an SSE payload as JSON, reporting vendor error objects as errors
pub(crate) fn parse_event_json<T: serde::de::DeserializeOwned>(
    provider: keyprobe_shared::ProviderId,
    data: &str,
) -> Result<T> {
    if let Some(message) = keyprobe_shared::extract_error_message(data) {
        return Err(KeyprobeError::unexpected(provider, message));
    }

    serde_json::from_str(data).map_err(|e| {
        KeyprobeError::unexpected(provider, format!("malformed stream event: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>>> + Send + 'static {
        let owned: Vec<Result<Vec<u8>>> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    #[test]
    fn test_decoder_splits_events() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"event: ping\ndata: {}\n\ndata: one\ndata: two\n\n");

        assert_eq!(
            events,
            vec![
                SseEvent { event: Some("ping".to_string()), data: "{}".to_string() },
                SseEvent { event: None, data: "one\ntwo".to_string() },
            ]
        );
    }

    #[test]
    fn test_decoder_handles_split_chunks_and_crlf() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert!(decoder.push(b":1}\r\n").is_empty());
        let events = decoder.push(b"\r\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"a\":1}");
    }

    #[test]
    fn test_decoder_keeps_multibyte_characters() {
        let text = "data: héllo\n\n".as_bytes();
        let (head, tail) = text.split_at(8); // inside the two-byte 'é'

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(head).is_empty());
        let events = decoder.push(tail);

        assert_eq!(events[0].data, "héllo");
    }

    #[test]
    fn test_decoder_ignores_comments_and_flushes_tail() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b": keep-alive\n\ndata: last").is_empty());

        let event = decoder.finish().unwrap();
        assert_eq!(event.data, "last");
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn test_decode_sse_stream() {
        let events: Vec<SseEvent> = decode_sse(chunks(&["data: a\n", "\ndata: b\n\n"]))
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].data, "b");
    }

    #[tokio::test]
    async fn test_text_stream_stops_at_done() {
        let events = decode_sse(chunks(&["data: Hello\n\ndata: \n\ndata: world\n\ndata: [DONE]\n\ndata: late\n\n"]));
        let stream = text_stream(events, |event| {
            Ok(match event.data.as_str() {
                "[DONE]" => StreamControl::Done,
                text => StreamControl::Text(text.to_string()),
            })
        });

        let collected: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(collected, vec!["Hello", "world"]);
    }

    #[tokio::test]
    async fn test_text_stream_ends_after_error() {
        let events = decode_sse(chunks(&["data: ok\n\ndata: bad\n\ndata: never\n\n"]));
        let stream = text_stream(events, |event| {
            if event.data == "bad" {
                Err(KeyprobeError::unexpected(keyprobe_shared::ProviderId::OpenAI, "boom"))
            } else {
                Ok(StreamControl::Text(event.data.clone()))
            }
        });

        let items: Vec<Result<String>> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_collect_text() {
        let chunks = vec!["Hello", ", ", "world"];
        let stream: ChatStream = Box::pin(stream::iter(chunks.into_iter().map(|s| Ok(s.to_string()))));

        assert_eq!(StreamUtils::collect_text(stream).await.unwrap(), "Hello, world");
    }
}
