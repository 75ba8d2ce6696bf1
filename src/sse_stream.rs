//! Server-sent event framing over a streamed HTTP body.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use memchr::memmem;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use crate::Error;

/// Default upper bound on an unterminated event. Gemini sends inline images
/// as single frames, so this has to hold several megabytes of base64.
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 32 * 1024 * 1024;

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SseEvent {
    /// The `event:` field, when present. Anthropic names every event this way.
    pub event_type: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event_type: None,
            data: data.into(),
        }
    }

    /// OpenAI terminates its streams with a literal `[DONE]` payload.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }

    fn parse(block: &str) -> Option<Self> {
        let mut event_type = None;
        let mut data: Option<String> = None;

        for line in block.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => event_type = Some(value.to_string()),
                "data" => match data.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                },
                _ => {}
            }
        }

        data.map(|data| Self { event_type, data })
    }
}

/// Splits a byte stream into [`SseEvent`]s.
///
/// Bytes are buffered until a blank line closes an event, so events and
/// multi-byte characters may straddle chunk boundaries.
pub struct SseStream<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: VecDeque<SseEvent>,
    finder: memmem::Finder<'static>,
    max_buffered_bytes: usize,
    finished: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finder: memmem::Finder::new(b"\n\n"),
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            finished: false,
        }
    }

    /// Limit how many bytes of a single unterminated event may be buffered.
    pub fn with_max_buffered_bytes(mut self, max_buffered_bytes: usize) -> Self {
        self.max_buffered_bytes = max_buffered_bytes;
        self
    }

    /// Report `error` and end the stream.
    fn fail(&mut self, error: Error) -> Poll<Option<Result<SseEvent, Error>>> {
        self.finished = true;
        self.buffer.clear();
        Poll::Ready(Some(Err(error)))
    }

    fn extend(&mut self, chunk: &[u8]) {
        // CRLF framing is folded into LF framing; raw CR never appears inside JSON payloads.
        self.buffer.extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));
    }

    fn drain_events(&mut self) -> Result<(), Error> {
        let mut start = 0;
        while let Some(offset) = self.finder.find(&self.buffer[start..]) {
            let end = start + offset;
            let block = std::str::from_utf8(&self.buffer[start..end])
                .map_err(|e| Error::streaming(format!("invalid UTF-8 in event: {e}")))?;
            if let Some(event) = SseEvent::parse(block) {
                self.pending.push_back(event);
            }
            start = end + 2;
        }
        self.buffer.drain(..start);
        Ok(())
    }

    fn flush_tail(&mut self) -> Option<SseEvent> {
        let tail = std::mem::take(&mut self.buffer);
        let text = std::str::from_utf8(&tail).ok()?.trim();
        if text.is_empty() {
            return None;
        }
        let event = SseEvent::parse(text);
        if event.is_none() {
            tracing::warn!(bytes = tail.len(), "discarding trailing stream bytes");
        }
        event
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<Error>,
{
    type Item = Result<SseEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    self.extend(&chunk);
                    if let Err(e) = self.drain_events() {
                        return self.fail(e);
                    }
                    // Only the unterminated remainder counts against the limit.
                    if self.buffer.len() > self.max_buffered_bytes {
                        let message = format!(
                            "event exceeded maximum buffered size of {} bytes",
                            self.max_buffered_bytes
                        );
                        return self.fail(Error::streaming(message));
                    }
                }
                Some(Err(e)) => return self.fail(e.into()),
                // A final event may arrive without its blank-line terminator.
                None => {
                    self.finished = true;
                    return Poll::Ready(self.flush_tail().map(Ok));
                }
            }
        }
    }
}

/// Extension trait to add SSE parsing to byte streams.
pub trait SseStreamExt: Stream {
    fn sse_events(self) -> SseStream<Self>
    where
        Self: Sized,
    {
        SseStream::new(self)
    }
}

impl<S: Stream> SseStreamExt for S {}
