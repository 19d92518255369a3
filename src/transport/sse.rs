//! Server-sent events decoder.
//!
//! [`SseDecoder`] is fed raw body chunks and yields complete
//! [`ServerEvent`]s. Lines may end in `\n`, `\r\n` or `\r`, and a chunk
//! boundary may fall anywhere, including between `\r` and `\n`.
//!
//! Field handling:
//! - `event:` sets the name of the pending event (default `message`)
//! - `data:` lines are joined with `\n`
//! - `id:` sets the last event id, which persists across events
//! - lines starting with `:` are comments; unknown fields are ignored
//! - a blank line dispatches the pending event if it has data
//! - a leading byte order mark is skipped

use std::collections::VecDeque;
use std::fmt;

use futures_util::{Stream, StreamExt, stream};

use super::EventStream;
use crate::domain::ServerEvent;
use crate::error::RealtimeError;

const DEFAULT_EVENT_NAME: &str = "message";

/// Longest incomplete line the decoder buffers before failing the stream.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Incremental decoder for a `text/event-stream` body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event_name: String,
    data: String,
    last_event_id: String,
    ready: VecDeque<ServerEvent>,
    past_first_line: bool,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a body chunk.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::TransportOpen`] if an unterminated line
    /// grows past [`MAX_LINE_BYTES`]. The partial line is discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), RealtimeError> {
        self.buffer.extend_from_slice(chunk);

        let mut offset = 0;
        while let Some((line_len, consumed)) =
            self.buffer.get(offset..).and_then(find_line_end)
        {
            let raw = self
                .buffer
                .get(offset..offset + line_len)
                .unwrap_or_default();
            let line = String::from_utf8_lossy(raw).into_owned();
            offset += consumed;

            if self.past_first_line {
                self.process_line(&line);
            } else {
                self.past_first_line = true;
                self.process_line(line.strip_prefix('\u{feff}').unwrap_or(&line));
            }
        }
        self.buffer.drain(..offset);

        if self.buffer.len() > MAX_LINE_BYTES {
            self.buffer.clear();
            return Err(RealtimeError::TransportOpen(format!(
                "event stream line exceeds {MAX_LINE_BYTES} bytes"
            )));
        }
        Ok(())
    }

    /// Pops the next complete event.
    pub fn next_event(&mut self) -> Option<ServerEvent> {
        self.ready.pop_front()
    }

    /// Returns the last event id seen on the stream.
    #[must_use]
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    fn process_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_name = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" if !value.contains('\0') => self.last_event_id = value.to_string(),
            _ => {}
        }
    }

    fn dispatch(&mut self) {
        let name = std::mem::take(&mut self.event_name);
        if self.data.is_empty() {
            return;
        }
        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        let name = if name.is_empty() {
            DEFAULT_EVENT_NAME.to_string()
        } else {
            name
        };
        self.ready
            .push_back(ServerEvent::new(name, self.last_event_id.clone(), data));
    }
}

/// Returns `(line length, bytes to consume)` for the first complete line.
///
/// A trailing lone `\r` is not complete yet: the next chunk may start
/// with its `\n`.
fn find_line_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let pos = buffer.iter().position(|b| *b == b'\n' || *b == b'\r')?;
    if buffer.get(pos) == Some(&b'\n') {
        return Some((pos, pos + 1));
    }
    match buffer.get(pos + 1) {
        Some(b'\n') => Some((pos, pos + 2)),
        Some(_) => Some((pos, pos + 1)),
        None => None,
    }
}

/// Decodes a byte-chunk body into an [`EventStream`].
///
/// A body error is yielded once as [`RealtimeError::TransportOpen`] and
/// ends the stream.
pub fn decode_event_stream<S, B, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = (Box::pin(body), SseDecoder::new(), false);
    Box::pin(stream::unfold(
        state,
        |(mut body, mut decoder, failed)| async move {
            if failed {
                return None;
            }
            loop {
                if let Some(event) = decoder.next_event() {
                    return Some((Ok(event), (body, decoder, false)));
                }
                let pushed = match body.next().await {
                    Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
                    Some(Err(err)) => Err(RealtimeError::TransportOpen(format!(
                        "event stream error: {err}"
                    ))),
                    None => return None,
                };
                if let Err(err) = pushed {
                    return Some((Err(err), (body, decoder, true)));
                }
            }
        },
    ))
}
