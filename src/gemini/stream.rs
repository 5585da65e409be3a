//! Server-sent-events decoding for `streamGenerateContent?alt=sse`.
//!
//! The response body arrives as arbitrary byte chunks. Lines are reassembled
//! across chunk boundaries before UTF-8 decoding, then every `data:` line is
//! parsed as a JSON event and its text extracted. Lines that are not valid
//! events are skipped without aborting the stream.

use std::collections::VecDeque;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tracing::debug;

use super::types::GenerateContentResponse;
use crate::error::{GeminiError, GeminiResult};

/// Boxed stream of text fragments produced by one transport attempt.
pub type FragmentStream = BoxStream<'static, GeminiResult<String>>;

/// Incremental line splitter for an SSE byte feed.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
    /// Bytes before this offset are known to hold no newline.
    scanned: usize,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the text of every complete event line it closed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut texts = Vec::new();
        let mut start = 0;
        for pos in self.buffer[self.scanned..]
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .map(|(i, _)| self.scanned + i)
        {
            let line = &self.buffer[start..=pos];
            if let Some(text) = parse_event_line(&String::from_utf8_lossy(line)) {
                texts.push(text);
            }
            start = pos + 1;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        texts
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        parse_event_line(&String::from_utf8_lossy(&line))
    }
}

/// Extract the text of a single SSE line, if it is a well-formed data event.
pub fn parse_event_line(line: &str) -> Option<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?.trim_start();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<GenerateContentResponse>(data) {
        Ok(event) => event
            .text()
            .filter(|text| !text.is_empty())
            .map(String::from),
        Err(e) => {
            debug!(error = %e, "Skipping malformed stream event");
            None
        }
    }
}

struct SseState<S> {
    body: S,
    decoder: SseLineDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turn a response byte stream into a stream of text fragments.
///
/// A body read error is yielded once and ends the stream.
pub fn text_fragments<S, B, E>(body: S, map_err: fn(E) -> GeminiError) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
{
    let state = SseState {
        body,
        decoder: SseLineDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, move |mut st| async move {
        loop {
            if let Some(text) = st.pending.pop_front() {
                return Some((Ok(text), st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let texts = st.decoder.push(chunk.as_ref());
                    st.pending.extend(texts);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(map_err(e)), st));
                }
                None => {
                    st.finished = true;
                    st.pending.extend(st.decoder.finish());
                }
            }
        }
    })
    .boxed()
}
