//! Incremental decoder for streamed chat-completion records.
//!
//! The upstream sends one JSON record per line, either framed as
//! Server-Sent Events (`data: {...}`) or as bare newline-delimited JSON.
//! Each record carries zero or more choices; the first choice may hold a
//! content delta and/or a finish marker. `data: [DONE]` closes the stream.
//!
//! The decoder is single-pass. Its only state is the unconsumed tail of the
//! byte stream, and once it has reported the end of the stream (or an
//! error) it keeps reporting the end.

use crate::error::DecodeError;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt;

/// Largest line the decoder will buffer while waiting for a newline.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

const DONE_SENTINEL: &str = "[DONE]";

/// One piece of newly generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    pub text: String,
}

impl StreamFragment {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

enum Line {
    Skip,
    Done,
    Record(CompletionChunk),
}

/// What a single record contributes to the stream.
enum Step {
    Continue,
    Fragment(StreamFragment),
    FragmentThenEnd(StreamFragment),
    End,
}

/// Decodes a completion byte stream into [`StreamFragment`]s.
pub struct ChunkDecoder<S> {
    stream: S,
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    finished: bool,
}

impl<S, E> ChunkDecoder<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            scanned: 0,
            finished: false,
        }
    }

    /// Returns the next non-empty fragment.
    ///
    /// `Ok(None)` means the stream has ended, either through `[DONE]`, a
    /// finish marker, or the upstream closing the body on a record boundary.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for malformed, oversized or truncated
    /// records and for transport failures. After an error the decoder is
    /// finished.
    pub async fn next(&mut self) -> Result<Option<StreamFragment>, DecodeError> {
        loop {
            if self.finished {
                return Ok(None);
            }

            while let Some(line) = self.take_line() {
                let step = decode_line(&line).inspect_err(|_| self.finished = true)?;
                if let Some(result) = self.apply(step) {
                    return Ok(result);
                }
            }

            if self.buffer.len() > MAX_RECORD_BYTES {
                self.finished = true;
                return Err(DecodeError::RecordTooLarge {
                    limit: MAX_RECORD_BYTES,
                });
            }

            match self.stream.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(DecodeError::Transport {
                        reason: e.to_string(),
                    });
                }
                None => return self.finish_tail(),
            }
        }
    }

    /// Handles whatever is left once the byte stream closes.
    fn finish_tail(&mut self) -> Result<Option<StreamFragment>, DecodeError> {
        self.finished = true;
        self.scanned = 0;
        let tail = std::mem::take(&mut self.buffer);
        if tail.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        match decode_line(&tail) {
            Ok(step) => Ok(self.apply(step).flatten()),
            Err(_) => Err(DecodeError::Truncated {
                pending_bytes: tail.len(),
            }),
        }
    }

    /// Removes the next complete line from the buffer, without its line
    /// terminator.
    fn take_line(&mut self) -> Option<BytesMut> {
        let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') else {
            self.scanned = self.buffer.len();
            return None;
        };

        let mut line = self.buffer.split_to(self.scanned + offset + 1);
        self.scanned = 0;
        line.truncate(line.len() - 1);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(line)
    }

    /// Applies a step; `Some` means the caller should return it.
    fn apply(&mut self, step: Step) -> Option<Option<StreamFragment>> {
        match step {
            Step::Continue => None,
            Step::Fragment(fragment) => Some(Some(fragment)),
            Step::FragmentThenEnd(fragment) => {
                self.finished = true;
                Some(Some(fragment))
            }
            Step::End => {
                self.finished = true;
                Some(None)
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> Result<Step, DecodeError> {
    let line = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)?;
    match parse_line(line)? {
        Line::Skip => Ok(Step::Continue),
        Line::Done => Ok(Step::End),
        Line::Record(record) => record_step(record),
    }
}

fn parse_line(line: &str) -> Result<Line, DecodeError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(Line::Skip);
    }

    let payload = if let Some(data) = line.strip_prefix("data:") {
        data.trim_start()
    } else if ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
    {
        return Ok(Line::Skip);
    } else {
        line
    };

    if payload == DONE_SENTINEL {
        return Ok(Line::Done);
    }

    serde_json::from_str(payload)
        .map(Line::Record)
        .map_err(|e| DecodeError::MalformedRecord {
            reason: e.to_string(),
        })
}

fn record_step(record: CompletionChunk) -> Result<Step, DecodeError> {
    if let Some(error) = record.error {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map_or_else(|| error.to_string(), str::to_string);
        return Err(DecodeError::UpstreamReported { message });
    }

    let Some(choice) = record.choices.into_iter().next() else {
        return Ok(Step::Continue);
    };

    let text = choice.delta.content.unwrap_or_default();
    let finished = choice.finish_reason.is_some();

    Ok(match (text.is_empty(), finished) {
        (true, false) => Step::Continue,
        (true, true) => Step::End,
        (false, false) => Step::Fragment(StreamFragment::new(text)),
        (false, true) => Step::FragmentThenEnd(StreamFragment::new(text)),
    })
}
