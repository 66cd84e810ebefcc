//! Incremental decoder for newline-delimited JSON generate responses.
//!
//! The decoder owns every byte that has arrived but not yet been terminated by
//! a newline. Each call to [`NdjsonDecoder::push`] appends a chunk and returns
//! the events for every record completed by it, so the emitted sequence never
//! depends on where the transport happened to split the body.

use memchr::memchr;
use tracing::debug;

use crate::api::GenerateRecord;
use crate::core::chat_stream::{StreamEvent, StreamFailure};

/// Upper bound on unterminated bytes held while waiting for a newline.
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 1024 * 1024;

enum Classified {
    Skip,
    Event(StreamEvent),
}

fn classify_record(record: &[u8]) -> Classified {
    let record = record.trim_ascii();
    if record.is_empty() {
        return Classified::Skip;
    }

    match serde_json::from_slice::<GenerateRecord>(record) {
        Ok(parsed) => match parsed.error_message() {
            Some(message) => Classified::Event(StreamFailure::Upstream(message).into()),
            None => Classified::Event(StreamEvent::Token {
                text: parsed.response,
                is_final: parsed.done,
            }),
        },
        Err(err) => Classified::Event(StreamFailure::MalformedRecord(err.to_string()).into()),
    }
}

#[derive(Debug)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched without finding a newline.
    scanned: usize,
    max_buffered: usize,
    terminated: bool,
}

impl Default for NdjsonDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_BUFFERED_BYTES)
    }

    pub fn with_limit(max_buffered: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_buffered,
            terminated: false,
        }
    }

    /// True once an error record, a malformed record, or an oversized
    /// fragment has ended decoding for this connection.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Append `chunk` and decode every record it completes.
    ///
    /// A terminal event is always the last element of the returned vector;
    /// after it the decoder discards its buffer and ignores further input.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.terminated {
            return events;
        }

        self.buffer.extend_from_slice(chunk);

        let mut cursor = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = memchr(b'\n', &self.buffer[search_from..]) {
            let end = search_from + offset;
            let classified = classify_record(&self.buffer[cursor..end]);
            cursor = end + 1;
            search_from = cursor;

            if let Classified::Event(event) = classified {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    self.terminate();
                    return events;
                }
            }
        }
        self.buffer.drain(..cursor);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_buffered {
            debug!(
                buffered = self.buffer.len(),
                limit = self.max_buffered,
                "unterminated record exceeded buffer limit"
            );
            events.push(
                StreamFailure::RecordTooLarge {
                    limit: self.max_buffered,
                }
                .into(),
            );
            self.terminate();
        }

        events
    }

    /// Flush the trailing unterminated record once the body has closed.
    ///
    /// A fragment that does not parse is treated as an artifact of the
    /// connection closing mid-record and yields nothing.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.terminated {
            return None;
        }
        let trailing = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        self.terminated = true;

        let record = trailing.trim_ascii();
        if record.is_empty() {
            return None;
        }

        match serde_json::from_slice::<GenerateRecord>(record) {
            Ok(parsed) => Some(match parsed.error_message() {
                Some(message) => StreamFailure::Upstream(message).into(),
                None => StreamEvent::Token {
                    text: parsed.response,
                    is_final: parsed.done,
                },
            }),
            Err(err) => {
                debug!(bytes = record.len(), error = %err, "dropping partial trailing record");
                None
            }
        }
    }

    fn terminate(&mut self) {
        self.terminated = true;
        self.buffer = Vec::new();
        self.scanned = 0;
    }
}
