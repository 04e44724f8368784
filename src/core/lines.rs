// LogWarden - core/lines.rs
//
// Turns a sequence of byte chunks into a lazy sequence of complete UTF-8
// lines. Multi-byte characters split across chunk boundaries are carried
// over and decoded once the next chunk arrives. Two caps bound memory:
// undecodable carry-over bytes and unterminated text.
//
// The sequence is forward-only: after the first error it is exhausted.

use crate::util::constants;
use crate::util::error::{LineError, StreamError};
use std::collections::VecDeque;

/// Memory bounds for line assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLimits {
    /// Undecodable trailing bytes carried across a chunk boundary.
    pub max_pending_bytes: usize,
    /// Text accumulated without a line terminator.
    pub max_line_bytes: usize,
}

impl Default for LineLimits {
    fn default() -> Self {
        Self {
            max_pending_bytes: constants::DEFAULT_MAX_PENDING_BYTES,
            max_line_bytes: constants::DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Line iterator over a chunk source.
///
/// Yields each line without its `\n` (and without a trailing `\r`). Text after
/// the last terminator is yielded as a final line at end of stream. A leading
/// byte order mark is dropped.
///
/// [`SafeLineAssembler::counted`] also reports how many source bytes each
/// line occupied, so callers can enforce byte caps on the raw input.
pub struct SafeLineAssembler<I> {
    chunks: I,
    limits: LineLimits,
    /// Bytes of an incomplete character waiting for the next chunk.
    pending: Vec<u8>,
    /// Decoded text not yet terminated by `\n`.
    partial: String,
    /// Source bytes not yet charged to a line (the byte order mark).
    uncharged: u64,
    /// Lines with their source length: text, `\r` and `\n` included.
    ready: VecDeque<(String, u64)>,
    /// Error to surface once the lines decoded before it are drained.
    failed: Option<LineError>,
    /// Bytes decoded so far; used to locate encoding errors.
    offset: u64,
    at_start: bool,
    done: bool,
}

impl<I> SafeLineAssembler<I>
where
    I: Iterator<Item = Result<Vec<u8>, StreamError>>,
{
    pub fn new(chunks: I, limits: LineLimits) -> Self {
        Self {
            chunks,
            limits,
            pending: Vec::new(),
            partial: String::new(),
            uncharged: 0,
            ready: VecDeque::new(),
            failed: None,
            offset: 0,
            at_start: true,
            done: false,
        }
    }

    /// Number of bytes successfully decoded so far.
    pub fn bytes_decoded(&self) -> u64 {
        self.offset
    }

    /// Yield `(line, source_bytes)` pairs instead of bare lines.
    pub fn counted(self) -> CountedLines<I> {
        CountedLines { inner: self }
    }

    fn fail(&mut self, error: LineError) {
        self.done = true;
        self.failed = Some(error);
    }

    fn push_chunk(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }

        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        match std::str::from_utf8(&buf) {
            Ok(text) => {
                self.offset += buf.len() as u64;
                self.push_text(text);
            }
            Err(e) => {
                let valid = e.valid_up_to();
                if let Ok(text) = std::str::from_utf8(&buf[..valid]) {
                    self.push_text(text);
                }
                self.offset += valid as u64;
                if self.failed.is_some() {
                    return;
                }

                match e.error_len() {
                    // Invalid bytes in the middle of the input, or a carried
                    // prefix that the new chunk did not complete.
                    Some(len) => {
                        let bytes = buf[valid..valid + len].to_vec();
                        tracing::debug!(offset = self.offset, ?bytes, "Invalid UTF-8 sequence");
                        self.fail(LineError::InvalidEncoding {
                            offset: self.offset,
                            bytes,
                        });
                        return;
                    }
                    // The chunk ends inside a character.
                    None => {
                        let tail = &buf[valid..];
                        if tail.len() > self.limits.max_pending_bytes {
                            self.fail(LineError::PendingOverflow {
                                pending: tail.len(),
                                limit: self.limits.max_pending_bytes,
                            });
                            return;
                        }
                        self.pending = tail.to_vec();
                    }
                }
            }
        }

        if self.failed.is_none() && self.partial.len() > self.limits.max_line_bytes {
            self.fail(LineError::LineTooLong {
                length: self.partial.len(),
                limit: self.limits.max_line_bytes,
            });
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let text = if self.at_start {
            self.at_start = false;
            match text.strip_prefix(constants::BYTE_ORDER_MARK) {
                Some(stripped) => {
                    self.uncharged += constants::BYTE_ORDER_MARK.len_utf8() as u64;
                    stripped
                }
                None => text,
            }
        } else {
            text
        };

        let mut rest = text;
        while let Some(pos) = rest.find('\n') {
            if self.failed.is_some() {
                return;
            }
            let (head, tail) = rest.split_at(pos);
            if self.partial.len() + head.len() > self.limits.max_line_bytes {
                self.fail(LineError::LineTooLong {
                    length: self.partial.len() + head.len(),
                    limit: self.limits.max_line_bytes,
                });
                return;
            }
            let mut line = std::mem::take(&mut self.partial);
            line.push_str(head);
            self.emit(line, 1);
            rest = &tail[1..];
        }
        self.partial.push_str(rest);
    }

    fn finish(&mut self) {
        self.done = true;
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.emit(line, 0);
        }
        if !self.pending.is_empty() {
            self.failed = Some(LineError::InvalidEncoding {
                offset: self.offset,
                bytes: std::mem::take(&mut self.pending),
            });
        }
    }

    /// Queue a line; `terminator` is the length of the `\n` that ended it.
    fn emit(&mut self, line: String, terminator: u64) {
        let raw = std::mem::take(&mut self.uncharged) + line.len() as u64 + terminator;
        self.ready.push_back((strip_cr(line), raw));
    }

    fn next_counted(&mut self) -> Option<Result<(String, u64), LineError>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Some(Ok(line));
            }
            if let Some(error) = self.failed.take() {
                return Some(Err(error));
            }
            if self.done {
                return None;
            }
            match self.chunks.next() {
                Some(Ok(chunk)) => self.push_chunk(&chunk),
                Some(Err(e)) => self.fail(LineError::Source(e)),
                None => self.finish(),
            }
        }
    }
}

fn strip_cr(mut line: String) -> String {
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

impl<I> Iterator for SafeLineAssembler<I>
where
    I: Iterator<Item = Result<Vec<u8>, StreamError>>,
{
    type Item = Result<String, LineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_counted().map(|r| r.map(|(line, _)| line))
    }
}

/// Lines paired with the number of source bytes they occupied.
pub struct CountedLines<I> {
    inner: SafeLineAssembler<I>,
}

impl<I> Iterator for CountedLines<I>
where
    I: Iterator<Item = Result<Vec<u8>, StreamError>>,
{
    type Item = Result<(String, u64), LineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next_counted()
    }
}

// =============================================================================
// Tests
// =============================================================================
