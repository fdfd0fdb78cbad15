//! Delimiter-framed line decoding for serial responses.
//!
//! Bytes arrive in arbitrary chunks; a line is complete once the configured
//! delimiter has been seen. The delimiter itself is stripped, as is any
//! stray `\r`/`\n` left over from devices that terminate with `\r\n` when
//! the channel is configured for `\r` alone.

use bytes::{Buf, BytesMut};

/// Bytes of unterminated input kept before the buffer is discarded.
pub const MAX_LINE_LEN: usize = 4 * 1024;

#[derive(Debug)]
pub struct LineDecoder {
    delimiter: Vec<u8>,
    buf: BytesMut,
}

impl LineDecoder {
    /// A decoder splitting on `delimiter`. An empty delimiter falls back to
    /// `\r`.
    pub fn new(delimiter: &str) -> Self {
        let delimiter = if delimiter.is_empty() {
            b"\r".to_vec()
        } else {
            delimiter.as_bytes().to_vec()
        };
        Self {
            delimiter,
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Feed a chunk and return every line it completes, in order.
    ///
    /// Empty lines (back-to-back delimiters) are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = find(&self.buf, &self.delimiter) {
            let raw = self.buf.split_to(pos);
            self.buf.advance(self.delimiter.len());

            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_matches(|c| c == '\r' || c == '\n');
            if !line.is_empty() {
                lines.push(line.to_owned());
            }
        }

        if self.buf.len() > MAX_LINE_LEN {
            tracing::warn!(
                buffered = self.buf.len(),
                "no delimiter within {MAX_LINE_LEN} bytes, discarding input"
            );
            self.buf.clear();
        }

        lines
    }

    /// Bytes buffered without a delimiter yet.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
