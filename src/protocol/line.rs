//! Line decoding for the device's text protocol.
//!
//! The device writes newline-delimited UTF-8 text, but the serial layer
//! delivers arbitrary byte chunks. The decoder accumulates raw bytes and
//! only decodes once a full line is available, so a multibyte character
//! split across chunk boundaries is reassembled instead of being decoded
//! into replacement characters.

use bytes::{Buf, BytesMut};

/// Line delimiter on the wire.
const LINE_DELIMITER: u8 = b'\n';

/// Decoder that turns a byte stream into trimmed text lines.
///
/// Bytes after the last delimiter are retained as the undelivered partial
/// line until more data arrives.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
}

impl LineDecoder {
    /// Creates a new line decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Feeds a chunk of raw bytes into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extracts the next complete line, if one is buffered.
    ///
    /// The returned line is decoded as UTF-8 (invalid sequences become
    /// replacement characters) and trimmed of surrounding whitespace,
    /// which also strips the `\r` of CRLF-terminated lines. Empty lines
    /// are yielded like any other line; filtering is the parser's call.
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self
            .buffer
            .iter()
            .position(|&byte| byte == LINE_DELIMITER)?;

        let raw = self.buffer.split_to(newline);
        self.buffer.advance(1); // consume the delimiter

        Some(String::from_utf8_lossy(&raw).trim().to_owned())
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
