//! Outbound command path.
//!
//! Commands are arbitrary text (typically MicroPython source to execute
//! on the device) terminated by CRLF, or single raw control bytes for
//! REPL-level interrupts (CTRL-A=1 ... CTRL-Z=26, so CTRL-D soft-resets
//! the board). All writes funnel through the transport's writer lock;
//! a second caller waits for the first write to complete rather than
//! interleaving bytes mid-command.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::protocol::COMMAND_TERMINATOR;
use crate::transport::Transport;

/// Computes the control byte for a letter: `CTRL-A` = 1 ... `CTRL-Z` = 26.
///
/// Lowercase input is uppercased first, so `d` and `D` both map to 4.
///
/// # Errors
///
/// Returns [`Error::InvalidControlCode`] for non-ASCII-alphabetic input.
pub fn control_code(letter: char) -> Result<u8> {
    if !letter.is_ascii_alphabetic() {
        return Err(Error::InvalidControlCode { letter });
    }
    Ok(letter.to_ascii_uppercase() as u8 - b'A' + 1)
}

/// Serialized write path to the device.
pub struct CommandWriter<T> {
    transport: Arc<Mutex<T>>,
}

impl<T: Transport> CommandWriter<T> {
    /// Creates a new command writer over a shared transport.
    #[must_use]
    pub fn new(transport: Arc<Mutex<T>>) -> Self {
        Self { transport }
    }

    /// Writes raw bytes to the device.
    ///
    /// The transport's write lock is held for the duration of the write
    /// and released on every exit path, success or failure.
    pub async fn write_bytes(&self, data: Bytes) -> Result<()> {
        let mut transport = self.transport.lock().await;
        transport.send(data).await
    }

    /// Writes UTF-8 text without a terminator.
    pub async fn write(&self, text: &str) -> Result<()> {
        self.write_bytes(Bytes::copy_from_slice(text.as_bytes()))
            .await
    }

    /// Writes a command line, appending the CRLF terminator the device
    /// firmware expects.
    pub async fn write_line(&self, text: &str) -> Result<()> {
        let mut buf = BytesMut::with_capacity(text.len() + COMMAND_TERMINATOR.len());
        buf.put_slice(text.as_bytes());
        buf.put_slice(COMMAND_TERMINATOR.as_bytes());
        self.write_bytes(buf.freeze()).await
    }

    /// Writes a single control byte, unterminated.
    pub async fn write_control_code(&self, letter: char) -> Result<()> {
        let code = control_code(letter)?;
        tracing::debug!(letter = %letter, code, "sending control code");
        self.write_bytes(Bytes::copy_from_slice(&[code])).await
    }
}
