//! Serial/USB transport implementation.
//!
//! This module provides serial port communication for MicroPython
//! devices connected via USB.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::error::{Error, Result};
use crate::protocol::LineDecoder;
use crate::transport::Transport;

/// Baud rate expected by the device firmware. A compatibility contract,
/// not a tunable.
pub const BAUD_RATE: u32 = 115_200;

/// Serial transport speaking the device's line protocol.
///
/// Uses split read/write halves so the read loop and writers never
/// contend for the stream itself. The write half sits behind a mutex;
/// holding it for the duration of one write is the acquire/release
/// discipline that keeps concurrent commands from interleaving.
#[derive(Default)]
pub struct SerialTransport {
    writer: Option<Arc<Mutex<WriteHalf<SerialStream>>>>,
    reader: Option<ReadHalf<SerialStream>>,
    decoder: LineDecoder,
}

impl SerialTransport {
    /// Creates a new, unconnected serial transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the reader half for use in a background task.
    ///
    /// This can only be called once after connecting.
    pub fn take_reader(&mut self) -> Option<ReadHalf<SerialStream>> {
        self.reader.take()
    }

    /// Gets the line decoder.
    pub fn decoder_mut(&mut self) -> &mut LineDecoder {
        &mut self.decoder
    }

    /// Runs the read loop with a given reader, emitting complete lines.
    ///
    /// This should be spawned as a separate task; it is the single
    /// reader for the connection and suspends only at the `read` await.
    /// End-of-stream is a normal exit (the device went away or the read
    /// was cancelled), not an error. The loop never reconnects on its
    /// own.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the stream fails.
    pub async fn run_read_loop_with_reader(
        mut reader: ReadHalf<SerialStream>,
        mut decoder: LineDecoder,
        line_tx: mpsc::Sender<String>,
    ) -> Result<()> {
        let mut buf = [0u8; 1024];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::info!("serial port closed");
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::error!("serial read error: {}", e);
                    return Err(Error::Io(e));
                }
            };

            tracing::trace!("received {} bytes", n);
            decoder.feed(&buf[..n]);

            while let Some(line) = decoder.next_line() {
                if line_tx.send(line).await.is_err() {
                    tracing::debug!("line receiver dropped");
                    return Ok(());
                }
            }
        }
    }
}

impl Transport for SerialTransport {
    fn connect(
        &mut self,
        port_name: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.writer.is_some() {
                return Ok(());
            }

            tracing::info!("connecting to serial port: {}", port_name);

            // 8N1 framing is part of the firmware contract
            let stream = tokio_serial::new(&port_name, BAUD_RATE)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .open_native_async()
                .map_err(Error::Serial)?;

            let (reader, writer) = tokio::io::split(stream);
            self.reader = Some(reader);
            self.writer = Some(Arc::new(Mutex::new(writer)));
            self.decoder.clear();

            tracing::info!("connected to serial port");
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.writer.is_some() || self.reader.is_some() {
                tracing::info!("disconnecting from serial port");
                self.writer = None;
                self.reader = None;
            }
            Ok(())
        })
    }

    fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let writer = self.writer.clone();
        Box::pin(async move {
            let writer = writer.ok_or(Error::NotConnected)?;
            let mut writer = writer.lock().await;

            tracing::trace!("writing {} bytes", data.len());

            writer.write_all(&data).await.map_err(Error::Io)?;
            writer.flush().await.map_err(Error::Io)?;

            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }
}
