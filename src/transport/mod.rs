//! Transport layer for device communication.
//!
//! This module provides the abstraction for byte-stream transports.
//! Currently only USB/Serial is implemented; the trait seam exists so
//! tests can substitute an in-memory transport.

pub mod serial;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::Result;

/// Trait for transport implementations.
pub trait Transport: Send + Sync {
    /// Opens the transport on the given OS-level port name.
    fn connect(&mut self, port_name: String)
    -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Closes the transport, releasing reader and writer.
    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Writes raw bytes to the device.
    ///
    /// Implementations must serialize concurrent sends; a torn write
    /// would corrupt the device's line parser.
    fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Returns true if the transport is open.
    fn is_connected(&self) -> bool;
}

pub use serial::SerialTransport;
