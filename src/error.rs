//! Error types for the picolink library.

use thiserror::Error;

use crate::ports::PortId;

/// The main error type for picolink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a state-update line.
    #[error("state payload parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// No port is selected and no prompt is configured to request one.
    #[error("no serial port selected")]
    NoPortSelected,

    /// The user dismissed the port-selection prompt.
    #[error("port selection cancelled")]
    SelectionCancelled,

    /// The port id does not refer to a known port.
    #[error("unknown port: {0}")]
    UnknownPort(PortId),

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// Control-code letter outside `A`-`Z`.
    #[error("invalid control code letter: {letter:?}")]
    InvalidControlCode { letter: char },
}

/// Result type alias for picolink operations.
pub type Result<T> = std::result::Result<T, Error>;
