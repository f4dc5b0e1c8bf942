//! Protocol definitions for device communication.
//!
//! The device emits newline-delimited UTF-8 text. Lines carrying the
//! [`STATE_PREFIX`] are state updates with a JSON payload; every other
//! line is free-form diagnostic output.

pub mod line;
pub mod parser;

/// Prefix marking a line as a state-update payload.
pub const STATE_PREFIX: &str = "_v_=";

/// Terminator appended to outbound commands, expected by the device REPL.
pub const COMMAND_TERMINATOR: &str = "\r\n";

pub use line::LineDecoder;
pub use parser::parse_line;
