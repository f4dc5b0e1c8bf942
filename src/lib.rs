//! # picolink
//!
//! An async serial bridge and live state mirror for MicroPython
//! devices.
//!
//! The device side keeps printing newline-delimited text over USB
//! serial: lines prefixed with `_v_=` carry a JSON state payload, and
//! everything else is free-form log output. This library opens the
//! port, turns the byte stream back into lines, folds state payloads
//! into a queryable mirror, and gives the host a serialized write path
//! for sending commands and REPL control codes back to the board.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Chunking-safe line decoding (UTF-8 reassembled across reads)
//! - Shared state mirror with "new event since last check" detection
//! - Serialized command writes, CRLF-terminated or raw control bytes
//!
//! ## Quick Start
//!
//! ```no_run
//! use picolink::PicoLink;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), picolink::Error> {
//!     let mut link = PicoLink::new();
//!
//!     // Reuses the selected port, or asks the configured prompt
//!     link.open(None).await?;
//!
//!     // Run a statement on the board
//!     link.write_line("print('hello')").await?;
//!
//!     // Soft-reset via CTRL-D
//!     link.write_control_code('d').await?;
//!
//!     // Poll the mirrored device state
//!     let state = link.state();
//!     if state.has_new_event("P7_ANY") {
//!         println!("pin event: {:?}", state.last_event_id("P7_ANY"));
//!         state.acknowledge_event("P7_ANY", 1);
//!     }
//!
//!     link.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`ports`] - Port registry, labeling and selection
//! - [`protocol`] - Line decoding and state-payload parsing
//! - [`state`] - The device-state mirror and edge detection
//! - [`transport`] - Transport implementations (currently USB/Serial)
//! - [`event`] - Connection-lifecycle notifications
//! - [`commands`] - Serialized outbound command writes
//! - [`client`] - High-level [`PicoLink`] client

pub mod client;
pub mod commands;
pub mod error;
pub mod event;
pub mod ports;
pub mod protocol;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use client::{ConnectionStatus, PicoLink};
pub use commands::{CommandWriter, control_code};
pub use error::{Error, Result};
pub use event::{Event, EventDispatcher, Subscription};
pub use ports::{KnownPort, PortFilter, PortId, PortPrompt, PortRegistry, available_ports};
pub use protocol::{LineDecoder, STATE_PREFIX, parse_line};
pub use state::{DeviceState, StateHandle, StateMirror};
pub use transport::{SerialTransport, Transport, serial::BAUD_RATE};
