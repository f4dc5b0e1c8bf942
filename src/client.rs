//! Main [`PicoLink`] client implementation.
//!
//! This module provides the high-level [`PicoLink`] client that owns
//! one connection's lifecycle: port resolution, transport open,
//! read-loop supervision, close/cancel, and status reporting. The state
//! mirror and connection events are shared with the host runtime
//! through cloneable handles.

use std::sync::Arc;

use parking_lot::{Mutex as SyncMutex, RwLock as SyncRwLock};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::commands::CommandWriter;
use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher, Subscription};
use crate::ports::{self, KnownPort, PortFilter, PortId, PortPrompt, PortRegistry};
use crate::protocol::parse_line;
use crate::state::StateHandle;
use crate::transport::{SerialTransport, Transport};

/// Connection lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No active connection.
    #[default]
    Disconnected,
    /// Transport open in progress.
    Connecting,
    /// Transport open, read loop running.
    Connected,
}

/// Client for one serial connection to a MicroPython device.
///
/// At most one connection is active at a time; opening a new one first
/// releases the previous reader and writer.
pub struct PicoLink<T = SerialTransport> {
    transport: Arc<Mutex<T>>,
    commands: CommandWriter<T>,
    dispatcher: EventDispatcher,
    state: StateHandle,

    registry: SyncMutex<PortRegistry>,
    prompt: Option<Box<dyn PortPrompt>>,
    filter: PortFilter,

    status: Arc<SyncRwLock<ConnectionStatus>>,

    // Background tasks
    read_task: Option<JoinHandle<()>>,
    process_task: Option<JoinHandle<()>>,
}

impl PicoLink<SerialTransport> {
    /// Creates a new client over the serial transport (not yet
    /// connected).
    #[must_use]
    pub fn new() -> Self {
        Self::with_transport(SerialTransport::new())
    }
}

impl Default for PicoLink<SerialTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport + 'static> PicoLink<T> {
    fn with_transport(transport: T) -> Self {
        let transport = Arc::new(Mutex::new(transport));
        let commands = CommandWriter::new(Arc::clone(&transport));

        Self {
            transport,
            commands,
            dispatcher: EventDispatcher::new(256),
            state: StateHandle::new(),
            registry: SyncMutex::new(PortRegistry::new()),
            prompt: None,
            filter: PortFilter::default(),
            status: Arc::new(SyncRwLock::new(ConnectionStatus::Disconnected)),
            read_task: None,
            process_task: None,
        }
    }

    /// Installs the port-selection prompt supplied by the host UI.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Box<dyn PortPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Restricts which ports the prompt offers.
    #[must_use]
    pub fn with_filter(mut self, filter: PortFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Opens a connection.
    ///
    /// Resolves a port (the `preferred` one, else the registry's
    /// current selection, else a new user grant through the prompt),
    /// opens the transport at the fixed firmware baud/framing, and
    /// starts the read loop.
    ///
    /// # Errors
    ///
    /// Any failure leaves the client `Disconnected` and is returned to
    /// the caller; no retry is attempted.
    pub async fn open(&mut self, preferred: Option<PortId>) -> Result<()> {
        if self.read_task.is_some() || self.is_connected() {
            self.close().await;
        }
        *self.status.write() = ConnectionStatus::Connecting;

        match self.try_open(preferred).await {
            Ok(()) => {
                *self.status.write() = ConnectionStatus::Connected;
                self.dispatcher.dispatch(Event::Connected);
                Ok(())
            }
            Err(e) => {
                tracing::error!("open failed: {}", e);
                *self.status.write() = ConnectionStatus::Disconnected;
                Err(e)
            }
        }
    }

    async fn try_open(&mut self, preferred: Option<PortId>) -> Result<()> {
        let port_name = self.resolve_port(preferred)?;

        {
            let mut transport = self.transport.lock().await;
            transport.connect(port_name).await?;
        }

        self.start_read_loop().await;
        Ok(())
    }

    /// Picks the OS-level port name to open.
    ///
    /// The registry only ever holds ports the user has granted; fresh
    /// OS enumeration feeds the prompt's candidate list, it does not
    /// grant anything by itself.
    fn resolve_port(&self, preferred: Option<PortId>) -> Result<String> {
        let mut registry = self.registry.lock();

        let id = match preferred.or_else(|| registry.selected()) {
            Some(id) => id,
            None => {
                let prompt = self.prompt.as_deref().ok_or(Error::NoPortSelected)?;
                let available = match ports::available_ports() {
                    Ok(infos) => infos,
                    Err(e) => {
                        tracing::warn!("port enumeration failed: {}", e);
                        Vec::new()
                    }
                };
                let candidates: Vec<_> = available
                    .into_iter()
                    .filter(|info| self.filter.matches(info))
                    .collect();
                registry.request_new_port(prompt, &candidates)?
            }
        };

        let port = registry.get(id).ok_or(Error::UnknownPort(id))?;
        tracing::info!("opening {} ({})", port.label(), port.info().port_name);
        Ok(port.info().port_name.clone())
    }

    /// Starts the background read loop.
    async fn start_read_loop(&mut self) {
        let (line_tx, mut line_rx) = mpsc::channel::<String>(256);

        // Take reader and decoder from transport (only works for SerialTransport)
        let reader_and_decoder = {
            let mut transport = self.transport.lock().await;
            if let Some(serial) =
                ((&mut *transport) as &mut dyn std::any::Any).downcast_mut::<SerialTransport>()
            {
                let decoder = std::mem::take(serial.decoder_mut());
                serial.take_reader().map(|reader| (reader, decoder))
            } else {
                None
            }
        };

        // Spawn read task with the reader (doesn't hold transport lock)
        if let Some((reader, decoder)) = reader_and_decoder {
            let status = Arc::clone(&self.status);
            let dispatcher = self.dispatcher.clone();
            let read_task = tokio::spawn(async move {
                if let Err(e) =
                    SerialTransport::run_read_loop_with_reader(reader, decoder, line_tx).await
                {
                    tracing::error!("read loop error: {}", e);
                }
                // Device went away or the stream ended. Mark the
                // connection dead; reconnection is an explicit open().
                *status.write() = ConnectionStatus::Disconnected;
                dispatcher.dispatch(Event::Disconnected);
            });
            self.read_task = Some(read_task);
        }

        // Spawn line processing task
        let state = self.state.clone();
        let dispatcher = self.dispatcher.clone();
        let process_task = tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                parse_line(&line, &state, &dispatcher);
            }
        });
        self.process_task = Some(process_task);
    }

    /// Closes the connection. Idempotent; never fails from the caller's
    /// viewpoint.
    ///
    /// The in-flight read is cancelled before the transport is torn
    /// down, so the read loop observes termination rather than racing a
    /// closed handle. Close-time transport errors (a board yanked from
    /// the USB port, say) are logged and swallowed.
    pub async fn close(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(task) = self.process_task.take() {
            task.abort();
        }

        {
            let mut transport = self.transport.lock().await;
            if let Err(e) = transport.disconnect().await {
                tracing::warn!("error while closing transport: {}", e);
            }
        }

        let was_connected = {
            let mut status = self.status.write();
            let previous = *status;
            *status = ConnectionStatus::Disconnected;
            previous != ConnectionStatus::Disconnected
        };
        if was_connected {
            self.dispatcher.dispatch(Event::Disconnected);
        }
    }

    /// Returns true if connected. Side-effect-free.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.status.read() == ConnectionStatus::Connected
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    /// Handle to the shared device-state mirror.
    #[must_use]
    pub fn state(&self) -> StateHandle {
        self.state.clone()
    }

    /// Subscribes to connection-lifecycle events and device log lines.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe()
    }

    /// Returns the command writer for direct write access.
    #[must_use]
    pub const fn commands(&self) -> &CommandWriter<T> {
        &self.commands
    }

    /// Writes UTF-8 text to the device, unterminated.
    pub async fn write(&self, text: &str) -> Result<()> {
        self.commands.write(text).await
    }

    /// Writes a command line terminated by CRLF.
    pub async fn write_line(&self, text: &str) -> Result<()> {
        self.commands.write_line(text).await
    }

    /// Writes a single control byte (CTRL-A=1 ... CTRL-Z=26).
    pub async fn write_control_code(&self, letter: char) -> Result<()> {
        self.commands.write_control_code(letter).await
    }

    /// Snapshot of the ports the user has granted.
    #[must_use]
    pub fn known_ports(&self) -> Vec<KnownPort> {
        self.registry.lock().known_ports().to_vec()
    }

    /// Registers a port as granted without going through the prompt,
    /// for hosts that persist the user's previous choice.
    pub fn register_port(&self, info: tokio_serial::SerialPortInfo) -> PortId {
        self.registry.lock().add_port(info)
    }

    /// Marks a known port as the selection reused by `open(None)`.
    pub fn select_port(&self, id: PortId) -> Result<()> {
        self.registry.lock().select(id)
    }

    /// Ordinal label for a known port.
    #[must_use]
    pub fn port_label(&self, id: PortId) -> Option<String> {
        self.registry.lock().label_for(id).map(str::to_owned)
    }
}

impl<T> Drop for PicoLink<T> {
    fn drop(&mut self) {
        // Abort background tasks
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(task) = self.process_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    use bytes::Bytes;
    use tokio_serial::{SerialPortInfo, SerialPortType};

    /// Transport that connects to anything and records nothing.
    #[derive(Default)]
    struct LoopbackTransport {
        connected: bool,
    }

    impl Transport for LoopbackTransport {
        fn connect(
            &mut self,
            _port_name: String,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.connected = true;
                Ok(())
            })
        }

        fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.connected = false;
                Ok(())
            })
        }

        fn send(&mut self, _data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    struct FixedPrompt(&'static str);

    impl PortPrompt for FixedPrompt {
        fn choose(&self, _candidates: &[SerialPortInfo]) -> Option<SerialPortInfo> {
            Some(SerialPortInfo {
                port_name: self.0.to_owned(),
                port_type: SerialPortType::Unknown,
            })
        }
    }

    #[tokio::test]
    async fn test_close_without_open_is_harmless() {
        let mut link = PicoLink::new();
        link.close().await;
        link.close().await;
        assert_eq!(link.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_open_without_port_or_prompt_fails() {
        let mut link = PicoLink::<LoopbackTransport>::with_transport(LoopbackTransport::default());
        let result = link.open(None).await;

        assert!(matches!(result, Err(Error::NoPortSelected)));
        assert_eq!(link.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_open_and_close_lifecycle() {
        let mut link = PicoLink::<LoopbackTransport>::with_transport(LoopbackTransport::default())
            .with_prompt(Box::new(FixedPrompt("/dev/ttyACM0")));
        let mut sub = link.subscribe();

        link.open(None).await.unwrap();
        assert!(link.is_connected());
        assert!(matches!(sub.recv().await, Some(Event::Connected)));

        // The granted port became the selection, so reopening needs no prompt
        assert_eq!(link.known_ports().len(), 1);

        link.close().await;
        assert!(!link.is_connected());
        assert!(matches!(sub.recv().await, Some(Event::Disconnected)));
    }

    #[tokio::test]
    async fn test_reopen_reuses_selected_port() {
        let mut link = PicoLink::<LoopbackTransport>::with_transport(LoopbackTransport::default())
            .with_prompt(Box::new(FixedPrompt("/dev/ttyACM0")));

        link.open(None).await.unwrap();
        link.close().await;

        // Second open resolves via the remembered selection; the prompt
        // granting a duplicate name must not mint a second label.
        link.open(None).await.unwrap();
        assert!(link.is_connected());
        assert_eq!(link.known_ports().len(), 1);
        assert_eq!(
            link.port_label(link.known_ports()[0].id()),
            Some("Port 1".to_owned())
        );
    }

    #[tokio::test]
    async fn test_open_while_open_replaces_connection() {
        let mut link = PicoLink::<LoopbackTransport>::with_transport(LoopbackTransport::default())
            .with_prompt(Box::new(FixedPrompt("/dev/ttyACM0")));

        link.open(None).await.unwrap();
        link.open(None).await.unwrap();
        assert!(link.is_connected());
    }
}
