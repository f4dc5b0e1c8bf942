//! Port registry: tracking, labeling and selection of serial ports.
//!
//! Operating systems cannot be trusted to name serial devices stably,
//! so each granted port gets an opaque [`PortId`] and a human-facing
//! ordinal label (`"Port 1"`, `"Port 2"`, ...) assigned on first sight.
//! Labels are never reused for the lifetime of the process. The actual
//! user-facing chooser lives outside this crate and is injected through
//! the [`PortPrompt`] trait.

use std::fmt;

use tokio_serial::{SerialPortInfo, SerialPortType};

use crate::error::{Error, Result};

/// Stable identity of a known port for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(u64);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A port the user has granted or the OS has enumerated.
#[derive(Debug, Clone)]
pub struct KnownPort {
    id: PortId,
    label: String,
    info: SerialPortInfo,
}

impl KnownPort {
    /// The port's stable identity.
    #[must_use]
    pub const fn id(&self) -> PortId {
        self.id
    }

    /// Ordinal label assigned on first sight.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// OS-level port info needed to open the port.
    #[must_use]
    pub const fn info(&self) -> &SerialPortInfo {
        &self.info
    }
}

/// Filter narrowing which ports a prompt should offer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortFilter {
    /// Match only USB ports with this vendor id.
    pub usb_vendor_id: Option<u16>,
    /// Match only USB ports with this product id.
    pub usb_product_id: Option<u16>,
}

impl PortFilter {
    /// Checks whether a port passes the filter.
    #[must_use]
    pub fn matches(&self, info: &SerialPortInfo) -> bool {
        if self.usb_vendor_id.is_none() && self.usb_product_id.is_none() {
            return true;
        }
        match &info.port_type {
            SerialPortType::UsbPort(usb) => {
                self.usb_vendor_id.is_none_or(|vid| usb.vid == vid)
                    && self.usb_product_id.is_none_or(|pid| usb.pid == pid)
            }
            _ => false,
        }
    }
}

/// User-facing port chooser, implemented by the host UI layer.
pub trait PortPrompt: Send + Sync {
    /// Asks the user to pick one of the candidate ports.
    ///
    /// Returns `None` when the user dismisses the prompt.
    fn choose(&self, candidates: &[SerialPortInfo]) -> Option<SerialPortInfo>;
}

/// Registry of granted/enumerated ports and the current selection.
#[derive(Debug, Default)]
pub struct PortRegistry {
    ports: Vec<KnownPort>,
    next_ordinal: u64,
    selected: Option<PortId>,
}

impl PortRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ports previously granted or enumerated. No blocking I/O.
    #[must_use]
    pub fn known_ports(&self) -> &[KnownPort] {
        &self.ports
    }

    /// Registers a port, or returns the existing entry for one already
    /// known under the same OS name.
    pub fn add_port(&mut self, info: SerialPortInfo) -> PortId {
        if let Some(id) = self.find_by_identity(&info.port_name) {
            return id;
        }
        self.next_ordinal += 1;
        let id = PortId(self.next_ordinal);
        self.ports.push(KnownPort {
            id,
            label: format!("Port {}", self.next_ordinal),
            info,
        });
        id
    }

    /// Registers already-authorized ports found by OS enumeration.
    pub fn add_enumerated(&mut self, infos: impl IntoIterator<Item = SerialPortInfo>) {
        for info in infos {
            self.add_port(info);
        }
    }

    /// Asks the injected prompt to grant a new port from `candidates`
    /// and selects it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SelectionCancelled`] if the user dismisses the
    /// prompt.
    pub fn request_new_port(
        &mut self,
        prompt: &dyn PortPrompt,
        candidates: &[SerialPortInfo],
    ) -> Result<PortId> {
        let chosen = prompt
            .choose(candidates)
            .ok_or(Error::SelectionCancelled)?;
        let id = self.add_port(chosen);
        self.selected = Some(id);
        Ok(id)
    }

    /// Ordinal label for a known port.
    #[must_use]
    pub fn label_for(&self, id: PortId) -> Option<&str> {
        self.get(id).map(KnownPort::label)
    }

    /// Identity lookup by OS-level port name.
    #[must_use]
    pub fn find_by_identity(&self, port_name: &str) -> Option<PortId> {
        self.ports
            .iter()
            .find(|port| port.info.port_name == port_name)
            .map(|port| port.id)
    }

    /// Looks up a known port by id.
    #[must_use]
    pub fn get(&self, id: PortId) -> Option<&KnownPort> {
        self.ports.iter().find(|port| port.id == id)
    }

    /// Marks a known port as the current selection.
    pub fn select(&mut self, id: PortId) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::UnknownPort(id));
        }
        self.selected = Some(id);
        Ok(())
    }

    /// The current selection, if any.
    #[must_use]
    pub const fn selected(&self) -> Option<PortId> {
        self.selected
    }
}

/// Lists serial ports currently visible to the OS.
pub fn available_ports() -> Result<Vec<SerialPortInfo>> {
    tokio_serial::available_ports().map_err(Error::Serial)
}
