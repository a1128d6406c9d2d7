//! Transport boundary between the machine controller and the serial link
//!
//! A [`Transport`] owns one exclusive connection to a controller. Outbound
//! writes are synchronous; inbound activity (lines, errors, closure) is
//! reported asynchronously as [`TransportEvent`]s on a channel the transport
//! was created with.

pub mod buffered;
pub mod serial;

use grblstream_core::Result;
use grblstream_settings::MachineConfig;

pub use buffered::{CommandQueue, CommandQueueConfig, Lane, DEFAULT_BYTE_BUDGET};
pub use serial::{list_ports, SerialPortInfo, SerialTransport, VendorQuirk};

/// Activity reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The port finished opening
    Opened,
    /// One separator-terminated line of controller output, separator removed
    Line(String),
    /// The link reported an error
    Error(String),
    /// The link closed without being asked to
    Closed,
}

/// Exclusive byte-stream connection to a controller
pub trait Transport: Send {
    /// Open `port_name` with the baud rate and separator from `config`.
    ///
    /// Any previously open connection is closed first.
    fn open(&mut self, port_name: &str, config: &MachineConfig) -> Result<()>;

    /// Write raw data. Returns `ConnectionError::NotOpen` when there is no
    /// open connection.
    fn write(&mut self, data: &str) -> Result<()>;

    /// Close the connection. Closing an already closed transport is a no-op
    /// and never produces a [`TransportEvent::Closed`].
    fn close(&mut self) -> Result<()>;

    /// Whether a connection is currently open
    fn is_connected(&self) -> bool;

    /// Name of the open port, if any
    fn port_name(&self) -> Option<String>;
}
