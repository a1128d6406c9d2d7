//! Serial port transport
//!
//! Provides the [`Transport`] binding for a USB or RS-232 connection to the
//! controller, plus port enumeration.
//!
//! A background reader thread splits incoming bytes on the configured
//! separator and forwards each line as a [`TransportEvent::Line`]. The thread
//! reports [`TransportEvent::Closed`] only when the link drops on its own; a
//! requested [`Transport::close`] is silent.

use super::{Transport, TransportEvent};
use grblstream_core::{ConnectionError, Error, Result};
use grblstream_settings::MachineConfig;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Read timeout used so the reader thread notices a close promptly
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }
}

/// Rewrites the reported identity of matching USB ports.
///
/// Some upload tools only accept boards that enumerate with a known vendor,
/// so a quirk can present a clone USB bridge as the genuine part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorQuirk {
    /// Vendor ID the quirk applies to; `None` applies it to every USB port
    pub match_vid: Option<u16>,
    /// Replacement manufacturer
    pub manufacturer: Option<String>,
    /// Replacement vendor ID
    pub vid: Option<u16>,
}

impl VendorQuirk {
    /// Report every USB port as an FTDI bridge
    pub fn ftdi_spoof() -> Self {
        Self {
            match_vid: None,
            manufacturer: Some("FTDI".to_string()),
            vid: Some(0x0403),
        }
    }

    fn applies_to(&self, info: &SerialPortInfo) -> bool {
        match (self.match_vid, info.vid) {
            (None, Some(_)) => true,
            (Some(wanted), Some(actual)) => wanted == actual,
            (_, None) => false,
        }
    }

    /// Apply the quirk if the port matches
    pub fn apply(&self, info: &mut SerialPortInfo) {
        if !self.applies_to(info) {
            return;
        }
        if let Some(manufacturer) = &self.manufacturer {
            info.manufacturer = Some(manufacturer.clone());
        }
        if let Some(vid) = self.vid {
            info.vid = Some(vid);
        }
    }
}

/// List serial ports that look like CNC controllers, with `quirks` applied
/// in order.
pub fn list_ports(quirks: &[VendorQuirk]) -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::SerialError {
            reason: e.to_string(),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_valid_cnc_port(&port.port_name))
        .map(|port| {
            let mut info = port_info(port);
            for quirk in quirks {
                quirk.apply(&mut info);
            }
            info
        })
        .collect())
}

fn port_info(port: &serialport::SerialPortInfo) -> SerialPortInfo {
    let mut info = SerialPortInfo::new(&port.port_name, port_description(port));
    if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
        info.vid = Some(usb.vid);
        info.pid = Some(usb.pid);
        info.manufacturer = usb.manufacturer.clone();
        info.serial_number = usb.serial_number.clone();
    }
    info
}

/// Check if a port name matches CNC controller patterns
///
/// Valid patterns:
/// - Windows: COM* (COM1, COM2, etc.)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn is_valid_cnc_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Splits a byte stream into separator-terminated lines
///
/// Bytes are held until a separator arrives, so a multibyte character split
/// across two reads decodes intact.
#[derive(Debug, Clone)]
pub struct LineSplitter {
    separator: Vec<u8>,
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Create a splitter; an empty separator falls back to `"\n"`
    pub fn new(separator: &str) -> Self {
        let separator = if separator.is_empty() {
            b"\n".to_vec()
        } else {
            separator.as_bytes().to_vec()
        };
        Self {
            separator,
            pending: Vec::new(),
        }
    }

    /// Feed a chunk and collect every line it completes.
    ///
    /// Trailing whitespace (the `\r` of a `\r\n` pair) is stripped and blank
    /// lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(idx) = self.find_separator() {
            let raw: Vec<u8> = self.pending.drain(..idx + self.separator.len()).collect();
            let line = String::from_utf8_lossy(&raw[..idx]);
            let line = line.trim_end();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    fn find_separator(&self) -> Option<usize> {
        self.pending
            .windows(self.separator.len())
            .position(|window| window == self.separator.as_slice())
    }
}

/// Serial port transport backed by the `serialport` crate
pub struct SerialTransport {
    events: UnboundedSender<TransportEvent>,
    port: Option<Box<dyn serialport::SerialPort>>,
    port_name: Option<String>,
    reader_alive: Option<Arc<AtomicBool>>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Create a closed transport reporting to `events`
    pub fn new(events: UnboundedSender<TransportEvent>) -> Self {
        Self {
            events,
            port: None,
            port_name: None,
            reader_alive: None,
            reader: None,
        }
    }

    /// Signal the reader thread and wait for it to let go of its handle on
    /// the port. The port stays locked until it does.
    fn stop_reader(&mut self) {
        if let Some(alive) = self.reader_alive.take() {
            alive.store(false, Ordering::SeqCst);
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                tracing::error!("Serial reader thread panicked");
            }
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, port_name: &str, config: &MachineConfig) -> Result<()> {
        self.close()?;

        let port = serialport::new(port_name, config.baud)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", port_name, e);
                ConnectionError::FailedToOpen {
                    port: port_name.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let reader = port.try_clone().map_err(|e| ConnectionError::FailedToOpen {
            port: port_name.to_string(),
            reason: e.to_string(),
        })?;

        let alive = Arc::new(AtomicBool::new(true));
        let splitter = LineSplitter::new(&config.separator);
        let events = self.events.clone();
        let thread_alive = alive.clone();
        let reader = std::thread::Builder::new()
            .name(format!("serial-reader-{}", port_name))
            .spawn(move || read_loop(reader, splitter, events, thread_alive))
            .map_err(Error::from)?;

        tracing::info!("Opened serial port {} at {} baud", port_name, config.baud);
        self.port = Some(port);
        self.port_name = Some(port_name.to_string());
        self.reader_alive = Some(alive);
        self.reader = Some(reader);

        let _ = self.events.send(TransportEvent::Opened);
        Ok(())
    }

    fn write(&mut self, data: &str) -> Result<()> {
        let port = self.port.as_mut().ok_or(ConnectionError::NotOpen)?;
        port.write_all(data.as_bytes())
            .and_then(|_| port.flush())
            .map_err(|e| {
                tracing::error!("Serial write failed: {}", e);
                ConnectionError::WriteFailed {
                    reason: e.to_string(),
                }
            })?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stop_reader();
        if self.port.take().is_some() {
            tracing::info!(
                "Closed serial port {}",
                self.port_name.as_deref().unwrap_or("?")
            );
        }
        self.port_name = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn port_name(&self) -> Option<String> {
        self.port_name.clone()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

fn read_loop(
    mut port: Box<dyn serialport::SerialPort>,
    mut splitter: LineSplitter,
    events: UnboundedSender<TransportEvent>,
    alive: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 256];

    while alive.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    tracing::trace!("RX: {}", line);
                    if events.send(TransportEvent::Line(line)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // Only report the drop if nobody closed the port meanwhile.
                if alive.swap(false, Ordering::SeqCst) {
                    tracing::error!("Serial read failed: {}", e);
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    let _ = events.send(TransportEvent::Closed);
                }
                return;
            }
        }
    }
}
