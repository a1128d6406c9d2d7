//! # grblstream
//!
//! Job streaming driver for GRBL-class CNC controllers:
//! - Character-counting flow control over a console lane and a job lane
//! - Run-state tracking from controller status reports and pause/resume
//! - Staged stop, feed and spindle override tracking
//! - Bootloader handshake ahead of a firmware upload
//!
//! ## Architecture
//!
//! grblstream is organized as a workspace with multiple crates:
//!
//! 1. **grblstream-core** - Errors, data model, events, clock
//! 2. **grblstream-settings** - Machine configuration
//! 3. **grblstream-communication** - Serial transport, command queue, GRBL output parsing
//! 4. **grblstream-machine** - The machine controller and its async driver
//! 5. **grblstream** - Command-line binary that integrates all crates

pub use grblstream_communication::{
    list_ports, CommandQueue, Lane, SerialPortInfo, SerialTransport, Transport, TransportEvent,
    VendorQuirk,
};
pub use grblstream_core::{
    ConnectionError, ControllerError, ControllerStatus, Error, EventDispatcher, MachineEvent,
    Position, Result, RunState,
};
pub use grblstream_machine::{Machine, MachineCommand, MachineHandle};
pub use grblstream_settings::{
    default_config_path, FirmwareUploadConfig, MachineConfig, MachineTimings,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
