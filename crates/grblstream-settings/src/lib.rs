//! grblstream Settings Crate
//!
//! Handles machine configuration: parsing, validation, persistence and the
//! partial updates clients send while a machine is attached.

pub mod config;
pub mod error;

pub use config::{default_config_path, FirmwareUploadConfig, MachineConfig, MachineTimings};
pub use error::{SettingsError, SettingsResult};
