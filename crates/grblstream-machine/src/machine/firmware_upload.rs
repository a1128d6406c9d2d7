//! Bootloader handshake before a firmware upload
//!
//! After `$K` the controller reboots into its bootloader, which hands control
//! back to the application unless serial data keeps arriving. The machine
//! writes `\r\n` every keep-alive interval for the configured delay, then
//! releases the port to whoever performs the upload.

use super::{Machine, TimerKind};
use grblstream_core::{ControllerError, MachineEvent, PortLostDiagnostic, Result};
use grblstream_settings::FirmwareUploadConfig;
use std::time::Duration;

/// Called once the port has been released for the uploader
pub type FirmwareContinuation = Box<dyn FnOnce() + Send>;

impl Machine {
    /// Put the controller into its bootloader and hand the port over.
    ///
    /// Rejected without side effects unless the machine is connected, idle
    /// and not already uploading.
    pub fn begin_firmware_upload(
        &mut self,
        continuation: FirmwareContinuation,
        upload: &FirmwareUploadConfig,
    ) -> Result<()> {
        let rejection = if !self.is_machine_connected {
            Some("machine is not connected")
        } else if self.is_running {
            Some("a job is running")
        } else if self.is_uploading_firmware {
            Some("a firmware upload is already in progress")
        } else {
            None
        };
        if let Some(reason) = rejection {
            tracing::warn!("Firmware upload rejected: {}", reason);
            return Err(ControllerError::PreconditionRejected {
                reason: reason.to_string(),
            }
            .into());
        }

        tracing::info!(
            "Beginning firmware upload (reset delay {} ms)",
            upload.reset_delay
        );
        self.stop_heartbeat();
        self.reset();
        if upload.pre_reset {
            self.send_line("$K");
        }
        self.is_uploading_firmware = true;
        self.upload_continuation = Some(continuation);
        self.report_job_status();

        self.keep_bootloader_alive(
            upload.reset_delay,
            upload.reset_keep_alive_interval.max(1),
        );
        Ok(())
    }

    /// Write keep-alives while `remaining_ms` is left, then release the port
    pub(super) fn keep_bootloader_alive(&mut self, remaining_ms: u64, interval_ms: u64) {
        if remaining_ms > 0 {
            self.schedule(
                Duration::from_millis(interval_ms),
                TimerKind::FirmwareKeepAlive {
                    remaining_ms,
                    interval_ms,
                },
            );
            return;
        }

        tracing::info!("Releasing port for firmware upload");
        if let Err(e) = self.transport.close() {
            tracing::warn!("Error closing port: {}", e);
        }
        if let Some(continuation) = self.upload_continuation.take() {
            continuation();
        }
    }

    /// The uploader is done with the port. The machine counts as lost until
    /// the port is opened again.
    pub fn end_firmware_upload(&mut self) {
        tracing::info!("Firmware upload ended");
        self.is_machine_connected = false;
        self.events.publish(MachineEvent::PortLost(PortLostDiagnostic::note(
            "Firmware upload complete?",
        )));
        self.reset();
    }
}
