//! The machine controller
//!
//! [`Machine`] owns everything about one attached controller: the command
//! queue and in-flight buffer, the job and its run-state, override trackers,
//! the echo ledger and the pending timers. It is driven by three kinds of
//! input, never concurrently:
//!
//! - client operations (`stream_gcode_lines`, `pause`, `execute`, ...)
//! - transport activity ([`Machine::handle_transport_event`])
//! - timers coming due ([`Machine::poll_timers`])
//!
//! and reports what happens as [`MachineEvent`]s on its dispatcher.

mod firmware_upload;
mod job;
mod stop;

pub use firmware_upload::FirmwareContinuation;
pub use job::Job;
pub use stop::StopStage;

use crate::echo::{EchoLedger, EchoOutcome};
use crate::gcode::{self, UnitMode};
use crate::rate_tracker::RateTracker;
use crate::scheduler::{TimerId, TimerQueue};
use grblstream_communication::firmware::grbl::{describe_alarm, describe_error};
use grblstream_communication::{
    CommandQueue, ControllerMessage, GrblLineClassifier, Lane, LineClassifier, Transport,
    TransportEvent,
};
use grblstream_core::{
    Axes, Clock, ConnectionError, ConnectionState, ControllerError, ControllerStatus, EchoDirection,
    EchoFlags, Error, EventDispatcher, MachineEvent, OverrideSnapshot, PortLostDiagnostic,
    Position, PositionReport, Result, RunState, SystemClock,
};
use grblstream_settings::{MachineConfig, MachineTimings};
use std::sync::Arc;

/// The response that aborts a running job instead of acknowledging a line
const FATAL_JOB_ERROR: &str = "error:9";

/// What a pending timer does when it comes due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Poll the controller status
    Heartbeat,
    /// Advance the staged stop
    Stop(StopStage),
    /// Keep the bootloader listening; `remaining_ms` of the delay is left
    FirmwareKeepAlive { remaining_ms: u64, interval_ms: u64 },
    /// Disconnect if still no clients
    IdleDisconnect,
}

/// Controller for one GRBL machine
pub struct Machine {
    transport: Box<dyn Transport>,
    classifier: Box<dyn LineClassifier>,
    clock: Arc<dyn Clock>,
    events: EventDispatcher,
    timings: MachineTimings,
    timers: TimerQueue<TimerKind>,

    config: Option<MachineConfig>,
    queue: CommandQueue,
    echo: EchoLedger,
    echo_flags: EchoFlags,

    feed_rate: RateTracker,
    spindle_speed: RateTracker,
    gcode_unit: UnitMode,

    job: Job,
    run_state: RunState,
    last_run_command: Option<String>,
    is_running: bool,
    is_stopping: bool,
    is_uploading_firmware: bool,
    is_machine_connected: bool,
    machine_identification: Option<String>,

    position: Option<Position>,
    work_coordinate_offset: Option<Axes>,

    connected_clients: usize,
    heartbeat: Option<TimerId>,
    idle_disconnect: Option<TimerId>,
    upload_continuation: Option<FirmwareContinuation>,
}

impl Machine {
    /// Create a machine talking through `transport`, with the system clock,
    /// the GRBL line classifier and default timings.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            classifier: Box::new(GrblLineClassifier::new()),
            clock: Arc::new(SystemClock),
            events: EventDispatcher::default(),
            timings: MachineTimings::default(),
            timers: TimerQueue::new(),
            config: None,
            queue: CommandQueue::default(),
            echo: EchoLedger::new(),
            echo_flags: EchoFlags::default(),
            feed_rate: RateTracker::default(),
            spindle_speed: RateTracker::default(),
            gcode_unit: UnitMode::Millimeters,
            job: Job::default(),
            run_state: RunState::Running,
            last_run_command: None,
            is_running: false,
            is_stopping: false,
            is_uploading_firmware: false,
            is_machine_connected: false,
            machine_identification: None,
            position: None,
            work_coordinate_offset: None,
            connected_clients: 0,
            heartbeat: None,
            idle_disconnect: None,
            upload_continuation: None,
        }
    }

    /// Use a different clock for timers and run-time stamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use different delays
    pub fn with_timings(mut self, timings: MachineTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Use a different output classifier
    pub fn with_classifier(mut self, classifier: Box<dyn LineClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Publish on an existing dispatcher
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    /// The dispatcher events are published on
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    // ----- configuration and port -----

    /// Replace the configuration. Disconnects first.
    pub fn set_config(&mut self, config: MachineConfig) {
        tracing::info!("Setting config: {}", config.name);
        self.disconnect();
        self.config = Some(config);
    }

    /// Merge a partial configuration into the current one
    pub fn update_config(&mut self, partial: &serde_json::Value) -> Result<()> {
        let Some(config) = self.config.as_mut() else {
            let err = ControllerError::ConfigMissing {
                operation: "update a config".to_string(),
            };
            tracing::error!("{}", err);
            return Err(err.into());
        };

        if partial.is_null() {
            let err = ControllerError::InvalidInput {
                reason: "update_config called without data".to_string(),
            };
            tracing::error!("{}", err);
            return Err(err.into());
        }

        tracing::info!("Updating config with {}", partial);
        config.update(partial).map_err(|e| {
            tracing::error!("Rejected config update: {}", e);
            Error::from(ControllerError::InvalidInput {
                reason: e.to_string(),
            })
        })
    }

    /// The current configuration
    pub fn config(&self) -> Option<&MachineConfig> {
        self.config.as_ref()
    }

    /// Open the serial port. A failure to open counts as losing the port.
    pub fn init_port(&mut self, port_name: &str) -> Result<()> {
        let Some(config) = self.config.as_ref() else {
            let err = ControllerError::ConfigMissing {
                operation: "connect".to_string(),
            };
            tracing::error!("{}", err);
            return Err(err.into());
        };

        tracing::info!("Opening port: {}", port_name);
        if let Err(e) = self.transport.open(port_name, config) {
            tracing::error!("Could not open {}: {}", port_name, e);
            self.port_lost(&e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Drop the serial connection and forget all queued work
    pub fn disconnect(&mut self) {
        self.stop_heartbeat();
        if let Err(e) = self.transport.close() {
            tracing::warn!("Error closing port: {}", e);
        }
        self.is_machine_connected = false;
        self.reset();
    }

    /// Select which traffic is mirrored: sent lines into the echo ledger
    /// (`file`) and raw serial data as events (`socket`)
    pub fn set_echo_flags(&mut self, flags: EchoFlags) {
        self.echo_flags = flags;
    }

    // ----- inbound transport activity -----

    /// React to one piece of transport activity
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_port_opened(),
            TransportEvent::Line(line) => self.handle_line(&line),
            TransportEvent::Error(message) => {
                tracing::error!("Port error: {}", message);
                self.events.publish(MachineEvent::PortError(message));
            }
            TransportEvent::Closed => self.port_lost("Machine disconnected"),
        }
    }

    /// Classify a controller output line and react to each message in it
    pub fn handle_line(&mut self, line: &str) {
        tracing::debug!("RX: {}", line);
        if self.echo_flags.socket {
            self.events.publish(MachineEvent::SerialEcho {
                direction: EchoDirection::Read,
                data: line.to_string(),
            });
        }

        for message in self.classifier.classify(line) {
            self.handle_message(message);
        }
    }

    /// React to one classified controller message
    pub fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Ok => self.on_process_command(),
            ControllerMessage::Ready { identification } => self.on_machine_connected(identification),
            ControllerMessage::State { status, substate } => {
                self.on_controller_state(status, substate)
            }
            ControllerMessage::Position(report) => self.on_position(report),
            ControllerMessage::ProbeStatus(triggered) => {
                self.events.publish(MachineEvent::ProbeStatus(triggered))
            }
            ControllerMessage::ProbeResult(result) => {
                self.events.publish(MachineEvent::ProbeResult(result))
            }
            ControllerMessage::SpindleCurrent(amps) => {
                self.events.publish(MachineEvent::SpindleCurrent(amps))
            }
            ControllerMessage::Setting { number, value } => {
                self.events.publish(MachineEvent::Setting { number, value })
            }
            ControllerMessage::Alarm(message) => {
                tracing::warn!(
                    "Alarm: {} ({})",
                    message,
                    describe_alarm(&message).unwrap_or("unknown code")
                );
                self.events.publish(MachineEvent::GrblAlarm(message))
            }
            ControllerMessage::Error(message) => self.on_grbl_error(message),
            ControllerMessage::Echo(echoed) => self.on_grbl_echo(&echoed),
            ControllerMessage::OverCurrent(message) => {
                self.events.publish(MachineEvent::GrblOverCurrent(message))
            }
            ControllerMessage::BuildInfo(info) => {
                self.events.publish(MachineEvent::MachineBuildInfo(info))
            }
            ControllerMessage::Unknown(raw) => self.events.publish(MachineEvent::Unknown(raw)),
        }
    }

    fn on_port_opened(&mut self) {
        tracing::info!("Port opened");
        self.is_uploading_firmware = false;
        self.send_instruction("flush");
    }

    fn on_machine_connected(&mut self, identification: String) {
        tracing::info!("Machine connected: {}", identification);
        self.machine_identification = Some(identification);
        self.is_machine_connected = true;
        self.start_heartbeat();
        self.events.publish(MachineEvent::Connected);
    }

    fn on_controller_state(&mut self, status: ControllerStatus, substate: Option<String>) {
        if self.is_running {
            self.apply_status(status);
        }
        self.events.publish(MachineEvent::ControllerState { status, substate });
    }

    fn on_position(&mut self, report: PositionReport) {
        if let Some(offset) = report.work_coordinate_offset {
            self.work_coordinate_offset = Some(offset);
        }

        if let Some(position) = Position::derive(&report, self.work_coordinate_offset.as_ref()) {
            self.position = Some(position);
        }

        if let Some(position) = self.position {
            self.events.publish(MachineEvent::Position(position));
        }
    }

    fn on_grbl_error(&mut self, message: String) {
        tracing::error!(
            "Received grbl error '{}' ({}) after line '{}' (continuing)",
            message,
            describe_error(&message).unwrap_or("unknown code"),
            self.queue.oldest_in_flight().unwrap_or_default()
        );
        if self.echo.ring().next().is_some() {
            tracing::error!("Echo buffer of recent commands (oldest-to-newest)");
            for echoed in self.echo.ring() {
                tracing::error!("\t{}", echoed);
            }
        }

        if self.is_running && message.trim() == FATAL_JOB_ERROR {
            tracing::warn!("Reset button pressed or homing switches error, stopping job.");
            self.send_instruction("flush");
            self.report_job_status_and_run_time();
            self.report_run_time();
            self.reset();
        } else {
            self.on_process_command();
        }

        self.events.publish(MachineEvent::GrblError(message));
    }

    fn on_grbl_echo(&mut self, echoed: &str) {
        if self.echo_flags.file {
            match self.echo.reconcile(echoed) {
                EchoOutcome::Matched => tracing::debug!("echo: {} (ok)", echoed),
                EchoOutcome::Resynced { dropped } => tracing::warn!(
                    "echo: {} was not the next line; grbl appears to have dropped or combined {} line(s), re-synced",
                    echoed,
                    dropped
                ),
                EchoOutcome::Mismatch { expected } => {
                    tracing::warn!("echo: {} (expected {})", echoed, expected)
                }
                EchoOutcome::Unexpected => {
                    tracing::debug!("echo: {} (not expecting anything)", echoed)
                }
            }
        }
        self.echo.remember(echoed);
    }

    /// The transport is gone: stop polling, close out the run, tell clients
    /// and start over.
    fn port_lost(&mut self, note: &str) {
        self.stop_heartbeat();
        if let Err(e) = self.transport.close() {
            tracing::warn!("Error closing port: {}", e);
        }
        self.is_machine_connected = false;
        self.report_run_time();

        let diagnostic = PortLostDiagnostic {
            last_instruction: self.last_run_command.clone(),
            active_buffer: self.queue.in_flight().map(str::to_string).collect(),
            sender_note: note.to_string(),
        };
        tracing::error!("Port lost: {}", note);
        self.events.publish(MachineEvent::PortLost(diagnostic));
        self.reset();
    }

    // ----- outbound -----

    /// Run each named instruction in order
    pub fn execute<S: AsRef<str>>(&mut self, instructions: &[S]) {
        for instruction in instructions {
            self.send_instruction(instruction.as_ref());
        }
    }

    /// Queue a raw line on the console lane and send what fits
    pub fn enqueue_command(&mut self, line: impl Into<String>) {
        self.queue.enqueue(line, Lane::Console);
        self.fill_command_buffer();
    }

    /// Ask the controller for its settings
    pub fn request_settings(&mut self) {
        self.send_instruction("settings");
    }

    /// Ask the controller for its build information
    pub fn report_build_info(&mut self) {
        self.send_instruction("readSerialNumber");
    }

    fn send_instruction(&mut self, instruction: &str) {
        if self.is_uploading_firmware {
            tracing::warn!(
                "{}",
                ControllerError::WriteDuringFirmwareUpload {
                    data: instruction.to_string()
                }
            );
            return;
        }

        match instruction {
            "flush" => {
                self.reset_queue();
                self.feed_rate.reset();
                self.spindle_speed.reset();
            }
            "resetFeedRate" => {
                self.feed_rate.reset();
                self.report_override_update();
            }
            "increaseFeedRate" => {
                self.feed_rate.increase_rate();
                self.report_override_update();
            }
            "decreaseFeedRate" => {
                self.feed_rate.decrease_rate();
                self.report_override_update();
            }
            "resetSpindleSpeed" => {
                self.spindle_speed.reset();
                self.report_override_update();
            }
            "increaseSpindleSpeed" => {
                self.spindle_speed.increase_rate();
                self.report_override_update();
            }
            "decreaseSpindleSpeed" => {
                self.spindle_speed.decrease_rate();
                self.report_override_update();
            }
            _ => {}
        }

        let Some(config) = self.config.as_ref() else {
            tracing::warn!(
                "{}",
                ControllerError::ConfigMissing {
                    operation: format!("get a gcode instruction ({})", instruction)
                }
            );
            return;
        };

        match config.gcode_for(instruction) {
            Some(gcode) if !gcode.is_empty() => {
                if config.is_real_time(instruction) {
                    self.write_raw(&gcode);
                } else {
                    self.enqueue_command(gcode);
                }
            }
            _ => tracing::info!(
                "{}",
                ControllerError::UnknownInstruction {
                    instruction: instruction.to_string()
                }
            ),
        }
    }

    /// Move commands into the in-flight buffer and write them while they fit
    pub(crate) fn fill_command_buffer(&mut self) {
        while let Some(line) = self.queue.admit_next() {
            self.send_line(&line);
        }
        tracing::trace!(
            "Controller buffer {}% used ({} commands)",
            self.queue.buffer_usage_percent(),
            self.queue.in_flight_count()
        );

        if self.queue.in_flight_count() == 0 {
            if let Some(stuck) = self.queue.next_command() {
                tracing::warn!(
                    "Command {:?} does not fit the {} byte buffer and cannot be sent",
                    stuck,
                    self.queue.byte_budget()
                );
            }
        }
    }

    fn send_line(&mut self, line: &str) {
        if self.is_uploading_firmware {
            tracing::warn!(
                "{}",
                ControllerError::WriteDuringFirmwareUpload {
                    data: line.to_string()
                }
            );
            return;
        }

        self.track_rates(line);
        if self.echo_flags.file {
            tracing::debug!("sending: {}", line);
            self.echo.record_sent(line);
        }
        self.write_raw(&format!("{}\n", line));
    }

    /// Write without queueing. A write to a closed port is dropped; any other
    /// failure loses the port.
    fn write_raw(&mut self, data: &str) {
        match self.transport.write(data) {
            Ok(()) => {
                tracing::trace!("TX: {:?}", data);
                if self.echo_flags.socket {
                    self.events.publish(MachineEvent::SerialEcho {
                        direction: EchoDirection::Write,
                        data: data.to_string(),
                    });
                }
            }
            Err(Error::Connection(ConnectionError::NotOpen)) => {
                tracing::debug!("Port not open, dropped {:?}", data);
            }
            Err(e) => {
                tracing::error!("Write failed: {}", e);
                self.port_lost(&e.to_string());
            }
        }
    }

    fn track_rates(&mut self, line: &str) {
        let words = gcode::scan(line);

        if let Some(unit) = words.unit {
            self.gcode_unit = unit;
        }
        if let (Some(feed), false) = (words.feed, words.has_z) {
            if self.feed_rate.set_base_rate(feed, self.gcode_unit.feed_unit()) {
                self.report_override_update();
            }
        }
        if let Some(speed) = words.spindle {
            if self.spindle_speed.set_base_rate(speed, "RPM") {
                self.report_override_update();
            }
        }
    }

    fn report_override_update(&mut self) {
        self.events.publish(MachineEvent::OverridesChanged);
        self.events
            .publish(MachineEvent::Overrides(self.current_overrides()));
    }

    // ----- reset -----

    /// Forget the job, every queue and the override percentages
    pub(crate) fn reset(&mut self) {
        tracing::info!("Resetting");
        self.is_running = false;
        self.run_state = RunState::Running;
        self.reset_queue();
        self.job.completed_command_count = 0;
        self.feed_rate.reset();
        self.spindle_speed.reset();
    }

    fn reset_queue(&mut self) {
        self.queue.clear();
        self.echo.clear();
    }

    // ----- clients -----

    /// A client attached
    pub fn add_client(&mut self) {
        self.connected_clients += 1;
        if let Some(id) = self.idle_disconnect.take() {
            self.timers.cancel(id);
        }
    }

    /// A client detached. When the last one leaves the job is stopped and the
    /// port is released after a grace period.
    pub fn remove_client(&mut self) {
        if self.connected_clients == 0 {
            tracing::debug!("Client disconnect with none attached, ignored");
            return;
        }
        self.connected_clients -= 1;
        tracing::info!(
            "Client disconnected ({} remaining)",
            self.connected_clients
        );

        if self.connected_clients == 0 {
            self.stop();
            if let Some(id) = self.idle_disconnect.take() {
                self.timers.cancel(id);
            }
            let delay = self.timings.idle_disconnect_delay();
            self.idle_disconnect = Some(self.schedule(delay, TimerKind::IdleDisconnect));
        }
    }

    /// Release the machine to a client asking for it, unless a job runs
    pub fn acquire(&mut self, timestamp: u64) {
        if !self.is_running {
            self.events.publish(MachineEvent::Release(timestamp));
        }
    }

    // ----- timers -----

    fn start_heartbeat(&mut self) {
        self.stop_heartbeat();
        let interval = self.timings.heartbeat_interval();
        self.heartbeat = Some(self.schedule(interval, TimerKind::Heartbeat));
    }

    fn stop_heartbeat(&mut self) {
        if let Some(id) = self.heartbeat.take() {
            self.timers.cancel(id);
        }
    }

    pub(crate) fn schedule(&mut self, delay: std::time::Duration, kind: TimerKind) -> TimerId {
        let now = self.now();
        self.timers.schedule(now, delay, kind)
    }

    /// Clock time of the earliest pending timer
    pub fn next_timer_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    /// Fire every timer due by now. Returns how many fired.
    pub fn poll_timers(&mut self) -> usize {
        let mut fired = 0;
        while let Some((id, kind)) = self.timers.pop_due(self.now()) {
            fired += 1;
            self.on_timer(id, kind);
        }
        fired
    }

    fn on_timer(&mut self, id: TimerId, kind: TimerKind) {
        match kind {
            TimerKind::Heartbeat => {
                if self.heartbeat == Some(id) {
                    self.start_heartbeat();
                    self.send_instruction("status");
                }
            }
            TimerKind::Stop(stage) => self.advance_stop(stage),
            TimerKind::FirmwareKeepAlive {
                remaining_ms,
                interval_ms,
            } => {
                self.write_raw("\r\n");
                self.keep_bootloader_alive(remaining_ms.saturating_sub(interval_ms), interval_ms);
            }
            TimerKind::IdleDisconnect => {
                self.idle_disconnect = None;
                if self.connected_clients == 0 {
                    tracing::info!("No clients left, disconnecting");
                    self.disconnect();
                }
            }
        }
    }

    // ----- queries -----

    /// Identification banner, while connected
    pub fn machine_identification(&self) -> Option<&str> {
        if self.is_machine_connected {
            self.machine_identification.as_deref()
        } else {
            None
        }
    }

    /// Feed and spindle override state
    pub fn current_overrides(&self) -> OverrideSnapshot {
        OverrideSnapshot {
            feed_rate: self.feed_rate.snapshot(),
            spindle_speed: self.spindle_speed.snapshot(),
        }
    }

    /// Connection summary for clients
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState {
            is_machine_connected: self.is_machine_connected,
            machine_identification: self.machine_identification().map(str::to_string),
            connected_client_count: self.connected_clients,
        }
    }

    /// The command the next fill would send
    pub fn next_command(&self) -> Option<&str> {
        self.queue.next_command()
    }

    /// The command queue
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// The echo ledger
    pub fn echo_ledger(&self) -> &EchoLedger {
        &self.echo
    }

    /// Last known position
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Whether the controller has announced itself on an open port
    pub fn is_connected(&self) -> bool {
        self.is_machine_connected
    }

    /// Whether a firmware upload handshake is in progress
    pub fn is_uploading_firmware(&self) -> bool {
        self.is_uploading_firmware
    }

    /// Number of attached clients
    pub fn connected_clients(&self) -> usize {
        self.connected_clients
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("port", &self.transport.port_name())
            .field("connected", &self.is_machine_connected)
            .field("running", &self.is_running)
            .field("run_state", &self.run_state)
            .field("unprocessed", &self.queue.unprocessed_count())
            .finish_non_exhaustive()
    }
}
