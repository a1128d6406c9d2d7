//! Async driver for a [`Machine`]
//!
//! The machine itself is synchronous. The driver owns it on a tokio task and
//! feeds it one input at a time: client commands from a channel, transport
//! activity from the serial reader, and timers when their deadline passes.

use crate::machine::{FirmwareContinuation, Machine};
use grblstream_communication::{SerialTransport, TransportEvent};
use grblstream_core::{ControllerError, EchoFlags, Error, EventDispatcher, Result};
use grblstream_settings::MachineConfig;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Reply channel for commands that can fail
pub type Reply = oneshot::Sender<Result<()>>;

/// A client request for the machine
pub enum MachineCommand {
    /// Replace the config, disconnecting from any open port
    SetConfig(Box<MachineConfig>),
    /// Merge a partial JSON config into the current one
    UpdateConfig {
        /// Keys to overwrite
        partial: serde_json::Value,
        /// Receives the outcome
        reply: Option<Reply>,
    },
    /// Open a port, closing any previous one first
    InitPort {
        /// Port to open
        port_name: String,
        /// Receives the outcome
        reply: Option<Reply>,
    },
    /// Replace the job and start streaming it
    StreamGcodeLines {
        /// Job lines, in order
        lines: Vec<String>,
        /// Name shown to clients
        project_name: String,
    },
    /// Queue a console command ahead of the job
    EnqueueCommand(String),
    /// Send named instructions from the config
    Execute(Vec<String>),
    /// Feed hold
    Pause,
    /// Release a feed hold
    Resume,
    /// Run the staged stop
    Stop,
    /// A client asks for the machine; answered with a release event
    Acquire(u64),
    /// Ask the controller for its settings
    RequestSettings,
    /// Ask the controller for its build information
    ReportBuildInfo,
    /// Publish the current job status
    ReportJobStatus,
    /// Put the controller in its bootloader and release the port.
    /// Uses the `firmwareUpload` section of the current config.
    BeginFirmwareUpload {
        /// Runs once the port is released
        continuation: FirmwareContinuation,
        /// Receives the outcome of the precondition check
        reply: Option<Reply>,
    },
    /// The external uploader finished
    EndFirmwareUpload,
    /// A client attached
    AddClient,
    /// A client detached
    RemoveClient,
    /// Choose which traffic is echoed to clients
    SetEchoFlags(EchoFlags),
}

impl std::fmt::Debug for MachineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SetConfig(_) => "SetConfig",
            Self::UpdateConfig { .. } => "UpdateConfig",
            Self::InitPort { .. } => "InitPort",
            Self::StreamGcodeLines { .. } => "StreamGcodeLines",
            Self::EnqueueCommand(_) => "EnqueueCommand",
            Self::Execute(_) => "Execute",
            Self::Pause => "Pause",
            Self::Resume => "Resume",
            Self::Stop => "Stop",
            Self::Acquire(_) => "Acquire",
            Self::RequestSettings => "RequestSettings",
            Self::ReportBuildInfo => "ReportBuildInfo",
            Self::ReportJobStatus => "ReportJobStatus",
            Self::BeginFirmwareUpload { .. } => "BeginFirmwareUpload",
            Self::EndFirmwareUpload => "EndFirmwareUpload",
            Self::AddClient => "AddClient",
            Self::RemoveClient => "RemoveClient",
            Self::SetEchoFlags(_) => "SetEchoFlags",
        };
        f.write_str(name)
    }
}

fn respond(reply: Option<Reply>, result: Result<()>) {
    if let Some(reply) = reply {
        // The requester may have stopped waiting
        let _ = reply.send(result);
    }
}

/// Apply one command to the machine
pub fn apply_command(machine: &mut Machine, command: MachineCommand) {
    tracing::debug!("Command: {:?}", command);
    match command {
        MachineCommand::SetConfig(config) => machine.set_config(*config),
        MachineCommand::UpdateConfig { partial, reply } => {
            respond(reply, machine.update_config(&partial))
        }
        MachineCommand::InitPort { port_name, reply } => {
            respond(reply, machine.init_port(&port_name))
        }
        MachineCommand::StreamGcodeLines {
            lines,
            project_name,
        } => machine.stream_gcode_lines(lines, project_name),
        MachineCommand::EnqueueCommand(line) => machine.enqueue_command(line),
        MachineCommand::Execute(instructions) => machine.execute(&instructions),
        MachineCommand::Pause => machine.pause(),
        MachineCommand::Resume => machine.resume(),
        MachineCommand::Stop => machine.stop(),
        MachineCommand::Acquire(timestamp) => machine.acquire(timestamp),
        MachineCommand::RequestSettings => machine.request_settings(),
        MachineCommand::ReportBuildInfo => machine.report_build_info(),
        MachineCommand::ReportJobStatus => machine.report_job_status(),
        MachineCommand::BeginFirmwareUpload {
            continuation,
            reply,
        } => {
            let upload = machine
                .config()
                .and_then(|config| config.firmware_upload.clone());
            let result = match upload {
                Some(upload) => machine.begin_firmware_upload(continuation, &upload),
                None => {
                    tracing::error!("No firmware upload configuration");
                    Err(ControllerError::InvalidInput {
                        reason: "config has no firmwareUpload section".to_string(),
                    }
                    .into())
                }
            };
            respond(reply, result);
        }
        MachineCommand::EndFirmwareUpload => machine.end_firmware_upload(),
        MachineCommand::AddClient => machine.add_client(),
        MachineCommand::RemoveClient => machine.remove_client(),
        MachineCommand::SetEchoFlags(flags) => machine.set_echo_flags(flags),
    }
}

/// Run `machine` until shutdown or until every command sender is dropped
pub async fn run(
    mut machine: Machine,
    mut commands: mpsc::Receiver<MachineCommand>,
    mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    mut shutdown: mpsc::Receiver<()>,
) {
    let mut transport_alive = true;

    loop {
        let wait = machine
            .next_timer_deadline()
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(machine.now())));

        tokio::select! {
            _ = shutdown.recv() => break,
            command = commands.recv() => match command {
                Some(command) => apply_command(&mut machine, command),
                None => break,
            },
            event = transport_events.recv(), if transport_alive => match event {
                Some(event) => machine.handle_transport_event(event),
                None => transport_alive = false,
            },
            _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {
                machine.poll_timers();
            }
        }
    }

    tracing::info!("Machine driver stopping");
    machine.disconnect();
}

/// Handle to a machine running on its own task
pub struct MachineHandle {
    commands: mpsc::Sender<MachineCommand>,
    shutdown: mpsc::Sender<()>,
    events: EventDispatcher,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MachineHandle {
    /// Spawn `machine` fed by `transport_events`. Must be called within a
    /// tokio runtime.
    pub fn spawn(
        machine: Machine,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(100);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let events = machine.events().clone();

        let task = tokio::spawn(run(machine, cmd_rx, transport_events, shutdown_rx));

        Self {
            commands: cmd_tx,
            shutdown: shutdown_tx,
            events,
            task: Mutex::new(Some(task)),
        }
    }

    /// Spawn a machine on a serial port transport
    pub fn spawn_serial(events: EventDispatcher) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let machine = Machine::new(Box::new(SerialTransport::new(event_tx))).with_events(events);
        Self::spawn(machine, event_rx)
    }

    /// Events published by the machine
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Queue a command for the machine
    pub async fn send(&self, command: MachineCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::other("machine driver has stopped"))
    }

    async fn request(&self, build: impl FnOnce(Reply) -> MachineCommand) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| Error::other("machine driver dropped the request"))?
    }

    /// Open a serial port and wait for the outcome
    pub async fn init_port(&self, port_name: impl Into<String>) -> Result<()> {
        let port_name = port_name.into();
        self.request(|reply| MachineCommand::InitPort {
            port_name,
            reply: Some(reply),
        })
        .await
    }

    /// Merge a partial config and wait for the outcome
    pub async fn update_config(&self, partial: serde_json::Value) -> Result<()> {
        self.request(|reply| MachineCommand::UpdateConfig {
            partial,
            reply: Some(reply),
        })
        .await
    }

    /// Start the bootloader handshake and wait for it to be accepted
    pub async fn begin_firmware_upload(&self, continuation: FirmwareContinuation) -> Result<()> {
        self.request(|reply| MachineCommand::BeginFirmwareUpload {
            continuation,
            reply: Some(reply),
        })
        .await
    }

    /// Stop the driver, disconnecting the machine, and wait for it to finish
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(()).await;
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("Machine driver task failed: {}", e);
            }
        }
    }
}
