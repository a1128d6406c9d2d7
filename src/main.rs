use anyhow::{bail, Context};
use clap::Parser;
use grblstream::{
    default_config_path, init_logging, list_ports, EventDispatcher, MachineCommand,
    MachineConfig, MachineEvent, MachineHandle, VendorQuirk, BUILD_DATE, VERSION,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// How long to wait for the controller banner after opening the port
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "grblstream", version, about = "Stream gcode to a GRBL controller")]
struct Cli {
    /// Machine configuration (JSON or TOML). Defaults to machine.json in
    /// the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Serial port the controller is attached to
    #[arg(required_unless_present = "list_ports")]
    port: Option<String>,
    /// Gcode file to stream once connected
    gcode_file: Option<PathBuf>,
    /// List serial ports that look like CNC controllers and exit
    #[arg(long)]
    list_ports: bool,
}

fn read_job(path: &Path) -> anyhow::Result<(Vec<String>, String)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let lines = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Unknown".to_string());
    Ok((lines, name))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging()?;
    tracing::info!("grblstream {} (built {})", VERSION, BUILD_DATE);

    if cli.list_ports {
        for port in list_ports(&[VendorQuirk::ftdi_spoof()])? {
            println!("{}\t{}", port.port_name, port.description);
        }
        return Ok(());
    }

    let Some(port) = cli.port else {
        bail!("a serial port is required");
    };
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = MachineConfig::load_from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let job = cli.gcode_file.as_deref().map(read_job).transpose()?;

    let handle = MachineHandle::spawn_serial(EventDispatcher::default());
    let mut events = handle.events().receiver();

    handle
        .send(MachineCommand::SetConfig(Box::new(config)))
        .await?;
    handle.init_port(port.clone()).await?;
    handle.send(MachineCommand::AddClient).await?;

    let connected = tokio::time::timeout(CONNECT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(MachineEvent::Connected) => return Ok(()),
                Ok(MachineEvent::PortLost(diagnostic)) => bail!("{}", diagnostic.sender_note),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => bail!("machine driver stopped"),
            }
        }
    })
    .await;
    match connected {
        Ok(result) => result?,
        Err(_) => {
            handle.shutdown().await;
            bail!("no controller answered on {}", port);
        }
    }

    let streaming = job.is_some();
    if let Some((lines, project_name)) = job {
        handle
            .send(MachineCommand::StreamGcodeLines {
                lines,
                project_name,
            })
            .await?;
    }

    let mut finished = false;
    let mut stopping = false;
    while !finished {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !stopping => {
                tracing::info!("Interrupted, stopping");
                stopping = true;
                handle.send(MachineCommand::Stop).await?;
                if !streaming {
                    finished = true;
                }
            }
            event = events.recv() => match event {
                Ok(MachineEvent::Running(percent)) => tracing::info!("{:.1}% complete", percent),
                Ok(MachineEvent::RunTime(run_time)) => {
                    tracing::info!("Ran for {} ms", run_time.end.saturating_sub(run_time.start));
                    // Ready comes back once the job has finished
                    handle.send(MachineCommand::ReportJobStatus).await?;
                }
                Ok(MachineEvent::Ready) if stopping => finished = true,
                Ok(MachineEvent::Ready) if streaming => finished = true,
                Ok(MachineEvent::GrblAlarm(alarm)) => tracing::warn!("{}", alarm),
                Ok(MachineEvent::PortLost(diagnostic)) => {
                    handle.shutdown().await;
                    bail!("lost the controller: {}", diagnostic.sender_note);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => finished = true,
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
