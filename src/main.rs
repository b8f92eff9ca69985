use clap::{Parser, Subcommand};
use serial_events::config::{Config, ConfigLoader};
use serial_events::port::{SystemTransport, Transport};
use serial_events::{logging, ListenOptions, Port, SerialError};
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serial-events",
    version,
    about = "List serial ports, monitor incoming bytes, and send values."
)]
struct Args {
    /// Configuration file (defaults to the standard search locations).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the serial ports present on this system.
    List {
        /// Print the list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print received data as hex until Ctrl+C.
    Monitor {
        /// Port path or configured alias.
        port: String,
        #[arg(short, long)]
        baud: Option<u32>,
        /// Deliver fixed-size chunks of this many bytes instead of single bytes.
        #[arg(short = 'n', long)]
        chunk: Option<usize>,
        /// Also print bytes that were buffered before monitoring started.
        #[arg(long)]
        keep_buffered: bool,
    },
    /// Write a JSON integer or array of integers, one byte per number.
    Send {
        /// Port path or configured alias.
        port: String,
        /// Value to send, e.g. `65` or `[1,2,3]`.
        value: String,
        #[arg(short, long)]
        baud: Option<u32>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Config {
    let loaded = match path {
        Some(path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    };
    match loaded {
        Ok(loader) => loader.into_config(),
        Err(e) => {
            eprintln!("Warning: Failed to load config, using defaults: {}", e);
            ConfigLoader::with_defaults().into_config()
        }
    }
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref());
    logging::init(&config.logging);

    match args.command {
        Command::List { json } => list_ports(json)?,
        Command::Monitor {
            port,
            baud,
            chunk,
            keep_buffered,
        } => {
            let path = config.serial.resolve_port(&port);
            let port = Port::open_with(
                &SystemTransport,
                &path,
                config.serial.port_configuration(baud),
            )?;
            let options =
                ListenOptions::skip_buffered(config.serial.skip_buffered && !keep_buffered);
            monitor(port, chunk, options).await?;
        }
        Command::Send { port, value, baud } => {
            let path = config.serial.resolve_port(&port);
            let value: serde_json::Value = serde_json::from_str(&value)?;
            let port = Port::open_with(
                &SystemTransport,
                &path,
                config.serial.port_configuration(baud),
            )?;
            let written = port.write_json(&value)?;
            println!("Wrote {} byte(s) to {}", written, port.path());
        }
    }

    Ok(())
}

fn list_ports(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ports = SystemTransport.list_port_identifiers()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for id in ports {
        match id.description {
            Some(description) => println!("{}\t{}", id.name, description),
            None => println!("{}", id.name),
        }
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

async fn monitor(
    port: Port,
    chunk: Option<usize>,
    options: ListenOptions,
) -> Result<(), SerialError> {
    let (fault_tx, mut faults) = mpsc::unbounded_channel();
    port.on_error(move |err| {
        let _ = fault_tx.send(err.to_string());
    });

    match chunk {
        Some(n) => port.register(
            serial_events::ChunkFramer::new(n, |chunk| println!("{}", hex(&chunk)))?,
            options,
        )?,
        None => port.register(
            serial_events::ByteFramer::new(|byte| println!("{byte:02X}")),
            options,
        )?,
    };
    info!(port = %port.path(), "Monitoring, press Ctrl+C to stop");

    tokio::select! {
        _ = shutdown_signal() => {}
        Some(reason) = faults.recv() => {
            error!(port = %port.path(), "Monitoring stopped: {}", reason);
        }
    }

    port.close();
    Ok(())
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    eprintln!("\nSignal received, stopping...");
}
