//! Lens Bench Controller Monitor
//!
//! Connects to a bench controller, runs the discovery sequence and prints
//! every event until interrupted or the session ends.
//!
//! Usage:
//!   cargo run --example bench_monitor -- [OPTIONS] [PORT]
//!
//! Options:
//!   --port PORT       Serial port (default: /dev/ttyUSB0)
//!   --baud RATE       Baud rate (default: 115200)
//!   --timeout MS      Read timeout in ms (default: 100)
//!   --poll MS         Status poll interval in ms, 0 to disable (default: 200)
//!   --list            List serial ports and exit
//!
//! Set RUST_LOG=lensbench_core=debug to see every line on the wire.

use lensbench_core::prelude::*;
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!("Usage: bench_monitor [--port PORT] [--baud RATE] [--timeout MS] [--poll MS] [--list] [PORT]");
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = EngineConfig {
        port_name: "/dev/ttyUSB0".to_string(),
        ..Default::default()
    };
    let mut list_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                if i < args.len() {
                    config.port_name = args[i].clone();
                }
            }
            "--baud" | "-b" => {
                i += 1;
                if i < args.len() {
                    config.baud_rate = args[i].parse()?;
                }
            }
            "--timeout" | "-t" => {
                i += 1;
                if i < args.len() {
                    config.read_timeout_ms = args[i].parse()?;
                }
            }
            "--poll" => {
                i += 1;
                if i < args.len() {
                    config.status_poll_interval_ms = args[i].parse()?;
                }
            }
            "--list" | "-l" => list_only = true,
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            arg if !arg.starts_with('-') => {
                config.port_name = arg.to_string();
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
            }
        }
        i += 1;
    }

    let request = ConnectRequest::from_config(&config);
    let (engine, mut events) = Engine::spawn(config)?;

    if list_only {
        for port in engine.list_ports() {
            println!("{:<20} {}", port.name, port.description);
        }
        return Ok(());
    }

    engine.connect(request)?;

    while let Some(event) = events.blocking_recv() {
        match event {
            EngineEvent::StateChanged(ConnectionState::Connected) => {
                println!("Connected");
                for cmd in gcode::discovery_sequence() {
                    engine.enqueue(cmd)?;
                }
            }
            EngineEvent::StateChanged(state) => {
                println!("State: {}", state);
                if matches!(state, ConnectionState::Disconnected | ConnectionState::Error) {
                    break;
                }
            }
            EngineEvent::Status(status) => {
                let pos: Vec<String> = Axis::ALL
                    .iter()
                    .map(|&axis| match status.position(axis) {
                        Some(v) => format!("{}={:.3}", axis, v),
                        None => format!("{}=?", axis),
                    })
                    .collect();
                let limits: String = Axis::ALL
                    .iter()
                    .filter(|&&axis| status.limit(axis))
                    .map(|axis| axis.letter())
                    .collect();
                println!(
                    "{:<8} {}  limits[{}]  free blocks {}",
                    status.state,
                    pos.join(" "),
                    limits,
                    status
                        .block_buffer_avail()
                        .map_or_else(|| "?".to_string(), |b| b.to_string())
                );
            }
            EngineEvent::Version(version) => {
                let lens = version
                    .lens_class()
                    .map_or_else(|| "unknown".to_string(), |l| l.to_string());
                println!("Firmware {} / lens {}", version.firmware, lens);
            }
            EngineEvent::Error(cause) => {
                eprintln!("Error: {}", cause);
            }
        }
    }

    let config = engine.shutdown()?;
    println!("Last port: {}", config.port_name);
    Ok(())
}
