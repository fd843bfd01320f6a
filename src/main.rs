//! uartlink - command-line front end of the uartlink library
//!
//! Usage:
//!   uartlink list [--json]                       List serial ports
//!   uartlink monitor --port P [--hex]            Print received bytes, forward stdin
//!   uartlink send --port P DATA                  Send a string and flush
//!   uartlink pins --port P                       Print modem status lines
//!   uartlink config [--write]                    Show or write the effective config

mod cli;

use clap::Parser;
use cli::{Cli, Command, PortArgs};
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uartlink::config::config_path;
use uartlink::constants::{
    CHANNEL_CAPACITY, MONITOR_POLL_MS, MONITOR_READ_SIZE, MONITOR_STATUS_SECS,
};
use uartlink::logging::init_tracing;
use uartlink::{Config, Pin, PortSettings, Result, UartContext, UartError};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref());

    // Create tokio runtime
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: cannot start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::List { json } => list(&config, json),
        Command::Monitor {
            port,
            hex,
            timestamps,
        } => rt.block_on(monitor(config, &port, hex, timestamps)),
        Command::Send { port, data } => send(&config, &port, &data),
        Command::Pins { port } => pins(&config, &port),
        Command::Config { write } => show_config(&config, cli.config.as_deref(), write),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Resolve device name and line settings: command line over config
fn resolve(config: &Config, args: &PortArgs) -> Result<(String, PortSettings)> {
    let mut port = config.port.clone();
    if let Some(name) = &args.port {
        port.name = name.clone();
    }
    if let Some(baud) = args.baud {
        port.baud = baud;
    }
    if let Some(options) = &args.options {
        port.options = options.clone();
    }
    if port.name.is_empty() {
        return Err(UartError::ConfigValidation {
            field: "port",
            reason: "no port given (use --port or set [port] name)".into(),
        });
    }
    let settings = port.settings()?;
    Ok((port.name, settings))
}

/// Print the effective config, optionally writing it to the config file
fn show_config(config: &Config, path: Option<&Path>, write: bool) -> Result<()> {
    print!("{}", config.to_toml()?);
    if write {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };
        config.save(&path)?;
        eprintln!("Written to {}", path.display());
    }
    Ok(())
}

fn list(config: &Config, json: bool) -> Result<()> {
    let ctx = UartContext::with_config(config)?;
    let devices = ctx.devices()?;

    if json {
        let text = serde_json::to_string_pretty(&devices).map_err(|e| {
            UartError::ConfigValidation {
                field: "json",
                reason: e.to_string(),
            }
        })?;
        println!("{}", text);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No serial ports found");
    }
    for device in devices {
        match (device.vid, device.pid) {
            (Some(vid), Some(pid)) => println!(
                "{:<20} {:<9} {:04x}:{:04x} {}",
                device.name,
                device.kind,
                vid,
                pid,
                device.product.as_deref().unwrap_or("")
            ),
            _ => println!("{:<20} {}", device.name, device.kind),
        }
    }
    Ok(())
}

fn send(config: &Config, args: &PortArgs, data: &str) -> Result<()> {
    let (name, settings) = resolve(config, args)?;
    let ctx = UartContext::with_config(config)?;
    let mut dev = ctx.open(&name, settings)?;
    dev.puts(data)?;
    dev.flush()?;
    dev.close()
}

fn pins(config: &Config, args: &PortArgs) -> Result<()> {
    let (name, settings) = resolve(config, args)?;
    let ctx = UartContext::with_config(config)?;
    let mut dev = ctx.open(&name, settings)?;
    for pin in Pin::INPUTS {
        let level = dev.get_pin(pin)?;
        println!("{:<4} {}", pin, if level { "high" } else { "low" });
    }
    dev.close()
}

/// Format one received chunk for the terminal
fn render(data: &[u8], hex: bool, timestamps: bool) -> String {
    let mut out = String::new();
    if timestamps {
        out.push_str(&chrono::Local::now().format("[%H:%M:%S%.3f] ").to_string());
    }
    if hex {
        let bytes: Vec<String> = data.iter().map(|b| format!("{:02X}", b)).collect();
        out.push_str(&bytes.join(" "));
        out.push('\n');
    } else {
        out.push_str(&String::from_utf8_lossy(data));
    }
    out
}

async fn monitor(mut config: Config, args: &PortArgs, hex: bool, timestamps: bool) -> Result<()> {
    let (name, settings) = resolve(&config, args)?;
    config.transport.threaded = true;

    let ctx = UartContext::with_config(&config)?;
    let mut dev = ctx.open(&name, settings.clone())?;
    eprintln!("Monitoring {} @ {} (Ctrl-C to quit)", name, settings);

    // Plain thread: tokio stdin blocks runtime shutdown
    let (line_tx, mut line_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
        debug!("stdin closed");
    });

    let mut poll = tokio::time::interval(Duration::from_millis(MONITOR_POLL_MS));
    let mut status = tokio::time::interval(Duration::from_secs(MONITOR_STATUS_SECS));
    let stats = dev.stats().unwrap_or_default();
    let mut last = stats.snapshot();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stdout = std::io::stdout();

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            Some(line) = line_rx.recv() => {
                if let Err(e) = dev.puts(&line).and_then(|()| dev.putc(b'\n')) {
                    warn!("{}", e);
                }
            }
            _ = poll.tick() => {
                match dev.recv_bytes(MONITOR_READ_SIZE) {
                    Ok(data) if data.is_empty() => {}
                    Ok(data) => {
                        let _ = stdout.write_all(render(&data, hex, timestamps).as_bytes());
                        let _ = stdout.flush();
                    }
                    Err(e) => break Err(e),
                }
            }
            _ = status.tick() => {
                let now = stats.snapshot();
                let (tx_rate, rx_rate) = now.rates_since(&last);
                debug!("{}: rx {:.2} KiB/s, tx {:.2} KiB/s", name, rx_rate, tx_rate);
                last = now;
            }
        }
    };

    let total = stats.snapshot();
    let (tx_rate, rx_rate) = total.average_rates();
    eprintln!(
        "\n{}: {} bytes received ({:.2} KiB/s), {} bytes sent ({:.2} KiB/s)",
        name, total.rx_bytes, rx_rate, total.tx_bytes, tx_rate
    );
    dev.close()?;
    result
}
