//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Portable UART access tool
#[derive(Parser, Debug)]
#[command(name = "uartlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: uartlink.toml next to the executable)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Device selection and line settings shared by subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct PortArgs {
    /// Serial port to use (overrides config)
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<String>,

    /// Baud rate (overrides config)
    #[arg(short, long, value_name = "BAUD")]
    pub baud: Option<u32>,

    /// Frame format <data><parity><stop><flow>, e.g. 8N1N (overrides config)
    #[arg(short, long, value_name = "OPTIONS")]
    pub options: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print received bytes and forward stdin lines until Ctrl-C
    Monitor {
        #[command(flatten)]
        port: PortArgs,

        /// Print received bytes as hex
        #[arg(long)]
        hex: bool,

        /// Prefix every received chunk with a timestamp
        #[arg(long)]
        timestamps: bool,
    },

    /// Send a string and wait until it left the host
    Send {
        #[command(flatten)]
        port: PortArgs,

        /// Text to send
        data: String,
    },

    /// Print modem status lines (CTS, DSR, DCD, RI)
    Pins {
        #[command(flatten)]
        port: PortArgs,
    },

    /// Print the effective config as TOML
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

// =============================================================================
// Tests
// =============================================================================
