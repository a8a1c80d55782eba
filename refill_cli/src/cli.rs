//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "refill", version, about = "Refill dosing controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/refill_config.toml")]
    pub config: PathBuf,

    /// Optional calibration CSV (strict header); overrides calibration.ml_per_pulse
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Wait for the start button and dose once per press
    Run {
        /// Stop after this many finished cycles (default: run until Ctrl-C)
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
    },
    /// Dispense one dose now, without the button
    Dose {
        /// Target volume in ml (default: dosing.target_ml from the config)
        #[arg(long, value_name = "ML")]
        ml: Option<f64>,
    },
    /// Flow monitor: print rate and totals every sample interval
    Monitor {
        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long, value_name = "S")]
        seconds: Option<u64>,
    },
    /// Validate config and calibration and bring up peripherals
    SelfCheck,
}
