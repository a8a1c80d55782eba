mod cli;
mod commands;
mod error_fmt;
mod peripherals;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use eyre::WrapErr;
use refill_config::{Config, Logging};
use refill_core::{CalibrationFactor, RefillError};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        tracing::error!(error = %e, "exiting with error");
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging);
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let factor = resolve_factor(&cfg, cli.calibration.as_deref())?;
    let shutdown = install_ctrlc()?;

    match cli.cmd {
        Commands::Run { cycles } => commands::run_loop(&cfg, factor, cycles, &shutdown),
        Commands::Dose { ml } => commands::run_dose(&cfg, factor, ml, &shutdown),
        Commands::Monitor { seconds } => commands::run_monitor(&cfg, factor, seconds, &shutdown),
        Commands::SelfCheck => commands::self_check(&cfg, factor),
    }
}

fn config_error(msg: String) -> eyre::Report {
    eyre::Report::new(RefillError::Config(msg))
}

/// Read, parse and validate the TOML config. Every failure here is a
/// configuration error and stops the process before the main loop.
fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| config_error(format!("read {}: {e}", path.display())))?;
    let cfg = refill_config::load_toml(&text)
        .map_err(|e| config_error(format!("parse {}: {e}", path.display())))?;
    cfg.validate()
        .map_err(|e| config_error(format!("invalid configuration: {e}")))?;
    Ok(cfg)
}

/// Calibration CSV wins over `calibration.ml_per_pulse` when given.
fn resolve_factor(cfg: &Config, csv: Option<&Path>) -> eyre::Result<CalibrationFactor> {
    let factor = match csv {
        Some(path) => {
            let cal = refill_config::load_calibration_csv(path)
                .map_err(|e| config_error(format!("{e}")))?;
            tracing::info!(
                ml_per_pulse = cal.ml_per_pulse,
                rows_used = cal.rows_used,
                path = %path.display(),
                "calibration loaded"
            );
            CalibrationFactor::try_from(&cal)
        }
        None => CalibrationFactor::try_from(&cfg.calibration),
    };
    factor.map_err(|e| config_error(e.to_string()))
}

fn install_ctrlc() -> eyre::Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Release);
    })
    .wrap_err("installing Ctrl-C handler")?;
    Ok(shutdown)
}

fn init_tracing(json: bool, level: &str, logging: &Logging) {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    // console logs go to stderr; stdout carries reports only
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };
    layers.push(console);

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "refill.log".into(), |n| n.to_string_lossy().into_owned());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_filter = EnvFilter::new(logging.level.as_deref().unwrap_or("info"));
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    let _ = tracing_subscriber::registry().with(layers).try_init();
}
