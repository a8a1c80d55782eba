//! Peripheral assembly: simulation by default, rppal GPIO with the
//! `hardware` feature.

use eyre::WrapErr;
use refill_config::{Config, DisplayCfg};
use refill_core::PulseCounter;
use refill_core::hw_error::map_hw_error;
use refill_core::mocks::NullDisplay;
use refill_hardware::TextGridDisplay;
use refill_traits::{ButtonInput, Clock, Display, Relay};
use std::path::Path;
use std::sync::Arc;

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub type EdgeSource = refill_hardware::SimulatedFlowSensor;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub type EdgeSource = refill_hardware::hardware::GpioFlowSensor;

/// Everything the main loop talks to. Keep `edges` alive for as long as
/// pulses should be counted; dropping it stops the simulator thread or
/// disarms the interrupt.
pub struct Peripherals {
    pub relay: Box<dyn Relay>,
    pub button: Box<dyn ButtonInput>,
    pub display: Box<dyn Display>,
    pub backend: &'static str,
    pub edges: EdgeSource,
}

/// Build the display from `[display]`. Failures degrade to a `NullDisplay`;
/// the controller keeps running headless.
pub fn make_display(cfg: &DisplayCfg) -> Box<dyn Display> {
    if !cfg.enabled {
        tracing::info!("display disabled in config");
        return Box::new(NullDisplay);
    }
    match cfg.device.as_deref() {
        None => Box::new(TextGridDisplay::console(cfg.cols, cfg.rows)),
        Some(dev) => match TextGridDisplay::open(Path::new(dev), cfg.cols, cfg.rows) {
            Ok(d) => {
                tracing::info!(device = dev, "display opened");
                Box::new(d)
            }
            Err(e) => {
                let err = map_hw_error(&e);
                tracing::warn!(error = %err, "display unavailable; running headless");
                Box::new(NullDisplay)
            }
        },
    }
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub fn make_peripherals(
    cfg: &Config,
    counter: Arc<PulseCounter>,
    clock: Arc<dyn Clock + Send + Sync>,
    free_flow: bool,
) -> eyre::Result<Peripherals> {
    use refill_hardware::{SimulatedButton, SimulatedFlowSensor, SimulatedRelay};
    use std::time::Duration;

    const SIM_PRESS_HOLD: Duration = Duration::from_millis(300);

    let pulses_per_sec = match std::env::var("REFILL_SIM_PPS") {
        Ok(v) => v
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| eyre::eyre!("REFILL_SIM_PPS must be a positive number, got {v:?}"))?,
        Err(_) => cfg.simulation.pulses_per_sec,
    };

    let mut relay = SimulatedRelay::new();
    let edges = SimulatedFlowSensor::spawn(counter, relay.line(), pulses_per_sec, clock.clone());
    if free_flow {
        // nothing drives the pump in monitor mode; let liquid run
        relay
            .set(true)
            .map_err(|e| eyre::eyre!("simulated relay: {e}"))?;
    }

    let button = match std::env::var("REFILL_SIM_PRESS_MS") {
        Ok(v) => {
            let ms: u64 = v
                .trim()
                .parse()
                .wrap_err_with(|| format!("REFILL_SIM_PRESS_MS must be milliseconds, got {v:?}"))?;
            SimulatedButton::with_presses(clock, vec![(Duration::from_millis(ms), SIM_PRESS_HOLD)])
        }
        Err(_) => SimulatedButton::released(clock),
    };

    tracing::info!(pulses_per_sec, "simulation backend");
    Ok(Peripherals {
        relay: Box::new(relay),
        button: Box::new(button),
        display: make_display(&cfg.display),
        backend: "simulation",
        edges,
    })
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn make_peripherals(
    cfg: &Config,
    counter: Arc<PulseCounter>,
    _clock: Arc<dyn Clock + Send + Sync>,
    _free_flow: bool,
) -> eyre::Result<Peripherals> {
    use refill_hardware::hardware::{GpioButton, GpioFlowSensor, GpioRelay};

    let hw = |e: refill_hardware::error::HwError| eyre::Report::new(map_hw_error(&e));
    let relay = GpioRelay::new(cfg.pins.relay, cfg.pins.relay_active_low)
        .map_err(hw)
        .wrap_err("open relay pin")?;
    let button = GpioButton::new(cfg.pins.button)
        .map_err(hw)
        .wrap_err("open button pin")?;
    let edges = GpioFlowSensor::new(cfg.pins.flow_sensor, counter)
        .map_err(hw)
        .wrap_err("open flow sensor pin")?;

    tracing::info!(
        relay = cfg.pins.relay,
        flow_sensor = cfg.pins.flow_sensor,
        button = cfg.pins.button,
        "gpio backend"
    );
    Ok(Peripherals {
        relay: Box::new(relay),
        button: Box::new(button),
        display: make_display(&cfg.display),
        backend: "gpio",
        edges,
    })
}
