//! Subcommand execution: controller assembly, loops and report output.

use crate::cli::JSON_MODE;
use crate::peripherals::{Peripherals, make_peripherals};
use refill_config::Config;
use refill_core::{
    CalibrationFactor, DebouncedButton, DisplayPresenter, DoseReport, DosingController,
    FlowMeter, FrameSink, Monitor, MonitorSample, PulseCounter, TimingCfg, pulses_for,
};
use refill_traits::{Clock, Display, MonotonicClock, Relay};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

fn clock() -> Arc<dyn Clock + Send + Sync> {
    Arc::new(MonotonicClock::new())
}

fn build_controller(
    cfg: &Config,
    factor: CalibrationFactor,
    target_ml: f64,
    relay: Box<dyn Relay>,
    display: Box<dyn Display>,
    counter: Arc<PulseCounter>,
    clock: Arc<dyn Clock + Send + Sync>,
) -> eyre::Result<DosingController> {
    DosingController::builder()
        .with_relay(relay)
        .with_target_ml(target_ml)
        .with_boxed_display(display)
        .with_presenter(DisplayPresenter::from(&cfg.display))
        .with_counter(counter)
        .with_clock(clock)
        .with_calibration(factor)
        .with_timing(TimingCfg::from(cfg))
        .build()
}

pub fn print_report(report: &DoseReport) {
    if json_mode() {
        println!(
            "{}",
            json!({
                "event": "dose",
                "target_ml": report.target_ml,
                "volume_ml": report.volume_total_ml,
                "volume_at_stop_ml": report.volume_at_stop_ml,
                "pulses": report.pulses_total,
                "pulses_at_stop": report.pulses_at_stop,
                "coast_pulses": report.coast_pulses(),
                "overshoot_ml": report.overshoot_ml(),
                "dispense_ms": report.dispense_time.as_millis() as u64,
            })
        );
    } else {
        println!(
            "Dose complete: {:.1} ml (target {:.0} ml, {} pulses, {} after stop, {:.1} s)",
            report.volume_total_ml,
            report.target_ml,
            report.pulses_total,
            report.coast_pulses(),
            report.dispense_time.as_secs_f64()
        );
    }
}

fn print_sample(s: &MonitorSample, factor: CalibrationFactor) {
    if json_mode() {
        println!(
            "{}",
            json!({
                "event": "flow",
                "pps": s.rate.pulses_per_sec,
                "ml_per_min": s.rate.ml_per_min(factor),
                "pulses": s.total_pulses,
                "volume_ml": s.total_ml,
            })
        );
    } else {
        println!(
            "Flow: {:.0} Hz | Total pulses: {} | Total volume: {:.2} ml",
            s.rate.pulses_per_sec, s.total_pulses, s.total_ml
        );
    }
}

/// `refill run`: button-triggered loop.
pub fn run_loop(
    cfg: &Config,
    factor: CalibrationFactor,
    cycles: Option<u64>,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    let counter = Arc::new(PulseCounter::new());
    let clock = clock();
    let Peripherals {
        relay,
        mut button,
        display,
        edges: _edges,
        ..
    } = make_peripherals(cfg, counter.clone(), clock.clone(), false)?;
    let mut ctrl = build_controller(
        cfg,
        factor,
        cfg.dosing.target_ml,
        relay,
        display,
        counter.clone(),
        clock,
    )?;
    let mut debouncer = DebouncedButton::from(&cfg.button);
    let mut flow = FlowMeter::new(counter, TimingCfg::from(cfg).flow_sample());

    let done = refill_core::run(
        &mut ctrl,
        button.as_mut(),
        &mut debouncer,
        &mut flow,
        shutdown,
        cycles,
        print_report,
    )?;
    tracing::info!(cycles = done, "run finished");
    Ok(())
}

/// `refill dose`: one cycle now.
pub fn run_dose(
    cfg: &Config,
    factor: CalibrationFactor,
    ml: Option<f64>,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    let target_ml = ml.unwrap_or(cfg.dosing.target_ml);
    let counter = Arc::new(PulseCounter::new());
    let clock = clock();
    let Peripherals {
        relay,
        display,
        edges: _edges,
        ..
    } = make_peripherals(cfg, counter.clone(), clock.clone(), false)?;
    let mut ctrl = build_controller(cfg, factor, target_ml, relay, display, counter, clock)?;

    match refill_core::dose_once(&mut ctrl, shutdown)? {
        Some(report) => {
            print_report(&report);
            Ok(())
        }
        None => eyre::bail!("dose interrupted before completion; relay switched off"),
    }
}

/// `refill monitor`: flow monitor mode.
pub fn run_monitor(
    cfg: &Config,
    factor: CalibrationFactor,
    seconds: Option<u64>,
    shutdown: &AtomicBool,
) -> eyre::Result<()> {
    let counter = Arc::new(PulseCounter::new());
    let clock = clock();
    // the relay is held, not driven: in simulation it was switched on for
    // free flow and must stay that way until the monitor ends
    let Peripherals {
        relay: _relay,
        display,
        edges: _edges,
        ..
    } = make_peripherals(cfg, counter.clone(), clock.clone(), true)?;
    let timing = TimingCfg::from(cfg);
    let mut monitor = Monitor::new(
        FlowMeter::new(counter, timing.flow_sample()),
        factor,
        DisplayPresenter::from(&cfg.display),
        FrameSink::new(display),
        timing.idle_poll(),
    );
    let n = monitor.run(
        clock.as_ref(),
        shutdown,
        seconds.map(Duration::from_secs),
        |s| print_sample(s, factor),
    );
    tracing::info!(samples = n, "monitor finished");
    Ok(())
}

/// `refill self-check`: config and calibration are already validated by the
/// time this runs; bring up peripherals and a controller, then report.
pub fn self_check(cfg: &Config, factor: CalibrationFactor) -> eyre::Result<()> {
    let counter = Arc::new(PulseCounter::new());
    let clock = clock();
    let Peripherals {
        relay,
        display,
        backend,
        edges: _edges,
        ..
    } = make_peripherals(cfg, counter.clone(), clock.clone(), false)?;
    let ctrl = build_controller(
        cfg,
        factor,
        cfg.dosing.target_ml,
        relay,
        display,
        counter,
        clock,
    )?;
    let expected_pulses = pulses_for(ctrl.target_ml(), factor);

    if json_mode() {
        println!(
            "{}",
            json!({
                "status": "ok",
                "backend": backend,
                "ml_per_pulse": factor.ml_per_pulse(),
                "target_ml": ctrl.target_ml(),
                "expected_pulses": expected_pulses,
            })
        );
    } else {
        println!(
            "OK ({backend}): {:.3} ml/pulse, target {:.0} ml = {expected_pulses} pulses",
            factor.ml_per_pulse(),
            ctrl.target_ml()
        );
    }
    Ok(())
}
