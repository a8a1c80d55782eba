//! Main-loop drivers around `DosingController`.
//!
//! All loops are cooperative: poll, step, sleep one tick on the controller's
//! clock. A shared shutdown flag is checked every tick and the relay is
//! always left off when a loop returns.
use crate::button::DebouncedButton;
use crate::controller::DosingController;
use crate::counter::PulseCount;
use crate::error::Result;
use crate::flow::{FlowMeter, FlowRate};
use crate::hw_error::map_hw_error;
use crate::presenter::{DisplayPresenter, FrameSink};
use crate::state::DoseReport;
use crate::status::DosingStatus;
use crate::volume::{CalibrationFactor, estimate};
use refill_traits::{ButtonInput, Clock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Button-triggered dosing loop.
///
/// Runs until `shutdown` is set or `max_cycles` cycles have re-armed.
/// `on_report` is called once per finished cycle. Returns the number of
/// finished cycles.
pub fn run(
    controller: &mut DosingController,
    button: &mut dyn ButtonInput,
    debouncer: &mut DebouncedButton,
    flow: &mut FlowMeter,
    shutdown: &AtomicBool,
    max_cycles: Option<u64>,
    mut on_report: impl FnMut(&DoseReport),
) -> Result<u64> {
    let clock = controller.clock();
    let factor = controller.factor();
    let mut cycles = 0u64;
    tracing::info!(
        target_ml = controller.target_ml(),
        ml_per_pulse = factor.ml_per_pulse(),
        max_cycles,
        "waiting for button"
    );

    let result = loop {
        if shutdown.load(Ordering::Acquire) {
            tracing::info!(cycles, "shutdown requested");
            break Ok(cycles);
        }
        let edge = match button.is_high() {
            Ok(level) => debouncer.poll(level),
            Err(e) => {
                break Err(
                    eyre::Report::new(map_hw_error(e.as_ref())).wrap_err("reading start button"),
                );
            }
        };
        match controller.step(edge) {
            Ok(DosingStatus::Started) => flow.rebase(clock.now()),
            Ok(DosingStatus::Dispensing { volume_ml }) => {
                if let Some(rate) = flow.poll(clock.now()) {
                    log_rate(&rate, factor, volume_ml);
                }
            }
            Ok(DosingStatus::Rearmed(report)) => {
                cycles += 1;
                flow.rebase(clock.now());
                on_report(&report);
                if max_cycles.is_some_and(|m| cycles >= m) {
                    break Ok(cycles);
                }
            }
            Ok(_) => {}
            Err(e) => break Err(e),
        }
        controller.pace();
    };

    finish(controller, result)
}

/// Run a single cycle immediately, without the button.
///
/// Returns `None` when interrupted by `shutdown` before the cool-down ended.
pub fn dose_once(
    controller: &mut DosingController,
    shutdown: &AtomicBool,
) -> Result<Option<DoseReport>> {
    if !controller.start()? {
        eyre::bail!("a dosing cycle is already in progress");
    }
    let result = loop {
        if shutdown.load(Ordering::Acquire) {
            tracing::warn!("dose interrupted");
            break Ok(None);
        }
        controller.pace();
        match controller.step(None) {
            Ok(DosingStatus::Rearmed(report)) => break Ok(Some(report)),
            Ok(_) => {}
            Err(e) => break Err(e),
        }
    };
    finish(controller, result)
}

fn finish<T>(controller: &mut DosingController, result: Result<T>) -> Result<T> {
    match (controller.shutdown(), result) {
        (Ok(()), r) => r,
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(first)) => {
            tracing::warn!(error = %e, "relay off failed after loop error");
            Err(first)
        }
    }
}

fn log_rate(rate: &FlowRate, factor: CalibrationFactor, volume_ml: f64) {
    tracing::debug!(
        pps = rate.pulses_per_sec,
        ml_per_min = rate.ml_per_min(factor),
        volume_ml,
        "flow"
    );
}

/// One flow-monitor reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSample {
    pub rate: FlowRate,
    pub total_pulses: PulseCount,
    pub total_ml: f64,
}

/// Flow monitor mode: samples the counter every interval and shows rate,
/// volume and pulse totals. The relay is never touched.
pub struct Monitor {
    meter: FlowMeter,
    factor: CalibrationFactor,
    presenter: DisplayPresenter,
    sink: FrameSink,
    poll: Duration,
}

impl Monitor {
    /// `poll` is the loop tick (the idle poll period in the CLI); the
    /// sampling interval itself belongs to `meter`.
    pub fn new(
        meter: FlowMeter,
        factor: CalibrationFactor,
        presenter: DisplayPresenter,
        sink: FrameSink,
        poll: Duration,
    ) -> Self {
        Self {
            meter,
            factor,
            presenter,
            sink,
            poll: poll.max(Duration::from_millis(1)),
        }
    }

    /// Poll until `shutdown` is set or `duration` has elapsed on `clock`.
    /// Returns the number of samples taken.
    pub fn run(
        &mut self,
        clock: &dyn Clock,
        shutdown: &AtomicBool,
        duration: Option<Duration>,
        mut on_sample: impl FnMut(&MonitorSample),
    ) -> usize {
        let started = clock.now();
        let mut samples = 0usize;
        self.sink.show(self.presenter.render_waiting());
        tracing::info!(
            interval_ms = self.meter.interval().as_millis() as u64,
            poll_ms = self.poll.as_millis() as u64,
            "flow monitor started"
        );

        while !shutdown.load(Ordering::Acquire) {
            let now = clock.now();
            if let Some(rate) = self.meter.poll(now) {
                let total_pulses = self.meter.last_sample().map_or(0, |s| s.pulses);
                let sample = MonitorSample {
                    rate,
                    total_pulses,
                    total_ml: estimate(total_pulses, self.factor),
                };
                samples += 1;
                tracing::info!(
                    pps = rate.pulses_per_sec,
                    pulses = total_pulses,
                    volume_ml = sample.total_ml,
                    "flow sample"
                );
                self.sink.show(self.presenter.render_monitor(
                    rate.pulses_per_sec,
                    sample.total_ml,
                    total_pulses,
                ));
                on_sample(&sample);
            }
            if duration.is_some_and(|d| now.saturating_duration_since(started) >= d) {
                break;
            }
            clock.sleep(self.poll);
        }
        samples
    }
}
