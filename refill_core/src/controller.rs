//! The dosing state machine.
//!
//! `Idle -> Dispensing` on a debounced press, `Dispensing -> Complete` on the
//! first tick whose volume reaches the target, `Complete -> Idle` after the
//! cool-down. The controller is open-loop: it only compares a pulse-derived
//! volume against a threshold.
//!
//! # Overshoot
//!
//! The target check runs once per tick, so the pump keeps running for up to
//! one `dispense_poll` period after the threshold pulse, plus whatever
//! coasts through the line once the relay opens. At 30 pulses/s and
//! 2.22 ml/pulse a 20 ms period is worth about 1.3 ml; with a 100 ms period
//! it grows to about 6.7 ml. This is the dominant dosing error, which is why
//! the dispense poll is kept in the tens of milliseconds.
//!
//! # Relay-off failures
//!
//! The cycle never re-arms while the relay may still be on. A failed off
//! command at the threshold is retried on every cool-down tick; after
//! [`RELAY_OFF_ATTEMPTS`] consecutive failures `step` returns
//! `RefillError::HardwareFault` so the caller's loop ends and shuts down.
use crate::button::PressEdge;
use crate::config::TimingCfg;
use crate::counter::{PulseCount, PulseCounter};
use crate::error::{RefillError, Result};
use crate::hw_error::map_hw_error;
use crate::presenter::{DisplayPresenter, FrameSink};
use crate::state::{DoseReport, DosingState};
use crate::status::DosingStatus;
use crate::volume::{CalibrationFactor, estimate, pulses_for};
use eyre::WrapErr;
use refill_traits::{Clock, Relay};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Consecutive failed relay-off commands tolerated before `step` errors.
pub const RELAY_OFF_ATTEMPTS: u32 = 5;

pub struct DosingController {
    pub(crate) relay: Box<dyn Relay>,
    pub(crate) sink: FrameSink,
    pub(crate) presenter: DisplayPresenter,
    pub(crate) counter: Arc<PulseCounter>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) factor: CalibrationFactor,
    pub(crate) target_ml: f64,
    pub(crate) timing: TimingCfg,
    pub(crate) state: DosingState,
    /// Counter snapshot at the start of the current or last cycle
    pub(crate) cycle_start: PulseCount,
    pub(crate) started_at: Option<Instant>,
    pub(crate) completed_at: Option<Instant>,
    pub(crate) relay_on: bool,
    pub(crate) relay_off_failures: u32,
}

impl std::fmt::Debug for DosingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DosingController")
            .field("state", &self.state)
            .field("target_ml", &self.target_ml)
            .field("factor", &self.factor)
            .field("timing", &self.timing)
            .field("relay_on", &self.relay_on)
            .finish_non_exhaustive()
    }
}

impl DosingController {
    pub fn state(&self) -> DosingState {
        self.state
    }

    pub fn target_ml(&self) -> f64 {
        self.target_ml
    }

    pub fn factor(&self) -> CalibrationFactor {
        self.factor
    }

    pub fn timing(&self) -> &TimingCfg {
        &self.timing
    }

    /// Shared counter; hand it to the edge source.
    pub fn counter(&self) -> Arc<PulseCounter> {
        self.counter.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        self.clock.clone()
    }

    pub fn relay_on(&self) -> bool {
        self.relay_on
    }

    pub fn display_failures(&self) -> u64 {
        self.sink.failures()
    }

    /// Volume dispensed in the current cycle (0 when idle).
    pub fn current_volume_ml(&self) -> f64 {
        match self.state {
            DosingState::Idle => 0.0,
            DosingState::Dispensing { pulses_at_start } => {
                estimate(self.counter.since(pulses_at_start), self.factor)
            }
            DosingState::Complete { final_pulses } => estimate(final_pulses, self.factor),
        }
    }

    /// Tick period for the current state.
    pub fn poll_interval(&self) -> Duration {
        if self.state.is_dispensing() {
            self.timing.dispense_poll()
        } else {
            self.timing.idle_poll()
        }
    }

    /// Sleep one tick period on the controller's clock.
    pub fn pace(&self) {
        self.clock.sleep(self.poll_interval());
    }

    /// Begin a cycle without a button press. Returns `false` when a cycle is
    /// already running or cooling down.
    pub fn start(&mut self) -> Result<bool> {
        if !self.state.is_idle() {
            tracing::debug!(state = ?self.state, "start ignored: cycle in progress");
            return Ok(false);
        }
        let now = self.clock.now();
        let pulses_at_start = self.counter.snapshot();
        self.relay
            .set(true)
            .map_err(|e| eyre::Report::new(map_hw_error(e.as_ref())))
            .wrap_err("switching pump relay on")?;
        self.relay_on = true;
        self.cycle_start = pulses_at_start;
        self.started_at = Some(now);
        self.completed_at = None;
        self.state = DosingState::Dispensing { pulses_at_start };
        tracing::info!(
            target_ml = self.target_ml,
            expected_pulses = pulses_for(self.target_ml, self.factor),
            pulses_at_start,
            "dosing started"
        );
        self.render(0.0);
        Ok(true)
    }

    /// One iteration of the main loop. `press` is the debounced button edge
    /// seen on this tick, if any.
    pub fn step(&mut self, press: Option<PressEdge>) -> Result<DosingStatus> {
        match self.state {
            DosingState::Idle => {
                if press.is_some() && self.start()? {
                    return Ok(DosingStatus::Started);
                }
                self.render(0.0);
                Ok(DosingStatus::Idle)
            }
            DosingState::Dispensing { pulses_at_start } => {
                if press.is_some() {
                    tracing::debug!("press ignored while dispensing");
                }
                let pulses = self.counter.since(pulses_at_start);
                let volume_ml = estimate(pulses, self.factor);
                if volume_ml >= self.target_ml {
                    self.finish(pulses, volume_ml);
                    return Ok(DosingStatus::Completed { pulses, volume_ml });
                }
                self.render(volume_ml);
                Ok(DosingStatus::Dispensing { volume_ml })
            }
            DosingState::Complete { final_pulses } => {
                if press.is_some() {
                    tracing::debug!("press ignored during cool-down");
                }
                if self.relay_on && !self.retry_relay_off()? {
                    return Ok(DosingStatus::CoolingDown);
                }
                let now = self.clock.now();
                let since = now.saturating_duration_since(self.completed_at.unwrap_or(now));
                if since >= self.timing.cool_down() {
                    return Ok(DosingStatus::Rearmed(self.rearm(final_pulses)));
                }
                Ok(DosingStatus::CoolingDown)
            }
        }
    }

    /// Switch the relay off and return to idle. Call when the process is
    /// asked to stop.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state.is_dispensing() {
            tracing::warn!(
                volume_ml = self.current_volume_ml(),
                target_ml = self.target_ml,
                "shutdown while dispensing; dose incomplete"
            );
        }
        self.relay
            .set(false)
            .map_err(|e| eyre::Report::new(map_hw_error(e.as_ref())))
            .wrap_err("switching pump relay off")?;
        self.relay_on = false;
        self.relay_off_failures = 0;
        self.state = DosingState::Idle;
        tracing::info!("controller shut down; relay off");
        Ok(())
    }

    fn finish(&mut self, pulses: PulseCount, volume_ml: f64) {
        if !self.relay_off_best_effort() {
            tracing::warn!("relay still on; retrying during cool-down");
        }
        let now = self.clock.now();
        self.completed_at = Some(now);
        self.state = DosingState::Complete {
            final_pulses: pulses,
        };
        tracing::info!(
            pulses,
            volume_ml,
            target_ml = self.target_ml,
            relay_on = self.relay_on,
            "target reached"
        );
        self.render(volume_ml);
    }

    fn rearm(&mut self, final_pulses: PulseCount) -> DoseReport {
        let snap = self.counter.snapshot();
        let carried = self.counter.reset_from(snap);
        let pulses_total = snap.wrapping_sub(self.cycle_start);
        let dispense_time = match (self.started_at, self.completed_at) {
            (Some(s), Some(c)) => c.saturating_duration_since(s),
            _ => Duration::ZERO,
        };
        let report = DoseReport {
            target_ml: self.target_ml,
            pulses_at_stop: final_pulses,
            volume_at_stop_ml: estimate(final_pulses, self.factor),
            pulses_total,
            volume_total_ml: estimate(pulses_total, self.factor),
            dispense_time,
        };
        if carried > 0 {
            tracing::trace!(carried, "edges after reset snapshot kept");
        }
        self.state = DosingState::Idle;
        self.cycle_start = 0;
        self.started_at = None;
        self.completed_at = None;
        tracing::info!(
            pulses = report.pulses_total,
            coast_pulses = report.coast_pulses(),
            volume_ml = report.volume_total_ml,
            dispense_ms = report.dispense_time.as_millis() as u64,
            "cycle finished; trigger re-armed"
        );
        self.render(0.0);
        report
    }

    /// Returns whether the relay is now off.
    fn relay_off_best_effort(&mut self) -> bool {
        match self.relay.set(false) {
            Ok(()) => {
                self.relay_on = false;
                self.relay_off_failures = 0;
                true
            }
            Err(e) => {
                self.relay_off_failures += 1;
                let err = map_hw_error(e.as_ref());
                tracing::warn!(
                    error = %err,
                    attempt = self.relay_off_failures,
                    "relay off failed"
                );
                false
            }
        }
    }

    fn retry_relay_off(&mut self) -> Result<bool> {
        if self.relay_off_best_effort() {
            tracing::info!("relay off after retry");
            return Ok(true);
        }
        if self.relay_off_failures >= RELAY_OFF_ATTEMPTS {
            return Err(eyre::Report::new(RefillError::HardwareFault(format!(
                "pump relay did not switch off after {} attempts",
                self.relay_off_failures
            ))));
        }
        Ok(false)
    }

    fn render(&mut self, current_ml: f64) {
        let lines = self
            .presenter
            .render(&self.state, self.target_ml, current_ml);
        self.sink.show(lines);
    }
}

impl Drop for DosingController {
    fn drop(&mut self) {
        if self.relay_on {
            let _ = self.relay_off_best_effort();
        }
    }
}
