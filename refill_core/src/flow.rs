//! Flow-rate sampling from the shared pulse counter.
//!
//! Rates always divide by the measured elapsed time between two snapshots,
//! never by the nominal interval, so a main loop that runs late does not
//! accumulate drift.
use crate::counter::{PulseCount, PulseCounter};
use crate::error::SamplingError;
use crate::volume::CalibrationFactor;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A counter snapshot and the moment it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSample {
    pub at: Instant,
    pub pulses: PulseCount,
}

impl FlowSample {
    pub fn take(counter: &PulseCounter, at: Instant) -> Self {
        Self {
            at,
            pulses: counter.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowRate {
    /// Pulses counted over the window
    pub pulses: PulseCount,
    /// Measured window length
    pub elapsed: Duration,
    pub pulses_per_sec: f64,
}

impl FlowRate {
    pub fn ml_per_sec(&self, factor: CalibrationFactor) -> f64 {
        self.pulses_per_sec * factor.ml_per_pulse()
    }

    pub fn ml_per_min(&self, factor: CalibrationFactor) -> f64 {
        self.ml_per_sec(factor) * 60.0
    }
}

/// Rate between two samples, `later` taken after `earlier`.
pub fn rate_between(earlier: FlowSample, later: FlowSample) -> Result<FlowRate, SamplingError> {
    if later.at < earlier.at {
        return Err(SamplingError::ClockWentBackwards);
    }
    let elapsed = later.at.duration_since(earlier.at);
    if elapsed.is_zero() {
        return Err(SamplingError::ZeroElapsed);
    }
    let pulses = later.pulses.wrapping_sub(earlier.pulses);
    Ok(FlowRate {
        pulses,
        elapsed,
        pulses_per_sec: f64::from(pulses) / elapsed.as_secs_f64(),
    })
}

/// Periodic flow sampler over the shared counter.
///
/// Reads the counter independently of the dosing state machine; it never
/// resets it.
#[derive(Debug)]
pub struct FlowMeter {
    counter: Arc<PulseCounter>,
    interval: Duration,
    last: Option<FlowSample>,
}

impl FlowMeter {
    pub fn new(counter: Arc<PulseCounter>, interval: Duration) -> Self {
        Self {
            counter,
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Most recent counter snapshot taken by the meter.
    pub fn last_sample(&self) -> Option<FlowSample> {
        self.last
    }

    /// Take a sample if at least one interval has elapsed since the previous
    /// one. The first call only records the baseline.
    ///
    /// Sampling errors are logged and the sample is skipped.
    pub fn poll(&mut self, now: Instant) -> Option<FlowRate> {
        let Some(last) = self.last else {
            self.rebase(now);
            return None;
        };
        if now.saturating_duration_since(last.at) < self.interval {
            return None;
        }
        let sample = FlowSample::take(&self.counter, now);
        match rate_between(last, sample) {
            Ok(rate) => {
                self.last = Some(sample);
                tracing::trace!(
                    pulses = rate.pulses,
                    pps = rate.pulses_per_sec,
                    elapsed_ms = rate.elapsed.as_millis() as u64,
                    "flow sample"
                );
                Some(rate)
            }
            Err(SamplingError::ZeroElapsed) => {
                tracing::debug!("flow sample skipped: zero elapsed time");
                None
            }
            Err(e @ SamplingError::ClockWentBackwards) => {
                tracing::debug!(error = %e, "flow sample skipped; rebasing");
                self.last = Some(sample);
                None
            }
        }
    }

    /// Restart the window from the current count, e.g. after the counter was
    /// reset by the dosing cycle.
    pub fn rebase(&mut self, now: Instant) {
        self.last = Some(FlowSample::take(&self.counter, now));
    }
}
