//! Pulse-to-volume conversion.
use crate::counter::PulseCount;
use crate::error::BuildError;

/// Millilitres of liquid represented by one sensor pulse.
///
/// Always finite and strictly positive; the only way to obtain one is
/// through [`CalibrationFactor::new`], so a bad factor is caught at startup
/// rather than at call time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationFactor(f64);

/// Nominal YF-S201 factor (1000 ml over 450 pulses); recalibrate per sensor.
pub const DEFAULT_ML_PER_PULSE: f64 = 2.22;

impl Default for CalibrationFactor {
    fn default() -> Self {
        Self(DEFAULT_ML_PER_PULSE)
    }
}

impl CalibrationFactor {
    pub fn new(ml_per_pulse: f64) -> Result<Self, BuildError> {
        if ml_per_pulse.is_finite() && ml_per_pulse > 0.0 {
            Ok(Self(ml_per_pulse))
        } else {
            Err(BuildError::InvalidConfig("calibration factor must be > 0"))
        }
    }

    #[inline]
    pub fn ml_per_pulse(self) -> f64 {
        self.0
    }
}

/// Volume in ml for `pulses` at `factor`.
#[inline]
pub fn estimate(pulses: PulseCount, factor: CalibrationFactor) -> f64 {
    f64::from(pulses) * factor.0
}

/// Smallest pulse count whose estimate reaches `target_ml`.
///
/// Informational (logs, reports); the controller itself compares volumes.
pub fn pulses_for(target_ml: f64, factor: CalibrationFactor) -> PulseCount {
    if !(target_ml.is_finite() && target_ml > 0.0) {
        return 0;
    }
    let mut n = (target_ml / factor.0).floor();
    if n >= f64::from(PulseCount::MAX) {
        return PulseCount::MAX;
    }
    // step over float rounding at the boundary
    while f64::from(n as PulseCount) * factor.0 < target_ml {
        n += 1.0;
    }
    n as PulseCount
}
