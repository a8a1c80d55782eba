//! `From`/`TryFrom` implementations bridging `refill_config` types to
//! `refill_core` types.
use crate::button::DebouncedButton;
use crate::config::TimingCfg;
use crate::error::BuildError;
use crate::presenter::DisplayPresenter;
use crate::volume::CalibrationFactor;

impl From<&refill_config::Config> for TimingCfg {
    fn from(c: &refill_config::Config) -> Self {
        Self {
            dispense_poll_ms: c.timing.dispense_poll_ms,
            idle_poll_ms: c.timing.idle_poll_ms,
            flow_sample_ms: c.timing.flow_sample_ms,
            cool_down_ms: c.dosing.cool_down_ms,
        }
    }
}

impl TryFrom<&refill_config::CalibrationCfg> for CalibrationFactor {
    type Error = BuildError;
    fn try_from(c: &refill_config::CalibrationCfg) -> Result<Self, Self::Error> {
        Self::new(c.ml_per_pulse)
    }
}

impl TryFrom<&refill_config::Calibration> for CalibrationFactor {
    type Error = BuildError;
    fn try_from(c: &refill_config::Calibration) -> Result<Self, Self::Error> {
        Self::new(c.ml_per_pulse)
    }
}

impl From<&refill_config::ButtonCfg> for DebouncedButton {
    fn from(c: &refill_config::ButtonCfg) -> Self {
        Self::new(c.debounce_n, c.active_low)
    }
}

impl From<&refill_config::DisplayCfg> for DisplayPresenter {
    fn from(c: &refill_config::DisplayCfg) -> Self {
        Self::new(c.title.clone())
    }
}
