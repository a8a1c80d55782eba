//! Dosing cycle state and per-cycle report.
use crate::counter::PulseCount;
use std::time::Duration;

/// Where the controller is in its `Idle -> Dispensing -> Complete -> Idle`
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DosingState {
    /// Pump off, waiting for a press.
    #[default]
    Idle,
    /// Pump on. `pulses_at_start` is the counter snapshot taken when the
    /// cycle began.
    Dispensing { pulses_at_start: PulseCount },
    /// Pump off, cooling down. `final_pulses` is the count dispensed since
    /// start on the tick the target was reached.
    Complete { final_pulses: PulseCount },
}

impl DosingState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_dispensing(&self) -> bool {
        matches!(self, Self::Dispensing { .. })
    }
}

/// Summary of one finished cycle, produced when the controller re-arms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseReport {
    pub target_ml: f64,
    /// Pulses since start on the tick the relay was switched off
    pub pulses_at_stop: PulseCount,
    pub volume_at_stop_ml: f64,
    /// Pulses since start at the end of the cool-down, coast included
    pub pulses_total: PulseCount,
    pub volume_total_ml: f64,
    /// Relay on to relay off
    pub dispense_time: Duration,
}

impl DoseReport {
    /// Pulses counted after the relay was switched off.
    pub fn coast_pulses(&self) -> PulseCount {
        self.pulses_total.saturating_sub(self.pulses_at_stop)
    }

    /// Dispensed volume minus target (positive when over).
    pub fn overshoot_ml(&self) -> f64 {
        self.volume_total_ml - self.target_ml
    }
}
