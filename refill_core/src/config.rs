//! Runtime timing configuration for the controller and runner loops.
//!
//! Separate from the TOML-deserialized config in `refill_config`; see
//! `conversions` for the bridge.
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingCfg {
    /// Tick period while dispensing. The pump can run at most one period
    /// past the target, so this bounds the overshoot.
    pub dispense_poll_ms: u64,
    /// Tick period while idle or cooling down.
    pub idle_poll_ms: u64,
    /// Nominal flow-rate sampling interval.
    pub flow_sample_ms: u64,
    /// Time spent in `Complete` before the trigger re-arms.
    pub cool_down_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            dispense_poll_ms: 20,
            idle_poll_ms: 50,
            flow_sample_ms: 1_000,
            cool_down_ms: 5_000,
        }
    }
}

impl TimingCfg {
    pub fn dispense_poll(&self) -> Duration {
        Duration::from_millis(self.dispense_poll_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn flow_sample(&self) -> Duration {
        Duration::from_millis(self.flow_sample_ms)
    }

    pub fn cool_down(&self) -> Duration {
        Duration::from_millis(self.cool_down_ms)
    }
}
