//! Peripheral backends for the refill controller.
//!
//! Simulated relay, button and flow sensor are always available; the
//! `hardware` feature adds Raspberry Pi GPIO implementations via rppal.
pub mod display;
pub mod error;
pub mod flow_sim;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hardware;
pub mod util;

pub use display::TextGridDisplay;
pub use flow_sim::SimulatedFlowSensor;

use refill_traits::{ButtonInput, Clock, PeripheralError, Relay};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Shared on/off state of the simulated pump line.
///
/// The relay writes it, the simulated flow sensor reads it to decide whether
/// liquid is moving.
#[derive(Debug, Clone, Default)]
pub struct PumpLine(Arc<AtomicBool>);

impl PumpLine {
    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, on: bool) {
        self.0.store(on, Ordering::Release);
    }
}

/// Simulated relay implementation
#[derive(Debug, Default)]
pub struct SimulatedRelay {
    line: PumpLine,
    switches: Arc<AtomicU32>,
}

impl SimulatedRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the pump line driven by this relay.
    pub fn line(&self) -> PumpLine {
        self.line.clone()
    }

    /// Shared counter of on/off transitions, readable after the relay has
    /// been moved into the controller.
    pub fn switch_counter(&self) -> Arc<AtomicU32> {
        self.switches.clone()
    }
}

impl Relay for SimulatedRelay {
    fn set(&mut self, on: bool) -> Result<(), PeripheralError> {
        if self.line.is_on() != on {
            self.switches.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(on, "relay switched (simulated)");
        }
        self.line.set(on);
        Ok(())
    }
}

/// Simulated push button with pull-up wiring: the line reads low while a
/// scripted press window is active.
pub struct SimulatedButton {
    presses: Vec<(Duration, Duration)>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

impl SimulatedButton {
    /// A button that is never pressed.
    pub fn released(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self::with_presses(clock, Vec::new())
    }

    /// A button pressed during each `(start, hold)` window, measured from now.
    pub fn with_presses(
        clock: Arc<dyn Clock + Send + Sync>,
        presses: Vec<(Duration, Duration)>,
    ) -> Self {
        let epoch = clock.now();
        Self {
            presses,
            clock,
            epoch,
        }
    }

    fn pressed_now(&self) -> bool {
        let t = self.clock.now().saturating_duration_since(self.epoch);
        self.presses
            .iter()
            .any(|&(start, hold)| t >= start && t < start.saturating_add(hold))
    }
}

impl ButtonInput for SimulatedButton {
    fn is_high(&mut self) -> Result<bool, PeripheralError> {
        Ok(!self.pressed_now())
    }
}
