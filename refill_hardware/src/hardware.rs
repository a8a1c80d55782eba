//! Raspberry Pi GPIO peripherals (rppal).
use crate::error::{HwError, Result};
use refill_traits::{ButtonInput, EdgeSink, PeripheralError, Relay};
use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use std::sync::Arc;

fn open_gpio() -> Result<Gpio> {
    Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))
}

/// Pump relay module on a GPIO output.
pub struct GpioRelay {
    pin: OutputPin,
    active_low: bool,
}

impl GpioRelay {
    /// Claims the pin and drives it to the "off" level immediately so the
    /// pump never starts on boot.
    pub fn new(pin: u8, active_low: bool) -> Result<Self> {
        let mut out = open_gpio()?
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("open relay pin {pin}: {e}")))?
            .into_output();
        out.write(off_level(active_low));
        Ok(Self {
            pin: out,
            active_low,
        })
    }
}

fn off_level(active_low: bool) -> Level {
    if active_low { Level::High } else { Level::Low }
}

impl Relay for GpioRelay {
    fn set(&mut self, on: bool) -> std::result::Result<(), PeripheralError> {
        let level = if on == self.active_low {
            Level::Low
        } else {
            Level::High
        };
        self.pin.write(level);
        tracing::trace!(on, "relay level written");
        Ok(())
    }
}

impl Drop for GpioRelay {
    fn drop(&mut self) {
        self.pin.write(off_level(self.active_low));
    }
}

/// Start button wired to ground with the internal pull-up enabled.
pub struct GpioButton {
    pin: InputPin,
}

impl GpioButton {
    pub fn new(pin: u8) -> Result<Self> {
        let input = open_gpio()?
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("open button pin {pin}: {e}")))?
            .into_input_pullup();
        Ok(Self { pin: input })
    }
}

impl ButtonInput for GpioButton {
    fn is_high(&mut self) -> std::result::Result<bool, PeripheralError> {
        Ok(self.pin.is_high())
    }
}

/// Hall-effect flow sensor (YF-S201 style) on a GPIO input.
///
/// Every rising edge is delivered to the sink from rppal's interrupt thread.
/// The pin must stay alive for the interrupt to remain registered.
pub struct GpioFlowSensor {
    _pin: InputPin,
}

impl GpioFlowSensor {
    pub fn new(pin: u8, sink: Arc<dyn EdgeSink>) -> Result<Self> {
        let mut input = open_gpio()?
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("open flow sensor pin {pin}: {e}")))?
            .into_input();
        input
            .set_async_interrupt(Trigger::RisingEdge, move |_level: Level| sink.on_edge())
            .map_err(|e| HwError::Gpio(format!("flow sensor interrupt on pin {pin}: {e}")))?;
        tracing::info!(pin, "flow sensor interrupt armed (rising edge)");
        Ok(Self { _pin: input })
    }
}
