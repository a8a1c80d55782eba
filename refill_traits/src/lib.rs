//! Collaborator interfaces shared by the dosing core and the peripheral backends.
//!
//! The core never talks to GPIO or a display directly; it only sees these traits.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type PeripheralError = Box<dyn std::error::Error + Send + Sync>;

/// Pump relay. Fire-and-forget: there is no feedback line.
pub trait Relay {
    fn set(&mut self, on: bool) -> Result<(), PeripheralError>;
}

/// Raw digital level of the start button, before any debouncing.
pub trait ButtonInput {
    fn is_high(&mut self) -> Result<bool, PeripheralError>;
}

/// Small text-grid display. `show` draws the lines and commits the frame.
pub trait Display {
    fn show(&mut self, lines: &[String]) -> Result<(), PeripheralError>;
}

/// Receiver of flow sensor edges.
///
/// Called from interrupt or callback context; implementations must be
/// increment-only and never block.
pub trait EdgeSink: Send + Sync {
    fn on_edge(&self);
}

impl<T: Relay + ?Sized> Relay for Box<T> {
    fn set(&mut self, on: bool) -> Result<(), PeripheralError> {
        (**self).set(on)
    }
}

impl<T: ButtonInput + ?Sized> ButtonInput for Box<T> {
    fn is_high(&mut self) -> Result<bool, PeripheralError> {
        (**self).is_high()
    }
}

impl<T: Display + ?Sized> Display for Box<T> {
    fn show(&mut self, lines: &[String]) -> Result<(), PeripheralError> {
        (**self).show(lines)
    }
}
