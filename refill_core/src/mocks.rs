//! Stand-in peripherals for headless runs and tests.
use refill_traits::{Display, PeripheralError, Relay};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Display that accepts and discards every frame; used when the real display
/// failed to initialize or is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn show(&mut self, _lines: &[String]) -> Result<(), PeripheralError> {
        Ok(())
    }
}

/// Display that always errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingDisplay;

impl Display for FailingDisplay {
    fn show(&mut self, _lines: &[String]) -> Result<(), PeripheralError> {
        Err(Box::new(std::io::Error::other("display unplugged")))
    }
}

pub type Frames = Arc<Mutex<Vec<Vec<String>>>>;

/// Display that keeps every frame it was asked to show.
#[derive(Debug, Default, Clone)]
pub struct RecordingDisplay {
    frames: Frames,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the recorded frames.
    pub fn frames(&self) -> Frames {
        self.frames.clone()
    }
}

impl Display for RecordingDisplay {
    fn show(&mut self, lines: &[String]) -> Result<(), PeripheralError> {
        if let Ok(mut f) = self.frames.lock() {
            f.push(lines.to_vec());
        }
        Ok(())
    }
}

/// Relay that records every accepted command; `fail_on` makes that command
/// error, either forever or for the first `fail_times` attempts.
#[derive(Debug, Default, Clone)]
pub struct RecordingRelay {
    commands: Arc<Mutex<Vec<bool>>>,
    failures: Arc<AtomicU32>,
    fail_on: Option<bool>,
    fail_times: Option<u32>,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(on: bool) -> Self {
        Self {
            fail_on: Some(on),
            ..Self::default()
        }
    }

    /// Fail the first `times` commands equal to `on`, then accept them.
    pub fn failing_on_times(on: bool, times: u32) -> Self {
        Self {
            fail_on: Some(on),
            fail_times: Some(times),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Arc<Mutex<Vec<bool>>> {
        self.commands.clone()
    }

    /// Number of rejected commands so far.
    pub fn failures(&self) -> Arc<AtomicU32> {
        self.failures.clone()
    }
}

impl Relay for RecordingRelay {
    fn set(&mut self, on: bool) -> Result<(), PeripheralError> {
        if self.fail_on == Some(on) {
            let failed = self.failures.load(Ordering::Acquire);
            if self.fail_times.is_none_or(|n| failed < n) {
                self.failures.fetch_add(1, Ordering::AcqRel);
                return Err(Box::new(std::io::Error::other("relay driver fault")));
            }
        }
        if let Ok(mut c) = self.commands.lock() {
            c.push(on);
        }
        Ok(())
    }
}
