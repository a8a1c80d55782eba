//! Start-button debouncing.
//!
//! The raw GPIO level bounces for a few milliseconds on every press. A press
//! is accepted only after `threshold` consecutive pressed polls, and the
//! button re-arms only after the same number of consecutive released polls,
//! so one physical press yields exactly one [`PressEdge`].

/// A debounced press: released -> pressed, reported once per press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressEdge;

#[derive(Debug, Clone)]
pub struct DebouncedButton {
    threshold: u8,
    active_low: bool,
    latched: bool,
    count: u8,
}

impl DebouncedButton {
    /// `threshold` is clamped to at least 1. With `active_low` a low level
    /// means pressed (pull-up wiring).
    pub fn new(threshold: u8, active_low: bool) -> Self {
        Self {
            threshold: threshold.max(1),
            active_low,
            latched: false,
            count: 0,
        }
    }

    /// Feed one raw level (`true` = high). Returns an edge on the poll that
    /// completes a stable press.
    pub fn poll(&mut self, raw_high: bool) -> Option<PressEdge> {
        let pressed = raw_high != self.active_low;
        if self.latched {
            if pressed {
                self.count = 0;
            } else {
                self.count = self.count.saturating_add(1);
                if self.count >= self.threshold {
                    self.latched = false;
                    self.count = 0;
                    tracing::trace!("button released");
                }
            }
            return None;
        }

        if !pressed {
            self.count = 0;
            return None;
        }
        self.count = self.count.saturating_add(1);
        if self.count >= self.threshold {
            self.latched = true;
            self.count = 0;
            tracing::debug!("button press");
            return Some(PressEdge);
        }
        None
    }

    /// True while a press has been accepted and not yet released.
    pub fn is_pressed(&self) -> bool {
        self.latched
    }
}
