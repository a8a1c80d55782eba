//! Text screens for the status display.
//!
//! `DisplayPresenter` is a pure mapping from controller state to lines.
//! `FrameSink` owns the actual display and keeps its failures away from the
//! dosing logic.
use crate::counter::PulseCount;
use crate::state::DosingState;
use refill_traits::Display;

pub const DEFAULT_TITLE: &str = "Refil-Sustentavel";

#[derive(Debug, Clone)]
pub struct DisplayPresenter {
    title: String,
}

impl Default for DisplayPresenter {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE)
    }
}

impl DisplayPresenter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn status_label(state: &DosingState) -> &'static str {
        match state {
            DosingState::Idle => "Ready",
            DosingState::Dispensing { .. } => "Dispensing...",
            DosingState::Complete { .. } => "Complete!",
        }
    }

    /// Title, status, target and current volume.
    pub fn render(&self, state: &DosingState, target_ml: f64, current_ml: f64) -> Vec<String> {
        vec![
            self.title.clone(),
            format!("Status: {}", Self::status_label(state)),
            format!("Target: {target_ml:.0} ml"),
            format!("Volume: {current_ml:.1} ml"),
        ]
    }

    /// Flow monitor screen: last rate, total volume and total pulses.
    pub fn render_monitor(&self, rate_hz: f64, volume_ml: f64, pulses: PulseCount) -> Vec<String> {
        vec![
            "Flow Monitor".to_string(),
            "-".repeat(16),
            format!("Flow: {rate_hz:.0} Hz"),
            format!("Volume: {volume_ml:.1}ml"),
            format!("Pulses: {pulses}"),
        ]
    }

    /// Shown by the flow monitor before the first sample.
    pub fn render_waiting(&self) -> Vec<String> {
        vec!["Waiting for flow".to_string()]
    }
}

/// Display wrapper that skips unchanged frames and swallows failures.
///
/// The first failure is logged at warn, later ones at debug so a missing
/// display does not flood the log at the dispense poll rate.
pub struct FrameSink {
    display: Box<dyn Display>,
    last: Option<Vec<String>>,
    failures: u64,
}

impl FrameSink {
    pub fn new(display: Box<dyn Display>) -> Self {
        Self {
            display,
            last: None,
            failures: 0,
        }
    }

    pub fn show(&mut self, lines: Vec<String>) {
        if self.last.as_ref() == Some(&lines) {
            return;
        }
        match self.display.show(&lines) {
            Ok(()) => self.last = Some(lines),
            Err(e) => {
                self.failures += 1;
                // keep `last` stale so the frame is retried next tick
                self.last = None;
                if self.failures == 1 {
                    tracing::warn!(error = %e, "display update failed; continuing without display");
                } else {
                    tracing::debug!(error = %e, failures = self.failures, "display update failed");
                }
            }
        }
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("last", &self.last)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{FailingDisplay, RecordingDisplay};

    #[test]
    fn idle_screen() {
        let p = DisplayPresenter::default();
        let lines = p.render(&DosingState::Idle, 100.0, 0.0);
        assert_eq!(
            lines,
            vec![
                "Refil-Sustentavel".to_string(),
                "Status: Ready".to_string(),
                "Target: 100 ml".to_string(),
                "Volume: 0.0 ml".to_string(),
            ]
        );
    }

    #[test]
    fn status_follows_state() {
        let p = DisplayPresenter::new("T");
        let d = p.render(&DosingState::Dispensing { pulses_at_start: 0 }, 250.0, 99.94);
        assert_eq!(d[1], "Status: Dispensing...");
        assert_eq!(d[2], "Target: 250 ml");
        assert_eq!(d[3], "Volume: 99.9 ml");
        let c = p.render(&DosingState::Complete { final_pulses: 46 }, 100.0, 102.12);
        assert_eq!(c[1], "Status: Complete!");
        assert_eq!(c[3], "Volume: 102.1 ml");
    }

    #[test]
    fn monitor_screen() {
        let lines = DisplayPresenter::default().render_monitor(45.0, 210.9, 95);
        assert_eq!(lines[0], "Flow Monitor");
        assert_eq!(lines[2], "Flow: 45 Hz");
        assert_eq!(lines[3], "Volume: 210.9ml");
        assert_eq!(lines[4], "Pulses: 95");
    }

    #[test]
    fn sink_skips_repeated_frames() {
        let rec = RecordingDisplay::new();
        let frames = rec.frames();
        let mut sink = FrameSink::new(Box::new(rec));
        sink.show(vec!["a".into()]);
        sink.show(vec!["a".into()]);
        sink.show(vec!["b".into()]);
        assert_eq!(frames.lock().unwrap().len(), 2);
    }

    #[test]
    fn sink_counts_failures_without_panicking() {
        let mut sink = FrameSink::new(Box::new(FailingDisplay));
        sink.show(vec!["a".into()]);
        sink.show(vec!["a".into()]);
        assert_eq!(sink.failures(), 2);
    }
}
