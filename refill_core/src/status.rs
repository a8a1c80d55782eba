//! Outcome of one controller tick.
use crate::counter::PulseCount;
use crate::state::DoseReport;

#[derive(Debug, Clone, PartialEq)]
pub enum DosingStatus {
    /// Waiting for a press.
    Idle,
    /// A press started a new cycle; the relay is on.
    Started,
    /// Still below target.
    Dispensing { volume_ml: f64 },
    /// Target reached on this tick; the relay is off.
    Completed { pulses: PulseCount, volume_ml: f64 },
    /// Waiting out the cool-down.
    CoolingDown,
    /// Cool-down over; counter reset and trigger re-armed.
    Rearmed(DoseReport),
}
