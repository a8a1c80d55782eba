#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Flow metering and dosing logic (hardware-agnostic).
//!
//! Sensor edges land in a shared [`PulseCounter`] from interrupt context;
//! a single cooperative main loop reads it through atomic snapshots,
//! converts pulses to millilitres with a [`CalibrationFactor`] and drives
//! the [`DosingController`] state machine. All peripherals are reached
//! through the traits in `refill_traits`.
//!
//! ## Modules
//!
//! - `counter`: torn-read-safe pulse accumulator
//! - `volume`: pulse/volume conversion
//! - `flow`: flow-rate samples from the same counter
//! - `button`: start-button debouncing
//! - `controller` / `builder`: the `Idle -> Dispensing -> Complete` machine
//! - `presenter`: display text and failure isolation
//! - `runner`: button loop, one-shot dose, flow monitor
//!
//! Dosing accuracy is bounded by the dispense poll period; see the
//! [`controller`] module docs.
pub mod builder;
pub mod button;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod counter;
pub mod error;
pub mod flow;
pub mod hw_error;
pub mod mocks;
pub mod presenter;
pub mod runner;
pub mod state;
pub mod status;
pub mod volume;

pub use builder::DosingControllerBuilder;
pub use button::{DebouncedButton, PressEdge};
pub use config::TimingCfg;
pub use controller::{DosingController, RELAY_OFF_ATTEMPTS};
pub use counter::{PulseCount, PulseCounter};
pub use error::{BuildError, RefillError, Report, Result, SamplingError};
pub use flow::{FlowMeter, FlowRate, FlowSample, rate_between};
pub use presenter::{DisplayPresenter, FrameSink};
pub use runner::{Monitor, MonitorSample, dose_once, run};
pub use state::{DoseReport, DosingState};
pub use status::DosingStatus;
pub use volume::{CalibrationFactor, estimate, pulses_for};
