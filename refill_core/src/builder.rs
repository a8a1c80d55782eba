//! Type-state builder for `DosingController`.
//!
//! `build()` is only available once the relay and the target volume are
//! set; `try_build()` is available in any state and reports what is missing.
use std::marker::PhantomData;
use std::sync::Arc;

use refill_traits::{Clock, Display, MonotonicClock, Relay};

use crate::config::TimingCfg;
use crate::controller::DosingController;
use crate::counter::PulseCounter;
use crate::error::{BuildError, Result};
use crate::mocks::NullDisplay;
use crate::presenter::{DisplayPresenter, FrameSink};
use crate::state::DosingState;
use crate::volume::CalibrationFactor;

pub struct Missing;
pub struct Set;

pub struct DosingControllerBuilder<R, T> {
    relay: Option<Box<dyn Relay>>,
    target_ml: Option<f64>,
    display: Option<Box<dyn Display>>,
    presenter: Option<DisplayPresenter>,
    counter: Option<Arc<PulseCounter>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    factor: Option<CalibrationFactor>,
    timing: Option<TimingCfg>,
    _r: PhantomData<R>,
    _t: PhantomData<T>,
}

impl Default for DosingControllerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            relay: None,
            target_ml: None,
            display: None,
            presenter: None,
            counter: None,
            clock: None,
            factor: None,
            timing: None,
            _r: PhantomData,
            _t: PhantomData,
        }
    }
}

impl DosingController {
    pub fn builder() -> DosingControllerBuilder<Missing, Missing> {
        DosingControllerBuilder::default()
    }
}

impl<R, T> DosingControllerBuilder<R, T> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<DosingController> {
        let relay = self
            .relay
            .ok_or_else(|| eyre::Report::new(BuildError::MissingRelay))?;
        let target_ml = self
            .target_ml
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTarget))?;
        if !(target_ml.is_finite() && target_ml > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "target volume must be > 0",
            )));
        }

        let timing = self.timing.unwrap_or_default();
        if timing.dispense_poll_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "dispense_poll_ms must be >= 1",
            )));
        }
        if timing.idle_poll_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "idle_poll_ms must be >= 1",
            )));
        }

        let display = self.display.unwrap_or_else(|| Box::new(NullDisplay));
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        Ok(DosingController {
            relay,
            sink: FrameSink::new(display),
            presenter: self.presenter.unwrap_or_default(),
            counter: self.counter.unwrap_or_default(),
            clock,
            factor: self.factor.unwrap_or_default(),
            target_ml,
            timing,
            state: DosingState::Idle,
            cycle_start: 0,
            started_at: None,
            completed_at: None,
            relay_on: false,
            relay_off_failures: 0,
        })
    }

    pub fn with_display(mut self, display: impl Display + 'static) -> Self {
        self.display = Some(Box::new(display));
        self
    }
    pub fn with_boxed_display(mut self, display: Box<dyn Display>) -> Self {
        self.display = Some(display);
        self
    }
    pub fn with_presenter(mut self, presenter: DisplayPresenter) -> Self {
        self.presenter = Some(presenter);
        self
    }
    /// Share an existing counter, e.g. one already wired to an edge source.
    pub fn with_counter(mut self, counter: Arc<PulseCounter>) -> Self {
        self.counter = Some(counter);
        self
    }
    /// Defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
    pub fn with_calibration(mut self, factor: CalibrationFactor) -> Self {
        self.factor = Some(factor);
        self
    }
    pub fn with_timing(mut self, timing: TimingCfg) -> Self {
        self.timing = Some(timing);
        self
    }
    pub fn with_cool_down_ms(mut self, ms: u64) -> Self {
        let mut t = self.timing.unwrap_or_default();
        t.cool_down_ms = ms;
        self.timing = Some(t);
        self
    }
}

impl<T> DosingControllerBuilder<Missing, T> {
    pub fn with_relay(self, relay: impl Relay + 'static) -> DosingControllerBuilder<Set, T> {
        DosingControllerBuilder {
            relay: Some(Box::new(relay)),
            target_ml: self.target_ml,
            display: self.display,
            presenter: self.presenter,
            counter: self.counter,
            clock: self.clock,
            factor: self.factor,
            timing: self.timing,
            _r: PhantomData,
            _t: PhantomData,
        }
    }
}

impl<R> DosingControllerBuilder<R, Missing> {
    pub fn with_target_ml(self, ml: f64) -> DosingControllerBuilder<R, Set> {
        DosingControllerBuilder {
            relay: self.relay,
            target_ml: Some(ml),
            display: self.display,
            presenter: self.presenter,
            counter: self.counter,
            clock: self.clock,
            factor: self.factor,
            timing: self.timing,
            _r: PhantomData,
            _t: PhantomData,
        }
    }
}

impl DosingControllerBuilder<Set, Set> {
    /// Validate and build. Only available when relay and target are set.
    pub fn build(self) -> Result<DosingController> {
        self.try_build()
    }
}
