//! Whole cycles driven through the runner loops, with a clock that lets
//! liquid flow while the simulated relay is on.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use refill_core::mocks::RecordingDisplay;
use refill_core::{
    CalibrationFactor, DebouncedButton, DisplayPresenter, DoseReport, DosingController,
    FlowMeter, FrameSink, Monitor, PulseCounter, TimingCfg, dose_once, run,
};
use refill_hardware::{PumpLine, SimulatedButton, SimulatedRelay};
use refill_traits::{Clock, ManualClock};

/// Manual clock that emits `pulses_per_sec` edges while the pump line is on.
struct PumpedClock {
    clock: ManualClock,
    counter: Arc<PulseCounter>,
    line: PumpLine,
    pulses_per_sec: u64,
    carry_ns: Mutex<u128>,
}

impl Clock for PumpedClock {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn sleep(&self, d: Duration) {
        if self.line.is_on() {
            let mut carry = self.carry_ns.lock().unwrap();
            *carry += d.as_nanos() * u128::from(self.pulses_per_sec);
            while *carry >= 1_000_000_000 {
                self.counter.on_edge();
                *carry -= 1_000_000_000;
            }
        }
        self.clock.advance(d);
    }
}

struct Bench {
    ctrl: DosingController,
    clock: ManualClock,
    counter: Arc<PulseCounter>,
    line: PumpLine,
    switches: Arc<std::sync::atomic::AtomicU32>,
}

fn bench(cool_down_ms: u64) -> Bench {
    let clock = ManualClock::new();
    let counter = Arc::new(PulseCounter::new());
    let relay = SimulatedRelay::new();
    let line = relay.line();
    let switches = relay.switch_counter();
    let pumped = PumpedClock {
        clock: clock.clone(),
        counter: counter.clone(),
        line: line.clone(),
        // one edge per 20 ms dispense tick
        pulses_per_sec: 50,
        carry_ns: Mutex::new(0),
    };
    let ctrl = DosingController::builder()
        .with_relay(relay)
        .with_target_ml(100.0)
        .with_calibration(CalibrationFactor::new(2.22).unwrap())
        .with_counter(counter.clone())
        .with_clock(Arc::new(pumped))
        .with_timing(TimingCfg {
            cool_down_ms,
            ..TimingCfg::default()
        })
        .build()
        .unwrap();
    Bench {
        ctrl,
        clock,
        counter,
        line,
        switches,
    }
}

#[test]
fn dose_once_stops_within_one_poll_of_threshold() {
    let mut b = bench(0);
    let t0 = b.clock.now();
    let stop = AtomicBool::new(false);
    let report = dose_once(&mut b.ctrl, &stop).unwrap().unwrap();

    assert_eq!(report.pulses_at_stop, 46);
    assert_eq!(report.pulses_total, 46);
    assert_eq!(report.coast_pulses(), 0);
    // the 46th edge lands on the 46th 20 ms tick and is seen on that tick
    assert_eq!(report.dispense_time, Duration::from_millis(46 * 20));
    assert!(b.clock.ms_since(t0) >= 46 * 20);
    assert!(!b.line.is_on());
    assert_eq!(b.switches.load(Ordering::Relaxed), 2);
    assert_eq!(b.counter.snapshot(), 0);
}

#[test]
fn dose_once_honours_shutdown() {
    let mut b = bench(5_000);
    let stop = AtomicBool::new(true);
    assert!(dose_once(&mut b.ctrl, &stop).unwrap().is_none());
    assert!(!b.line.is_on());
    assert!(b.ctrl.state().is_idle());
}

#[test]
fn button_loop_runs_requested_cycles() {
    let mut b = bench(1_000);
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(b.clock.clone());
    let mut button = SimulatedButton::with_presses(
        clock,
        vec![
            (Duration::from_millis(100), Duration::from_millis(200)),
            // held through the first cool-down: must not start a cycle early
            (Duration::from_millis(1_500), Duration::from_millis(800)),
            (Duration::from_millis(4_000), Duration::from_millis(200)),
        ],
    );
    let mut debouncer = DebouncedButton::new(3, true);
    let mut flow = FlowMeter::new(b.ctrl.counter(), Duration::from_millis(1_000));
    let stop = AtomicBool::new(false);
    let mut reports: Vec<DoseReport> = Vec::new();

    let cycles = run(
        &mut b.ctrl,
        &mut button,
        &mut debouncer,
        &mut flow,
        &stop,
        Some(2),
        |r| reports.push(*r),
    )
    .unwrap();

    assert_eq!(cycles, 2);
    assert_eq!(reports.len(), 2);
    for r in &reports {
        assert_eq!(r.pulses_at_stop, 46);
        assert!(r.volume_at_stop_ml >= 100.0);
    }
    // one on/off pair per cycle
    assert_eq!(b.switches.load(Ordering::Relaxed), 4);
    assert!(!b.line.is_on());
}

#[test]
fn button_loop_exits_on_shutdown_with_relay_off() {
    let mut b = bench(1_000);
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(b.clock.clone());
    let mut button = SimulatedButton::released(clock);
    let mut debouncer = DebouncedButton::new(3, true);
    let mut flow = FlowMeter::new(b.ctrl.counter(), Duration::from_millis(1_000));
    let stop = AtomicBool::new(true);
    let cycles = run(
        &mut b.ctrl,
        &mut button,
        &mut debouncer,
        &mut flow,
        &stop,
        None,
        |_| {},
    )
    .unwrap();
    assert_eq!(cycles, 0);
    assert!(!b.line.is_on());
}

#[test]
fn monitor_reports_rate_each_interval() {
    let clock = ManualClock::new();
    let counter = Arc::new(PulseCounter::new());
    let display = RecordingDisplay::new();
    let frames = display.frames();
    let mut monitor = Monitor::new(
        FlowMeter::new(counter.clone(), Duration::from_millis(1_000)),
        CalibrationFactor::new(2.22).unwrap(),
        DisplayPresenter::default(),
        FrameSink::new(Box::new(display)),
        TimingCfg::default().idle_poll(),
    );
    let stop = AtomicBool::new(false);
    let mut rates = Vec::new();
    let feed = counter.clone();

    let n = monitor.run(&clock, &stop, Some(Duration::from_secs(3)), |s| {
        rates.push((s.rate.pulses, s.total_pulses));
        // 45 pulses arrive during each following second
        for _ in 0..45 {
            feed.on_edge();
        }
    });

    assert_eq!(n, 3);
    assert_eq!(rates, vec![(0, 0), (45, 45), (45, 90)]);
    let frames = frames.lock().unwrap();
    assert_eq!(frames[0], vec!["Waiting for flow".to_string()]);
    assert_eq!(frames[2][2], "Flow: 45 Hz");
    assert_eq!(frames[2][4], "Pulses: 45");
}

#[test]
fn monitor_ticks_at_the_configured_poll() {
    let clock = ManualClock::new();
    let counter = Arc::new(PulseCounter::new());
    let mut monitor = Monitor::new(
        FlowMeter::new(counter, Duration::from_millis(1_000)),
        CalibrationFactor::new(2.22).unwrap(),
        DisplayPresenter::default(),
        FrameSink::new(Box::new(RecordingDisplay::new())),
        Duration::from_millis(300),
    );
    let stop = AtomicBool::new(false);

    // ticks at 0, 300, 600, 900 and 1200 ms; the deadline is seen at 1200
    let n = monitor.run(&clock, &stop, Some(Duration::from_secs(1)), |_| {});

    assert_eq!(n, 1);
    assert_eq!(clock.elapsed(), Duration::from_millis(1_200));
}
