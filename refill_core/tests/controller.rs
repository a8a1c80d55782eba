use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use refill_core::mocks::{FailingDisplay, RecordingDisplay, RecordingRelay};
use refill_core::{
    CalibrationFactor, DosingController, DosingState, DosingStatus, PressEdge, PulseCounter,
    RELAY_OFF_ATTEMPTS, RefillError, TimingCfg,
};
use refill_traits::{Clock, ManualClock};
use rstest::rstest;

struct Rig {
    ctrl: DosingController,
    counter: Arc<PulseCounter>,
    clock: ManualClock,
    relay_cmds: Arc<std::sync::Mutex<Vec<bool>>>,
}

fn rig_with(relay: RecordingRelay, cool_down_ms: u64) -> Rig {
    let clock = ManualClock::new();
    let counter = Arc::new(PulseCounter::new());
    let relay_cmds = relay.commands();
    let ctrl = DosingController::builder()
        .with_relay(relay)
        .with_target_ml(100.0)
        .with_calibration(CalibrationFactor::new(2.22).unwrap())
        .with_counter(counter.clone())
        .with_clock(Arc::new(clock.clone()))
        .with_cool_down_ms(cool_down_ms)
        .build()
        .unwrap();
    Rig {
        ctrl,
        counter,
        clock,
        relay_cmds,
    }
}

fn rig() -> Rig {
    rig_with(RecordingRelay::new(), 5_000)
}

fn edges(counter: &PulseCounter, n: u32) {
    for _ in 0..n {
        counter.on_edge();
    }
}

#[test]
fn completes_exactly_at_pulse_46() {
    let mut r = rig();
    assert_eq!(r.ctrl.step(Some(PressEdge)).unwrap(), DosingStatus::Started);

    for n in 1..=45 {
        r.counter.on_edge();
        match r.ctrl.step(None).unwrap() {
            DosingStatus::Dispensing { volume_ml } => {
                assert!(volume_ml < 100.0, "pulse {n}: {volume_ml}");
            }
            other => panic!("completed early at pulse {n}: {other:?}"),
        }
    }

    r.counter.on_edge();
    match r.ctrl.step(None).unwrap() {
        DosingStatus::Completed { pulses, volume_ml } => {
            assert_eq!(pulses, 46);
            assert!((volume_ml - 102.12).abs() < 1e-9);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(
        r.ctrl.state(),
        DosingState::Complete { final_pulses: 46 }
    );
}

#[test]
fn relay_follows_transitions() {
    let mut r = rig();
    r.ctrl.step(None).unwrap();
    assert!(r.relay_cmds.lock().unwrap().is_empty());

    r.ctrl.step(Some(PressEdge)).unwrap();
    assert_eq!(*r.relay_cmds.lock().unwrap(), vec![true]);
    assert!(r.ctrl.relay_on());

    edges(&r.counter, 46);
    r.ctrl.step(None).unwrap();
    assert_eq!(*r.relay_cmds.lock().unwrap(), vec![true, false]);
    assert!(!r.ctrl.relay_on());
}

#[test]
fn baseline_excludes_pulses_before_start() {
    let mut r = rig();
    edges(&r.counter, 30);
    r.ctrl.step(Some(PressEdge)).unwrap();
    assert_eq!(
        r.ctrl.state(),
        DosingState::Dispensing {
            pulses_at_start: 30
        }
    );
    edges(&r.counter, 45);
    assert!(matches!(
        r.ctrl.step(None).unwrap(),
        DosingStatus::Dispensing { .. }
    ));
}

#[test]
fn presses_during_cool_down_are_ignored() {
    let mut r = rig();
    r.ctrl.step(Some(PressEdge)).unwrap();
    edges(&r.counter, 46);
    r.ctrl.step(None).unwrap();

    for _ in 0..10 {
        r.clock.advance(Duration::from_millis(400));
        assert_eq!(
            r.ctrl.step(Some(PressEdge)).unwrap(),
            DosingStatus::CoolingDown
        );
    }
    assert_eq!(*r.relay_cmds.lock().unwrap(), vec![true, false]);

    r.clock.advance(Duration::from_millis(1_000));
    assert!(matches!(
        r.ctrl.step(Some(PressEdge)).unwrap(),
        DosingStatus::Rearmed(_)
    ));
    assert!(r.ctrl.state().is_idle());
    assert_eq!(
        r.ctrl.step(Some(PressEdge)).unwrap(),
        DosingStatus::Started
    );
}

#[test]
fn presses_while_dispensing_do_not_restart() {
    let mut r = rig();
    r.ctrl.step(Some(PressEdge)).unwrap();
    edges(&r.counter, 10);
    r.ctrl.step(Some(PressEdge)).unwrap();
    assert_eq!(
        r.ctrl.state(),
        DosingState::Dispensing { pulses_at_start: 0 }
    );
    assert_eq!(*r.relay_cmds.lock().unwrap(), vec![true]);
}

#[test]
fn report_counts_coast_and_resets_counter() {
    let mut r = rig_with(RecordingRelay::new(), 1_000);
    r.ctrl.step(Some(PressEdge)).unwrap();
    r.clock.advance(Duration::from_millis(1_500));
    edges(&r.counter, 46);
    r.ctrl.step(None).unwrap();
    // liquid still draining after the relay opened
    edges(&r.counter, 2);
    r.clock.advance(Duration::from_millis(1_000));

    let report = match r.ctrl.step(None).unwrap() {
        DosingStatus::Rearmed(report) => report,
        other => panic!("expected re-arm, got {other:?}"),
    };
    assert_eq!(report.pulses_at_stop, 46);
    assert_eq!(report.pulses_total, 48);
    assert_eq!(report.coast_pulses(), 2);
    assert!((report.volume_total_ml - 48.0 * 2.22).abs() < 1e-9);
    assert_eq!(report.dispense_time, Duration::from_millis(1_500));
    assert_eq!(r.counter.snapshot(), 0);
}

#[test]
fn poll_interval_depends_on_state() {
    let mut r = rig();
    let t = TimingCfg::default();
    assert_eq!(r.ctrl.poll_interval(), t.idle_poll());
    r.ctrl.step(Some(PressEdge)).unwrap();
    assert_eq!(r.ctrl.poll_interval(), t.dispense_poll());
    edges(&r.counter, 46);
    r.ctrl.step(None).unwrap();
    assert_eq!(r.ctrl.poll_interval(), t.idle_poll());
}

#[test]
fn pace_sleeps_on_controller_clock() {
    let r = rig();
    let t0 = r.clock.now();
    r.ctrl.pace();
    assert_eq!(r.clock.ms_since(t0), 50);
}

#[test]
fn display_failure_does_not_change_state() {
    let clock = ManualClock::new();
    let counter = Arc::new(PulseCounter::new());
    let mut ctrl = DosingController::builder()
        .with_relay(RecordingRelay::new())
        .with_target_ml(100.0)
        .with_display(FailingDisplay)
        .with_counter(counter.clone())
        .with_clock(Arc::new(clock.clone()))
        .with_cool_down_ms(0)
        .build()
        .unwrap();

    assert_eq!(ctrl.step(Some(PressEdge)).unwrap(), DosingStatus::Started);
    edges(&counter, 46);
    assert!(matches!(
        ctrl.step(None).unwrap(),
        DosingStatus::Completed { pulses: 46, .. }
    ));
    assert!(matches!(ctrl.step(None).unwrap(), DosingStatus::Rearmed(_)));
    assert!(ctrl.display_failures() >= 3);
}

#[test]
fn display_shows_each_phase() {
    let display = RecordingDisplay::new();
    let frames = display.frames();
    let counter = Arc::new(PulseCounter::new());
    let mut ctrl = DosingController::builder()
        .with_relay(RecordingRelay::new())
        .with_target_ml(100.0)
        .with_display(display)
        .with_counter(counter.clone())
        .with_clock(Arc::new(ManualClock::new()))
        .with_cool_down_ms(0)
        .build()
        .unwrap();

    ctrl.step(None).unwrap();
    ctrl.step(None).unwrap();
    ctrl.step(Some(PressEdge)).unwrap();
    edges(&counter, 46);
    ctrl.step(None).unwrap();
    ctrl.step(None).unwrap();

    let frames = frames.lock().unwrap();
    let statuses: Vec<&str> = frames.iter().map(|f| f[1].as_str()).collect();
    assert_eq!(
        statuses,
        vec![
            "Status: Ready",
            "Status: Dispensing...",
            "Status: Complete!",
            "Status: Ready",
        ]
    );
    assert_eq!(frames[2][3], "Volume: 102.1 ml");
}

#[test]
fn relay_on_failure_keeps_controller_idle() {
    let mut r = rig_with(RecordingRelay::failing_on(true), 5_000);
    let err = r.ctrl.step(Some(PressEdge)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RefillError>(),
        Some(RefillError::Io(_))
    ));
    assert!(r.ctrl.state().is_idle());
    assert!(!r.ctrl.relay_on());
}

#[test]
fn failed_relay_off_is_retried_before_rearming() {
    let relay = RecordingRelay::failing_on_times(false, 2);
    let failures = relay.failures();
    let mut r = rig_with(relay, 0);
    r.ctrl.step(Some(PressEdge)).unwrap();
    edges(&r.counter, 46);

    assert!(matches!(
        r.ctrl.step(None).unwrap(),
        DosingStatus::Completed { pulses: 46, .. }
    ));
    assert!(r.ctrl.relay_on());

    // cool-down already elapsed, but the pump may still be running
    assert_eq!(r.ctrl.step(None).unwrap(), DosingStatus::CoolingDown);
    assert!(matches!(r.ctrl.state(), DosingState::Complete { .. }));
    assert!(r.ctrl.relay_on());

    assert!(matches!(
        r.ctrl.step(None).unwrap(),
        DosingStatus::Rearmed(_)
    ));
    assert!(r.ctrl.state().is_idle());
    assert!(!r.ctrl.relay_on());
    assert_eq!(failures.load(Ordering::Acquire), 2);
    assert_eq!(*r.relay_cmds.lock().unwrap(), vec![true, false]);
}

#[test]
fn stuck_relay_becomes_a_hardware_fault() {
    let relay = RecordingRelay::failing_on(false);
    let failures = relay.failures();
    let mut r = rig_with(relay, 0);
    r.ctrl.step(Some(PressEdge)).unwrap();
    edges(&r.counter, 46);
    assert!(matches!(
        r.ctrl.step(None).unwrap(),
        DosingStatus::Completed { .. }
    ));

    let mut err = None;
    for _ in 0..RELAY_OFF_ATTEMPTS {
        match r.ctrl.step(None) {
            Ok(status) => {
                assert_eq!(status, DosingStatus::CoolingDown);
                assert!(!(r.ctrl.state().is_idle() && r.ctrl.relay_on()));
            }
            Err(e) => {
                err = Some(e);
                break;
            }
        }
    }
    let err = err.expect("stuck relay should surface as an error");
    assert!(matches!(
        err.downcast_ref::<RefillError>(),
        Some(RefillError::HardwareFault(_))
    ));
    assert_eq!(failures.load(Ordering::Acquire), RELAY_OFF_ATTEMPTS);
    assert!(matches!(r.ctrl.state(), DosingState::Complete { .. }));
    assert!(r.ctrl.relay_on());
}

#[rstest]
#[case::idle(0)]
#[case::dispensing(10)]
fn shutdown_switches_relay_off(#[case] pulses: u32) {
    let mut r = rig();
    if pulses > 0 {
        r.ctrl.step(Some(PressEdge)).unwrap();
        edges(&r.counter, pulses);
        r.ctrl.step(None).unwrap();
    }
    r.ctrl.shutdown().unwrap();
    assert_eq!(r.relay_cmds.lock().unwrap().last(), Some(&false));
    assert!(r.ctrl.state().is_idle());
    assert!(!r.ctrl.relay_on());
}

#[test]
fn dropping_mid_dose_turns_relay_off() {
    let mut r = rig();
    r.ctrl.step(Some(PressEdge)).unwrap();
    let cmds = r.relay_cmds.clone();
    drop(r);
    assert_eq!(*cmds.lock().unwrap(), vec![true, false]);
}

#[test]
fn start_is_refused_while_busy() {
    let mut r = rig();
    assert!(r.ctrl.start().unwrap());
    assert!(!r.ctrl.start().unwrap());
    assert_eq!(*r.relay_cmds.lock().unwrap(), vec![true]);
}
