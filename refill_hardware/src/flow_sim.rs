//! Simulated flow sensor.
//!
//! Spawns a thread that plays the role of the sensor interrupt: while the
//! pump line is on it delivers edges to the sink at a fixed rate. The thread
//! is shut down and joined when the `SimulatedFlowSensor` is dropped.
use crate::PumpLine;
use refill_traits::EdgeSink;
use refill_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct SimulatedFlowSensor {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl SimulatedFlowSensor {
    pub fn spawn<C: Clock + Send + Sync + 'static>(
        sink: Arc<dyn EdgeSink>,
        line: PumpLine,
        pulses_per_sec: f64,
        clock: C,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let period = edge_period(pulses_per_sec);

        let join_handle = std::thread::spawn(move || {
            let mut next = clock.now() + period;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("flow simulator received shutdown signal");
                    break;
                }
                if line.is_on() {
                    sink.on_edge();
                }
                // fixed schedule; a stalled thread resyncs instead of bursting
                clock.sleep_until(next);
                next = (next + period).max(clock.now());
            }
            tracing::trace!("flow simulator thread exiting cleanly");
        });

        Self {
            shutdown,
            join_handle: Some(join_handle),
        }
    }
}

/// Time between simulated edges; non-positive or non-finite rates fall back
/// to one edge per second.
fn edge_period(pulses_per_sec: f64) -> Duration {
    if pulses_per_sec.is_finite() && pulses_per_sec > 0.0 {
        Duration::from_secs_f64(1.0 / pulses_per_sec).max(Duration::from_micros(1))
    } else {
        Duration::from_secs(1)
    }
}

impl Drop for SimulatedFlowSensor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("flow simulator joined"),
                Err(e) => tracing::warn!(?e, "flow simulator panicked during shutdown"),
            }
        }
    }
}
