#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and calibration parsing for the refill controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration CSV loader enforces headers and fits ml-per-pulse through
//!   the origin, with one outlier-rejection refit.
use serde::Deserialize;

/// Calibration CSV schema: one row per timed calibration run.
///
/// Expected headers:
/// pulses,ml
///
/// Example:
/// pulses,ml
/// 450,1000.0
/// 226,500.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub pulses: u64,
    pub ml: f64,
}

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub relay: u8,
    pub flow_sensor: u8,
    pub button: u8,
    /// Relay boards that switch on a low input level
    #[serde(default)]
    pub relay_active_low: bool,
}

#[derive(Debug, Deserialize)]
pub struct CalibrationCfg {
    /// Volume represented by one sensor pulse (ml)
    pub ml_per_pulse: f64,
}

#[derive(Debug, Deserialize)]
pub struct DosingCfg {
    /// Volume to dispense per cycle (ml)
    pub target_ml: f64,
    /// Settle time after completion before the button re-arms
    #[serde(default = "default_cool_down_ms")]
    pub cool_down_ms: u64,
}

fn default_cool_down_ms() -> u64 {
    5_000
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimingCfg {
    /// Tick period while the pump runs; bounds the overshoot window
    pub dispense_poll_ms: u64,
    /// Tick period while idle or cooling down
    pub idle_poll_ms: u64,
    /// Flow-rate sampling interval
    pub flow_sample_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            dispense_poll_ms: 20,
            idle_poll_ms: 50,
            flow_sample_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ButtonCfg {
    /// Number of consecutive polls required to accept a press or release
    pub debounce_n: u8,
    /// Treat low level as pressed when true (pull-up wiring)
    pub active_low: bool,
}

impl Default for ButtonCfg {
    fn default() -> Self {
        Self {
            debounce_n: 3,
            active_low: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplayCfg {
    pub enabled: bool,
    /// Character device to draw on; the console is used when absent
    pub device: Option<String>,
    pub cols: usize,
    pub rows: usize,
    /// First line of every screen
    pub title: String,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            device: None,
            cols: 16,
            rows: 8,
            title: "Refil-Sustentavel".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationCfg {
    /// Edge rate of the simulated flow sensor while the pump runs
    pub pulses_per_sec: f64,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        // YF-S201 at roughly 4 L/min
        Self {
            pulses_per_sec: 30.0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    pub calibration: CalibrationCfg,
    pub dosing: DosingCfg,
    #[serde(default)]
    pub timing: TimingCfg,
    #[serde(default)]
    pub button: ButtonCfg,
    #[serde(default)]
    pub display: DisplayCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub simulation: SimulationCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Result of fitting calibration runs.
#[derive(Debug, Clone, Copy)]
pub struct Calibration {
    pub ml_per_pulse: f64,
    /// Rows kept after outlier rejection
    pub rows_used: usize,
}

impl Calibration {
    /// Fit ml = a * pulses through the origin by least squares.
    ///
    /// A first fit over all rows gives the RMS residual; rows whose residual
    /// exceeds 2 sigma are dropped and the slope is refit over the inliers.
    pub fn from_rows(rows: Vec<CalibrationRow>) -> eyre::Result<Self> {
        if rows.is_empty() {
            eyre::bail!("calibration requires at least one row");
        }
        for (i, r) in rows.iter().enumerate() {
            if r.pulses == 0 {
                eyre::bail!("calibration row {} has zero pulses", i + 1);
            }
            if !r.ml.is_finite() || r.ml <= 0.0 {
                eyre::bail!("calibration row {} must have a positive ml value", i + 1);
            }
        }

        let pts: Vec<(f64, f64)> = rows.iter().map(|r| (r.pulses as f64, r.ml)).collect();
        let a0 = fit_through_origin(&pts)?;

        let sumsq: f64 = pts
            .iter()
            .map(|(x, y)| {
                let r = y - a0 * x;
                r * r
            })
            .sum();
        let rms = (sumsq / pts.len() as f64).sqrt();

        let (a, used) = robust_refit(&pts, a0, rms, 2.0).unwrap_or((a0, pts.len()));
        Ok(Self {
            ml_per_pulse: a,
            rows_used: used,
        })
    }
}

fn fit_through_origin(pts: &[(f64, f64)]) -> eyre::Result<f64> {
    let sxx: f64 = pts.iter().map(|(x, _)| x * x).sum();
    let sxy: f64 = pts.iter().map(|(x, y)| x * y).sum();
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("calibration cannot determine slope (no pulses)");
    }
    let a = sxy / sxx;
    if !a.is_finite() || a <= 0.0 {
        eyre::bail!("calibration produced a non-positive ml_per_pulse");
    }
    Ok(a)
}

/// Refit over rows with |residual| <= k * rms. Returns None when nothing was
/// rejected, everything was rejected, or the refit is degenerate; the caller
/// then keeps the first fit.
fn robust_refit(pts: &[(f64, f64)], a0: f64, rms: f64, k: f64) -> Option<(f64, usize)> {
    if !(rms.is_finite() && rms > 0.0) {
        return None;
    }
    let thr = k * rms;
    let inliers: Vec<(f64, f64)> = pts
        .iter()
        .copied()
        .filter(|(x, y)| (y - a0 * x).abs() <= thr)
        .collect();
    if inliers.is_empty() || inliers.len() == pts.len() {
        return None;
    }
    fit_through_origin(&inliers)
        .ok()
        .map(|a| (a, inliers.len()))
}

impl TryFrom<Vec<CalibrationRow>> for Calibration {
    type Error = eyre::Report;
    fn try_from(rows: Vec<CalibrationRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Calibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["pulses", "ml"];
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'pulses,ml', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    Calibration::try_from(rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Calibration and dosing goal
        let f = self.calibration.ml_per_pulse;
        if !f.is_finite() || f <= 0.0 {
            eyre::bail!("calibration.ml_per_pulse must be > 0");
        }
        let t = self.dosing.target_ml;
        if !t.is_finite() || t <= 0.0 {
            eyre::bail!("dosing.target_ml must be > 0");
        }
        if self.dosing.cool_down_ms > 10 * 60 * 1000 {
            eyre::bail!("dosing.cool_down_ms is unreasonably large (>10min)");
        }

        // Timing
        if self.timing.dispense_poll_ms == 0 {
            eyre::bail!("timing.dispense_poll_ms must be >= 1");
        }
        if self.timing.dispense_poll_ms > 1_000 {
            eyre::bail!("timing.dispense_poll_ms must be <= 1000 (it bounds the overshoot)");
        }
        if self.timing.idle_poll_ms == 0 {
            eyre::bail!("timing.idle_poll_ms must be >= 1");
        }
        if self.timing.flow_sample_ms == 0 {
            eyre::bail!("timing.flow_sample_ms must be >= 1");
        }

        // Button
        if self.button.debounce_n == 0 {
            eyre::bail!("button.debounce_n must be >= 1");
        }

        // Display
        if self.display.cols == 0 || self.display.rows == 0 {
            eyre::bail!("display.cols and display.rows must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Simulation
        let pps = self.simulation.pulses_per_sec;
        if !pps.is_finite() || pps <= 0.0 {
            eyre::bail!("simulation.pulses_per_sec must be > 0");
        }

        Ok(())
    }
}
