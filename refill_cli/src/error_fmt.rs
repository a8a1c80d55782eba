//! Human-readable error descriptions and structured JSON error formatting.

use refill_core::error::{BuildError, RefillError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingRelay => {
                "What happened: No pump relay was provided to the controller.\nLikely causes: The relay failed to initialize or was not wired into the builder.\nHow to fix: Check [pins].relay and pass the relay via with_relay(...).".to_string()
            }
            BuildError::MissingTarget => {
                "What happened: Target volume not set.\nLikely causes: dosing.target_ml is missing and --ml was not given.\nHow to fix: Provide the volume (e.g., `refill dose --ml 100`).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML or on the command line.\nHow to fix: Edit the config file or arguments, then rerun."
            ),
        };
    }

    if let Some(re) = err.downcast_ref::<RefillError>() {
        return match re {
            RefillError::Config(msg) => {
                if msg
                    .to_ascii_lowercase()
                    .contains("calibration csv must have headers")
                {
                    "Invalid headers in calibration CSV. Expected 'pulses,ml'.".to_string()
                } else {
                    format!(
                        "What happened: Configuration is invalid or incomplete ({msg}).\nLikely causes: Missing [pins], [calibration] or [dosing] sections, or out-of-range values.\nHow to fix: Edit the TOML config and try again."
                    )
                }
            }
            RefillError::PeripheralUnavailable(msg) => format!(
                "What happened: A peripheral is unavailable ({msg}).\nLikely causes: Wrong device path or missing permissions.\nHow to fix: Check [display].device or disable the display."
            ),
            RefillError::Hardware(msg) | RefillError::HardwareFault(msg) => format!(
                "What happened: Failed to drive the hardware ({msg}).\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO."
            ),
            RefillError::Io(msg) => format!(
                "What happened: I/O error ({msg}).\nLikely causes: A device or file went away.\nHow to fix: Re-run with --log-level=debug for details."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 for configuration errors (as clap usage errors),
/// 3 peripheral unavailable, 4 hardware, 5 I/O, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    match err.downcast_ref::<RefillError>() {
        Some(RefillError::Config(_)) => 2,
        Some(RefillError::PeripheralUnavailable(_)) => 3,
        Some(RefillError::Hardware(_) | RefillError::HardwareFault(_)) => 4,
        Some(RefillError::Io(_)) => 5,
        None => 1,
    }
}

pub fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<RefillError>() {
        Some(RefillError::Config(_)) => "Config",
        Some(RefillError::PeripheralUnavailable(_)) => "PeripheralUnavailable",
        Some(RefillError::Hardware(_)) => "Hardware",
        Some(RefillError::HardwareFault(_)) => "HardwareFault",
        Some(RefillError::Io(_)) => "Io",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_with_two() {
        let e = eyre::Report::new(RefillError::Config("dosing.target_ml must be > 0".into()));
        assert_eq!(exit_code_for_error(&e), 2);
        assert!(humanize(&e).contains("dosing.target_ml"));
    }

    #[test]
    fn csv_header_errors_are_explained() {
        let e = eyre::Report::new(RefillError::Config(
            "calibration CSV must have headers 'pulses,ml', got: raw,value".into(),
        ));
        assert_eq!(
            humanize(&e),
            "Invalid headers in calibration CSV. Expected 'pulses,ml'."
        );
    }

    #[test]
    fn wrapped_errors_keep_their_code() {
        use eyre::WrapErr;
        let r: eyre::Result<()> = Err(eyre::Report::new(RefillError::HardwareFault(
            "pin 16 busy".into(),
        )))
        .wrap_err("switching pump relay on");
        let e = r.unwrap_err();
        assert_eq!(exit_code_for_error(&e), 4);
        assert_eq!(reason_name(&e), "HardwareFault");
    }

    #[test]
    fn json_error_shape() {
        let e = eyre::eyre!("boom");
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&e)).unwrap();
        assert_eq!(v["reason"], "Error");
        assert_eq!(v["exit_code"], 1);
        assert!(v["message"].as_str().unwrap().contains("boom"));
    }
}
