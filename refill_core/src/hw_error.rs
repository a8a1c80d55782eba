//! Maps `Box<dyn Error>` from trait boundaries to typed `RefillError`.
//!
//! The traits in `refill_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `refill_hardware::HwError` downcasting.

use crate::error::RefillError;

/// Map a trait-boundary error to a typed `RefillError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> RefillError {
    #[cfg(feature = "hardware-errors")]
    {
        use refill_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::DisplayUnavailable(msg) => RefillError::PeripheralUnavailable(msg.clone()),
                HwError::Io(io) => RefillError::Io(io.to_string()),
                other @ HwError::Gpio(_) => RefillError::HardwareFault(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return RefillError::Io(io.to_string());
    }
    RefillError::Hardware(e.to_string())
}
