use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum RefillError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("peripheral unavailable: {0}")]
    PeripheralUnavailable(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Flow-rate sampling failures. Recovered locally by skipping the sample.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SamplingError {
    #[error("zero elapsed time between flow samples")]
    ZeroElapsed,
    #[error("flow sample timestamps out of order")]
    ClockWentBackwards,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing relay")]
    MissingRelay,
    #[error("missing target volume")]
    MissingTarget,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
