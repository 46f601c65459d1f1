//! Error types

use thiserror::Error;

use crate::reel::DigitPhase;

/// Errors reported synchronously by `start()`
///
/// A rejected request never touches the currently active run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CascadeError {
    #[error("Invalid digit count: {0} (expected 1..={max})", max = crate::digits::MAX_DIGITS)]
    InvalidDigitCount(usize),

    #[error("Active digit count {active} out of range for {digit_count} digits")]
    ActiveDigitsOutOfRange { active: usize, digit_count: usize },

    #[error("Value {value} does not fit in {digit_count} digits")]
    ValueNotRepresentable { value: u64, digit_count: usize },

    #[error("Base duration must be greater than zero")]
    InvalidBaseDuration,

    #[error("Run duration does not fit the millisecond clock")]
    DurationOverflow,

    #[error("Cascade driver is not running")]
    DriverUnavailable,

    #[error("Cannot start a run from inside a driver callback")]
    StartFromCallback,
}

/// Rejected digit phase transition
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReelError {
    #[error("Digit {position}: illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        position: usize,
        from: DigitPhase,
        to: DigitPhase,
    },

    #[error("Digit {position} is inactive and cannot animate")]
    Inactive { position: usize },
}

/// Result type for cascade control operations
pub type CascadeResult<T> = Result<T, CascadeError>;
