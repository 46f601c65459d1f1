//! Cascade run configuration

use serde::{Deserialize, Serialize};

use crate::digits;
use crate::error::{CascadeError, CascadeResult};
use crate::timing::TimingConfig;

/// Cascade direction
///
/// Decides both WHICH positions animate (the `active_digits` at the leading
/// end) and the order in which they become eligible to decelerate and lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Most-significant digit locks first
    MsbFirst,
    /// Least-significant digit locks first
    LsbFirst,
}

impl Default for Direction {
    fn default() -> Self {
        Self::MsbFirst
    }
}

impl Direction {
    /// Active positions in cascade order
    pub fn cascade_order(&self, digit_count: usize, active_digits: usize) -> Vec<usize> {
        let active = active_digits.min(digit_count);
        match self {
            Direction::MsbFirst => (0..active).collect(),
            Direction::LsbFirst => (digit_count - active..digit_count).rev().collect(),
        }
    }

    /// Is `position` one of the animating positions?
    pub fn is_active(&self, position: usize, digit_count: usize, active_digits: usize) -> bool {
        match self {
            Direction::MsbFirst => position < active_digits,
            Direction::LsbFirst => position + active_digits >= digit_count && position < digit_count,
        }
    }
}

/// One cascade run request
///
/// `base_duration_ms` and `stagger_gap_ms` fall back to the controller's
/// timing profile when left unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeRequest {
    pub start_value: u64,
    pub target_value: u64,
    pub digit_count: usize,
    /// Defaults to `digit_count`
    #[serde(default)]
    pub active_digits: Option<usize>,
    #[serde(default)]
    pub base_duration_ms: Option<u64>,
    #[serde(default)]
    pub stagger_gap_ms: Option<u64>,
    #[serde(default)]
    pub direction: Direction,
    /// Fixed seed for deterministic pacing (entropy when `None`)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl CascadeRequest {
    pub fn new(start_value: u64, target_value: u64, digit_count: usize) -> Self {
        Self {
            start_value,
            target_value,
            digit_count,
            active_digits: None,
            base_duration_ms: None,
            stagger_gap_ms: None,
            direction: Direction::default(),
            seed: None,
        }
    }

    pub fn with_active_digits(mut self, active: usize) -> Self {
        self.active_digits = Some(active);
        self
    }

    pub fn with_base_duration(mut self, ms: u64) -> Self {
        self.base_duration_ms = Some(ms);
        self
    }

    pub fn with_stagger_gap(mut self, ms: u64) -> Self {
        self.stagger_gap_ms = Some(ms);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate and fill defaults from `timing`
    pub fn resolve(&self, timing: &TimingConfig) -> CascadeResult<ResolvedRequest> {
        if self.digit_count == 0 || self.digit_count > digits::MAX_DIGITS {
            return Err(CascadeError::InvalidDigitCount(self.digit_count));
        }

        let active_digits = self.active_digits.unwrap_or(self.digit_count);
        if active_digits > self.digit_count {
            return Err(CascadeError::ActiveDigitsOutOfRange {
                active: active_digits,
                digit_count: self.digit_count,
            });
        }

        for value in [self.start_value, self.target_value] {
            if !digits::fits(value, self.digit_count) {
                return Err(CascadeError::ValueNotRepresentable {
                    value,
                    digit_count: self.digit_count,
                });
            }
        }

        let base_duration_ms = self
            .base_duration_ms
            .unwrap_or(timing.default_base_duration_ms);
        if base_duration_ms == 0 {
            return Err(CascadeError::InvalidBaseDuration);
        }

        let stagger_gap_ms = self.stagger_gap_ms.unwrap_or(timing.default_stagger_gap_ms);
        if timing
            .checked_ceiling_ms(active_digits, stagger_gap_ms, base_duration_ms)
            .is_none()
        {
            return Err(CascadeError::DurationOverflow);
        }

        Ok(ResolvedRequest {
            start_value: self.start_value,
            target_value: self.target_value,
            digit_count: self.digit_count,
            active_digits,
            base_duration_ms,
            stagger_gap_ms,
            direction: self.direction,
            seed: self.seed,
        })
    }
}

/// A validated request with every default filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub start_value: u64,
    pub target_value: u64,
    pub digit_count: usize,
    pub active_digits: usize,
    pub base_duration_ms: u64,
    pub stagger_gap_ms: u64,
    pub direction: Direction,
    pub seed: Option<u64>,
}

impl ResolvedRequest {
    pub fn cascade_order(&self) -> Vec<usize> {
        self.direction
            .cascade_order(self.digit_count, self.active_digits)
    }

    pub fn is_active(&self, position: usize) -> bool {
        self.direction
            .is_active(position, self.digit_count, self.active_digits)
    }
}
