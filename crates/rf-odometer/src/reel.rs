//! Digit reel: per-position phase machine
//!
//! ```text
//!   Idle ──spin──▶ Spinning ──anticipate──▶ Anticipating
//!    │                 │                        │
//!    │ snap            └────────lock────────────┤
//!    ▼ (inactive)                               ▼
//!  Locked ◀─────────────────────────────────  Locked
//! ```
//!
//! Phases only move forward. Mutators are crate-private: the controller's
//! timer callbacks are the only writers.

use serde::{Deserialize, Serialize};

use crate::error::ReelError;

/// Phase of a single digit within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitPhase {
    Idle,
    Spinning,
    Anticipating,
    Locked,
}

impl DigitPhase {
    /// Is the digit currently moving?
    pub fn is_spinning(&self) -> bool {
        matches!(self, DigitPhase::Spinning | DigitPhase::Anticipating)
    }

    pub fn is_locked(&self) -> bool {
        *self == DigitPhase::Locked
    }
}

/// One digit position of a cascade run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitReel {
    position: usize,
    value: u8,
    target: u8,
    phase: DigitPhase,
    active: bool,
    start_offset_ms: u64,
    spin_duration_ms: u64,
}

impl DigitReel {
    /// Animating reel showing `start` until it spins
    pub(crate) fn active(
        position: usize,
        start: u8,
        target: u8,
        start_offset_ms: u64,
        spin_duration_ms: u64,
    ) -> Self {
        Self {
            position,
            value: start % 10,
            target: target % 10,
            phase: DigitPhase::Idle,
            active: true,
            start_offset_ms,
            spin_duration_ms,
        }
    }

    /// Non-animating reel; snaps to `target` when the run starts
    pub(crate) fn inactive(position: usize, start: u8, target: u8) -> Self {
        Self {
            position,
            value: start % 10,
            target: target % 10,
            phase: DigitPhase::Idle,
            active: false,
            start_offset_ms: 0,
            spin_duration_ms: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Currently displayed digit (0-9)
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Displayed digit as a character
    pub fn as_char(&self) -> char {
        char::from(b'0' + self.value)
    }

    pub fn target(&self) -> u8 {
        self.target
    }

    pub fn phase(&self) -> DigitPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start_offset_ms(&self) -> u64 {
        self.start_offset_ms
    }

    pub fn spin_duration_ms(&self) -> u64 {
        self.spin_duration_ms
    }

    /// Lock time relative to run start
    pub fn lock_at_ms(&self) -> u64 {
        self.start_offset_ms.saturating_add(self.spin_duration_ms)
    }

    fn illegal(&self, to: DigitPhase) -> ReelError {
        ReelError::IllegalTransition {
            position: self.position,
            from: self.phase,
            to,
        }
    }

    /// `Idle → Locked` for inactive positions
    pub(crate) fn snap(&mut self) -> Result<(), ReelError> {
        if self.active {
            return Err(self.illegal(DigitPhase::Locked));
        }
        if self.phase != DigitPhase::Idle {
            return Err(self.illegal(DigitPhase::Locked));
        }
        self.value = self.target;
        self.phase = DigitPhase::Locked;
        Ok(())
    }

    /// `Idle → Spinning`
    pub(crate) fn begin_spin(&mut self) -> Result<(), ReelError> {
        if !self.active {
            return Err(ReelError::Inactive {
                position: self.position,
            });
        }
        if self.phase != DigitPhase::Idle {
            return Err(self.illegal(DigitPhase::Spinning));
        }
        self.phase = DigitPhase::Spinning;
        Ok(())
    }

    /// `Spinning → Anticipating`
    ///
    /// The caller evaluates the threshold and neighbor predicate; the reel
    /// only enforces phase order.
    pub(crate) fn anticipate(&mut self) -> Result<(), ReelError> {
        if self.phase != DigitPhase::Spinning {
            return Err(self.illegal(DigitPhase::Anticipating));
        }
        self.phase = DigitPhase::Anticipating;
        Ok(())
    }

    /// Advance the transient value by one (`mod 10`)
    pub(crate) fn step(&mut self) -> Result<(), ReelError> {
        if !self.phase.is_spinning() {
            return Err(ReelError::IllegalTransition {
                position: self.position,
                from: self.phase,
                to: self.phase,
            });
        }
        self.value = (self.value + 1) % 10;
        Ok(())
    }

    /// `Spinning | Anticipating → Locked`, showing the target digit
    pub(crate) fn lock(&mut self) -> Result<(), ReelError> {
        if !self.phase.is_spinning() {
            return Err(self.illegal(DigitPhase::Locked));
        }
        self.value = self.target;
        self.phase = DigitPhase::Locked;
        Ok(())
    }
}

/// Cascade eligibility: may the digit at `cascade_index` anticipate?
///
/// True for the first digit in cascade order, otherwise only once its
/// predecessor in cascade order is locked.
pub fn may_anticipate(reels: &[DigitReel], cascade_order: &[usize], cascade_index: usize) -> bool {
    if cascade_index == 0 {
        return true;
    }
    cascade_order
        .get(cascade_index - 1)
        .and_then(|&prev| reels.get(prev))
        .is_some_and(|prev| prev.phase().is_locked())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        assert!(DigitPhase::Idle < DigitPhase::Spinning);
        assert!(DigitPhase::Spinning < DigitPhase::Anticipating);
        assert!(DigitPhase::Anticipating < DigitPhase::Locked);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut reel = DigitReel::active(0, 8, 3, 0, 1000);

        reel.begin_spin().unwrap();
        reel.step().unwrap();
        reel.step().unwrap();
        assert_eq!(reel.value(), 0);

        reel.anticipate().unwrap();
        assert_eq!(reel.phase(), DigitPhase::Anticipating);

        reel.lock().unwrap();
        assert_eq!(reel.value(), 3);
        assert_eq!(reel.as_char(), '3');
        assert!(reel.phase().is_locked());
    }

    #[test]
    fn test_lock_straight_from_spinning() {
        let mut reel = DigitReel::active(2, 0, 7, 100, 500);
        reel.begin_spin().unwrap();
        reel.lock().unwrap();
        assert_eq!(reel.value(), 7);
        assert_eq!(reel.lock_at_ms(), 600);
    }

    #[test]
    fn test_no_regression() {
        let mut reel = DigitReel::active(1, 0, 5, 0, 100);
        reel.begin_spin().unwrap();
        reel.lock().unwrap();

        assert!(reel.begin_spin().is_err());
        assert!(reel.anticipate().is_err());
        assert!(reel.step().is_err());
        assert!(reel.lock().is_err());
        assert_eq!(reel.value(), 5);
    }

    #[test]
    fn test_idle_cannot_anticipate_or_lock() {
        let mut reel = DigitReel::active(0, 0, 5, 0, 100);
        assert!(reel.anticipate().is_err());
        assert!(reel.lock().is_err());
        assert_eq!(reel.phase(), DigitPhase::Idle);
    }

    #[test]
    fn test_inactive_snaps_only() {
        let mut reel = DigitReel::inactive(4, 1, 9);
        assert_eq!(
            reel.begin_spin(),
            Err(ReelError::Inactive { position: 4 })
        );

        reel.snap().unwrap();
        assert_eq!(reel.value(), 9);
        assert!(reel.phase().is_locked());
        assert!(reel.snap().is_err());
    }

    #[test]
    fn test_eligibility_predicate() {
        let mut reels = vec![
            DigitReel::active(0, 0, 1, 0, 100),
            DigitReel::active(1, 0, 2, 0, 100),
        ];
        let order = vec![0, 1];

        assert!(may_anticipate(&reels, &order, 0));
        assert!(!may_anticipate(&reels, &order, 1));

        reels[0].begin_spin().unwrap();
        reels[0].lock().unwrap();
        assert!(may_anticipate(&reels, &order, 1));
    }
}
