//! Timing profiles and the per-digit schedule policy
//!
//! Everything here is pure: given a configuration, a resolved request and a
//! random source it produces the same schedule every time. Randomness only
//! shapes pacing; the completion ceiling is computable without drawing.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ResolvedRequest;

/// Timing profile for cascade reveals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingProfile {
    /// Stage reveal timing
    Normal,
    /// Fast reveal (rehearsals, repeated draws)
    Turbo,
    /// Studio mode (short and jitter-free for testing)
    Studio,
    /// Custom timing
    Custom,
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self::Normal
    }
}

/// Inclusive overshoot range (spin cycles)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvershootRange {
    pub min: u32,
    pub max: u32,
}

impl OvershootRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Ordered bounds, tolerating a swapped config
    fn bounds(&self) -> (u32, u32) {
        (self.min.min(self.max), self.max.max(self.min))
    }
}

/// Detailed timing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Profile type
    pub profile: TimingProfile,

    /// Spin time before overshoot, when the request doesn't set one (ms)
    pub default_base_duration_ms: u64,

    /// Delay between consecutive digits starting, when the request doesn't set one (ms)
    pub default_stagger_gap_ms: u64,

    /// Interval of the per-digit increment loop (ms)
    pub tick_interval_ms: u64,

    /// Remaining spin time below which a digit may anticipate (ms)
    pub anticipation_threshold_ms: u64,

    /// Chance that an anticipating digit still increments on a tick
    pub decel_probability: f64,

    /// Upper bound of the random start jitter (ms)
    pub jitter_max_ms: u64,

    /// Spin time added per overshoot cycle (ms)
    pub overshoot_unit_ms: u64,

    /// How many digits at the end of the cascade get heavy overshoot
    pub heavy_window: usize,

    /// Overshoot for digits before the heavy window
    pub light_overshoot: OvershootRange,

    /// Overshoot for digits inside the heavy window
    pub heavy_overshoot: OvershootRange,
}

impl TimingConfig {
    /// Stage reveal timing
    pub fn normal() -> Self {
        Self {
            profile: TimingProfile::Normal,
            default_base_duration_ms: 2200,
            default_stagger_gap_ms: 350,
            tick_interval_ms: 60,
            anticipation_threshold_ms: 600,
            decel_probability: 0.6,
            jitter_max_ms: 200,
            overshoot_unit_ms: 280,
            heavy_window: 4,
            light_overshoot: OvershootRange::new(1, 4),
            heavy_overshoot: OvershootRange::new(8, 15),
        }
    }

    /// Turbo mode
    pub fn turbo() -> Self {
        Self {
            profile: TimingProfile::Turbo,
            default_base_duration_ms: 1000,
            default_stagger_gap_ms: 150,
            tick_interval_ms: 40,
            anticipation_threshold_ms: 300,
            decel_probability: 0.6,
            jitter_max_ms: 80,
            overshoot_unit_ms: 120,
            heavy_window: 4,
            light_overshoot: OvershootRange::new(1, 3),
            heavy_overshoot: OvershootRange::new(4, 8),
        }
    }

    /// Studio mode (short, no jitter)
    pub fn studio() -> Self {
        Self {
            profile: TimingProfile::Studio,
            default_base_duration_ms: 600,
            default_stagger_gap_ms: 100,
            tick_interval_ms: 30,
            anticipation_threshold_ms: 200,
            decel_probability: 0.6,
            jitter_max_ms: 0,
            overshoot_unit_ms: 50,
            heavy_window: 4,
            light_overshoot: OvershootRange::new(1, 2),
            heavy_overshoot: OvershootRange::new(3, 6),
        }
    }

    /// Get config for profile
    pub fn from_profile(profile: TimingProfile) -> Self {
        match profile {
            TimingProfile::Normal => Self::normal(),
            TimingProfile::Turbo => Self::turbo(),
            TimingProfile::Studio => Self::studio(),
            TimingProfile::Custom => Self::normal(),
        }
    }

    /// Scale every duration by factor (< 1.0 = faster)
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |ms: u64| (ms as f64 * factor.max(0.0)).round() as u64;
        Self {
            profile: TimingProfile::Custom,
            default_base_duration_ms: scale(self.default_base_duration_ms).max(1),
            default_stagger_gap_ms: scale(self.default_stagger_gap_ms),
            tick_interval_ms: scale(self.tick_interval_ms).max(1),
            anticipation_threshold_ms: scale(self.anticipation_threshold_ms),
            decel_probability: self.decel_probability,
            jitter_max_ms: scale(self.jitter_max_ms),
            overshoot_unit_ms: scale(self.overshoot_unit_ms),
            heavy_window: self.heavy_window,
            light_overshoot: self.light_overshoot,
            heavy_overshoot: self.heavy_overshoot,
        }
    }

    /// Decel probability clamped to a valid Bernoulli parameter
    pub fn decel_chance(&self) -> f64 {
        if self.decel_probability.is_nan() {
            return 1.0;
        }
        self.decel_probability.clamp(0.0, 1.0)
    }

    /// Tick interval, never zero
    pub fn tick_ms(&self) -> u64 {
        self.tick_interval_ms.max(1)
    }

    /// `(active-1) * gap + jitter_max + base + max_overshoot * unit`
    ///
    /// `None` when the bound does not fit a `u64`.
    pub fn checked_ceiling_ms(
        &self,
        active_digits: usize,
        stagger_gap_ms: u64,
        base_duration_ms: u64,
    ) -> Option<u64> {
        if active_digits == 0 {
            return Some(0);
        }
        let (_, heavy_max) = self.heavy_overshoot.bounds();
        let (_, light_max) = self.light_overshoot.bounds();
        let max_offset = (active_digits as u64 - 1)
            .checked_mul(stagger_gap_ms)?
            .checked_add(self.jitter_max_ms)?;
        let max_spin = (heavy_max.max(light_max) as u64)
            .checked_mul(self.overshoot_unit_ms)?
            .checked_add(base_duration_ms)?;
        max_offset.checked_add(max_spin)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::normal()
    }
}

/// Timing of a single active digit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitSchedule {
    /// Display position (0 = most significant)
    pub position: usize,
    /// Rank in cascade order (0 = first to become eligible)
    pub cascade_index: usize,
    /// Delay before spinning starts, from run start (ms)
    pub start_offset_ms: u64,
    /// Overshoot cycles drawn for this digit
    pub overshoot: u32,
    /// Total spin time before locking (ms)
    pub spin_duration_ms: u64,
}

impl DigitSchedule {
    /// Lock time, from run start (ms)
    pub fn lock_at_ms(&self) -> u64 {
        self.start_offset_ms.saturating_add(self.spin_duration_ms)
    }
}

/// Timing of every active digit, in cascade order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeSchedule {
    pub digits: Vec<DigitSchedule>,
    /// Deterministic upper bound on run length (ms)
    pub ceiling_ms: u64,
}

impl CascadeSchedule {
    pub fn for_position(&self, position: usize) -> Option<&DigitSchedule> {
        self.digits.iter().find(|d| d.position == position)
    }

    /// When the last digit locks, from run start (ms)
    pub fn completion_ms(&self) -> u64 {
        self.digits
            .iter()
            .map(DigitSchedule::lock_at_ms)
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }
}

/// Schedule policy over a [`TimingConfig`]
#[derive(Debug, Clone, Default)]
pub struct TimingPolicy {
    config: TimingConfig,
}

impl TimingPolicy {
    pub fn new(config: TimingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// `cascade_index * stagger_gap + jitter(0..=jitter_max)`
    pub fn start_offset<R: Rng>(
        &self,
        cascade_index: usize,
        stagger_gap_ms: u64,
        rng: &mut R,
    ) -> u64 {
        let jitter = if self.config.jitter_max_ms == 0 {
            0
        } else {
            rng.random_range(0..=self.config.jitter_max_ms)
        };
        (cascade_index as u64)
            .saturating_mul(stagger_gap_ms)
            .saturating_add(jitter)
    }

    /// Overshoot cycles for the digit at `cascade_index` of `active_digits`
    ///
    /// Inside the heavy window the floor rises one cycle per rank toward the
    /// end of the cascade, so the final digits hang the longest.
    pub fn overshoot<R: Rng>(
        &self,
        cascade_index: usize,
        active_digits: usize,
        rng: &mut R,
    ) -> u32 {
        let window_start = active_digits.saturating_sub(self.config.heavy_window);
        if cascade_index >= window_start {
            let (lo, hi) = self.config.heavy_overshoot.bounds();
            let rank = (cascade_index - window_start) as u32;
            let floor = lo.saturating_add(rank).min(hi);
            rng.random_range(floor..=hi)
        } else {
            let (lo, hi) = self.config.light_overshoot.bounds();
            rng.random_range(lo..=hi)
        }
    }

    /// `base_duration + overshoot * unit`
    pub fn spin_duration(&self, base_duration_ms: u64, overshoot: u32) -> u64 {
        let overshoot_ms = (overshoot as u64).saturating_mul(self.config.overshoot_unit_ms);
        base_duration_ms.saturating_add(overshoot_ms)
    }

    /// Upper bound on run length, independent of random draws
    pub fn duration_ceiling_ms(&self, request: &ResolvedRequest) -> u64 {
        self.config
            .checked_ceiling_ms(
                request.active_digits,
                request.stagger_gap_ms,
                request.base_duration_ms,
            )
            .unwrap_or(u64::MAX)
    }

    /// Compute the schedule for every active digit
    pub fn schedule<R: Rng>(
        &self,
        request: &ResolvedRequest,
        rng: &mut R,
    ) -> CascadeSchedule {
        let digits = request
            .cascade_order()
            .into_iter()
            .enumerate()
            .map(|(cascade_index, position)| {
                let start_offset_ms =
                    self.start_offset(cascade_index, request.stagger_gap_ms, rng);
                let overshoot = self.overshoot(cascade_index, request.active_digits, rng);
                DigitSchedule {
                    position,
                    cascade_index,
                    start_offset_ms,
                    overshoot,
                    spin_duration_ms: self.spin_duration(request.base_duration_ms, overshoot),
                }
            })
            .collect();

        CascadeSchedule {
            digits,
            ceiling_ms: self.duration_ceiling_ms(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CascadeRequest, Direction};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn resolved(active: usize, direction: Direction) -> ResolvedRequest {
        CascadeRequest::new(0, 1_234_567, 7)
            .with_active_digits(active)
            .with_base_duration(2200)
            .with_stagger_gap(350)
            .with_direction(direction)
            .resolve(&TimingConfig::normal())
            .unwrap()
    }

    #[test]
    fn test_timing_profiles() {
        let normal = TimingConfig::normal();
        let turbo = TimingConfig::turbo();
        let studio = TimingConfig::studio();

        assert!(turbo.default_base_duration_ms < normal.default_base_duration_ms);
        assert!(studio.default_base_duration_ms < turbo.default_base_duration_ms);
        assert_eq!(studio.jitter_max_ms, 0);
        assert_eq!(TimingConfig::from_profile(TimingProfile::Turbo), turbo);
    }

    #[test]
    fn test_scaled_marks_custom() {
        let half = TimingConfig::normal().scaled(0.5);
        assert_eq!(half.profile, TimingProfile::Custom);
        assert_eq!(half.default_base_duration_ms, 1100);
        assert_eq!(half.tick_interval_ms, 30);
        assert_eq!(TimingConfig::normal().scaled(0.0).tick_ms(), 1);
    }

    #[test]
    fn test_start_offsets_stagger_within_jitter() {
        let policy = TimingPolicy::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for index in 0..7 {
            let offset = policy.start_offset(index, 350, &mut rng);
            let floor = index as u64 * 350;
            assert!(offset >= floor && offset <= floor + 200);
        }
    }

    #[test]
    fn test_overshoot_heavy_tail() {
        let policy = TimingPolicy::default();
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        for _ in 0..200 {
            for index in 0..3 {
                let o = policy.overshoot(index, 7, &mut rng);
                assert!((1..=4).contains(&o), "light overshoot {} at {}", o, index);
            }
            for index in 3..7 {
                let o = policy.overshoot(index, 7, &mut rng);
                let floor = 8 + (index as u32 - 3);
                assert!(o >= floor && o <= 15, "heavy overshoot {} at {}", o, index);
            }
        }
    }

    #[test]
    fn test_small_runs_are_all_heavy() {
        let policy = TimingPolicy::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for index in 0..2 {
            assert!(policy.overshoot(index, 2, &mut rng) >= 8);
        }
    }

    #[test]
    fn test_schedule_follows_cascade_order() {
        let policy = TimingPolicy::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let msb = policy.schedule(&resolved(3, Direction::MsbFirst), &mut rng);
        let positions: Vec<usize> = msb.digits.iter().map(|d| d.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);

        let lsb = policy.schedule(&resolved(3, Direction::LsbFirst), &mut rng);
        let positions: Vec<usize> = lsb.digits.iter().map(|d| d.position).collect();
        assert_eq!(positions, vec![6, 5, 4]);
        assert!(lsb.for_position(3).is_none());
    }

    #[test]
    fn test_schedule_is_deterministic_per_seed() {
        let policy = TimingPolicy::default();
        let request = resolved(7, Direction::MsbFirst);

        let a = policy.schedule(&request, &mut ChaCha8Rng::seed_from_u64(99));
        let b = policy.schedule(&request, &mut ChaCha8Rng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn test_ceiling_bounds_completion() {
        let policy = TimingPolicy::default();
        let request = resolved(7, Direction::MsbFirst);

        // (7-1)*350 + 200 + 2200 + 15*280
        assert_eq!(policy.duration_ceiling_ms(&request), 8700);

        for seed in 0..50 {
            let schedule = policy.schedule(&request, &mut ChaCha8Rng::seed_from_u64(seed));
            assert!(schedule.completion_ms() <= schedule.ceiling_ms);
        }
    }

    #[test]
    fn test_empty_schedule() {
        let policy = TimingPolicy::default();
        let schedule = policy.schedule(
            &resolved(0, Direction::MsbFirst),
            &mut ChaCha8Rng::seed_from_u64(0),
        );
        assert!(schedule.is_empty());
        assert_eq!(schedule.completion_ms(), 0);
        assert_eq!(schedule.ceiling_ms, 0);
    }
}
