//! Show configuration
//!
//! A show file fixes the look of a draw night: digit width, how many digits
//! animate, cascade direction, pacing and sound. Command-line flags override
//! individual fields.

use std::path::Path;

use anyhow::{Context, Result, bail};
use rand::Rng;
use rf_odometer::{
    CascadeRequest, CuePreferences, Direction, TimingConfig, TimingProfile, digits,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    pub digits: usize,
    /// Defaults to every digit
    pub animate_digits: Option<usize>,
    pub direction: Direction,
    pub profile: TimingProfile,
    /// Overrides the profile's base spin duration
    pub base_duration_ms: Option<u64>,
    /// Overrides the profile's stagger gap
    pub stagger_gap_ms: Option<u64>,
    pub sound: CuePreferences,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            digits: 7,
            animate_digits: None,
            direction: Direction::MsbFirst,
            profile: TimingProfile::Normal,
            base_duration_ms: None,
            stagger_gap_ms: None,
            sound: CuePreferences::default(),
        }
    }
}

impl ShowConfig {
    /// Load from YAML (`.yaml`/`.yml`) or JSON (anything else)
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read show config {}", path.display()))?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let config = if is_yaml {
            serde_yml::from_str(&text)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?
        } else {
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
        };
        log::debug!("Loaded show config from {}", path.display());
        Ok(config)
    }

    pub fn timing(&self) -> TimingConfig {
        TimingConfig::from_profile(self.profile)
    }

    /// Build the cascade request for one draw
    pub fn request(&self, start: u64, target: u64, seed: Option<u64>) -> CascadeRequest {
        let mut request = CascadeRequest::new(start, target, self.digits)
            .with_direction(self.direction);
        if let Some(active) = self.animate_digits {
            request = request.with_active_digits(active);
        }
        if let Some(ms) = self.base_duration_ms {
            request = request.with_base_duration(ms);
        }
        if let Some(ms) = self.stagger_gap_ms {
            request = request.with_stagger_gap(ms);
        }
        if let Some(seed) = seed {
            request = request.with_seed(seed);
        }
        request
    }
}

/// Pick the winning number: uniformly from `pool`, or from the whole digit range
pub fn draw_target<R: Rng>(pool: &[u64], digit_count: usize, rng: &mut R) -> Result<u64> {
    if digit_count == 0 || digit_count > digits::MAX_DIGITS {
        bail!(
            "digit count must be between 1 and {}, got {}",
            digits::MAX_DIGITS,
            digit_count
        );
    }

    if pool.is_empty() {
        return Ok(rng.random_range(0..digits::capacity(digit_count)));
    }

    if let Some(bad) = pool.iter().find(|n| !digits::fits(**n, digit_count)) {
        bail!("pool entry {} does not fit in {} digits", bad, digit_count);
    }
    Ok(pool[rng.random_range(0..pool.len())])
}
