//! Audio cue derivation
//!
//! Turns the cascade event stream into short audio triggers. Playback is
//! somebody else's job; a [`CueSink`] receives the cues and decides what to
//! play. Preferences come in as configuration and are never looked up here.

use serde::{Deserialize, Serialize};

use crate::digits;
use crate::emitter::{CallbackResult, CascadeSubscriber};
use crate::reel::DigitPhase;

/// Sound preferences for a show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuePreferences {
    /// Master switch; when off no cue reaches the sink
    pub sound_enabled: bool,
    /// Tick whenever the least-significant displayed digit changes
    #[serde(default = "default_true")]
    pub tick_on_last_digit: bool,
    /// Click when a digit locks
    #[serde(default = "default_true")]
    pub lock_clicks: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CuePreferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            tick_on_last_digit: true,
            lock_clicks: true,
        }
    }
}

impl CuePreferences {
    pub fn muted() -> Self {
        Self {
            sound_enabled: false,
            ..Self::default()
        }
    }
}

/// Audio trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "cue", rename_all = "snake_case")]
pub enum Cue {
    /// Short percussive tick
    Tick,
    /// A digit settled
    Lock { position: usize },
    /// The reveal finished
    Fanfare { value: u64 },
}

/// Receiver of derived cues
pub trait CueSink: Send {
    fn play(&mut self, cue: Cue);
}

impl<F> CueSink for F
where
    F: FnMut(Cue) + Send,
{
    fn play(&mut self, cue: Cue) {
        self(cue)
    }
}

/// Subscriber adapter that forwards everything and derives cues on the side
pub struct CueSubscriber<S, K> {
    inner: S,
    sink: K,
    prefs: CuePreferences,
    last_digit: Option<u8>,
}

impl<S, K> CueSubscriber<S, K>
where
    S: CascadeSubscriber,
    K: CueSink,
{
    pub fn new(inner: S, sink: K, prefs: CuePreferences) -> Self {
        Self {
            inner,
            sink,
            prefs,
            last_digit: None,
        }
    }

    pub fn preferences(&self) -> CuePreferences {
        self.prefs
    }

    fn cue(&mut self, cue: Cue) {
        if self.prefs.sound_enabled {
            self.sink.play(cue);
        }
    }
}

impl<S, K> CascadeSubscriber for CueSubscriber<S, K>
where
    S: CascadeSubscriber,
    K: CueSink,
{
    fn on_tick(&mut self, value: u64) -> CallbackResult {
        let last = digits::last_digit(value);
        // The very first frame sets the baseline
        let changed = self.last_digit.is_some_and(|prev| prev != last);
        self.last_digit = Some(last);
        if changed && self.prefs.tick_on_last_digit {
            self.cue(Cue::Tick);
        }
        self.inner.on_tick(value)
    }

    fn on_complete(&mut self, value: u64) -> CallbackResult {
        self.cue(Cue::Fanfare { value });
        self.inner.on_complete(value)
    }

    fn on_phase(&mut self, position: usize, phase: DigitPhase) -> CallbackResult {
        if phase == DigitPhase::Locked && self.prefs.lock_clicks {
            self.cue(Cue::Lock { position });
        }
        self.inner.on_phase(position, phase)
    }
}
