//! Cascade Controller
//!
//! Owns the single active run and the one authoritative timer queue. Every
//! mutation of a run happens inside [`CascadeController::advance_to`] (timer
//! fires) or [`CascadeController::start`] / [`CascadeController::cancel`];
//! between those calls state is stable and can be read with
//! [`CascadeController::snapshot`].
//!
//! ## Run lifecycle
//!
//! ```text
//! start() ──▶ snap inactive digits ──▶ initial tick ──▶ arm SpinStart × active
//!                                                           │
//!     SpinStart(i) ──▶ Spinning ──▶ arm Lock(i), Tick(i)    ▼
//!     Tick(i)      ──▶ maybe Anticipating, maybe step ──▶ re-arm Tick(i)
//!     Lock(i)      ──▶ Locked ──▶ all locked? ──▶ on_complete ──▶ retire
//! ```
//!
//! Timers carry the [`RunId`] they were armed for. A timer whose run is no
//! longer active is dropped without touching anything.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::{CascadeRequest, ResolvedRequest};
use crate::digits;
use crate::emitter::{CascadeSubscriber, Emitter, ErrorObserver, LogObserver};
use crate::error::{CascadeResult, ReelError};
use crate::reel::{DigitPhase, DigitReel, may_anticipate};
use crate::timer::{RunId, Timer, TimerKind, TimerQueue};
use crate::timing::{CascadeSchedule, TimingConfig, TimingPolicy};

/// Handle to a started run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunHandle {
    run_id: RunId,
    started_at_ms: u64,
    deadline_ms: u64,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Controller time the run started at
    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    /// Controller time by which the run is guaranteed to have completed,
    /// given on-time timer delivery
    pub fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }
}

/// Renderer view of one digit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitView {
    pub position: usize,
    pub value: u8,
    pub phase: DigitPhase,
    pub active: bool,
}

/// Renderer view of the active run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub elapsed_ms: u64,
    pub digits: Vec<DigitView>,
    pub locked_count: usize,
    pub active_digits: usize,
    pub target_value: u64,
    /// Composed display value
    pub value: u64,
    /// Zero-padded display
    pub display: String,
}

/// Controller counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStats {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_cancelled: u64,
    pub timers_fired: u64,
    pub stale_timers: u64,
    pub subscriber_faults: u64,
}

/// Why a run stopped being active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retire {
    Completed,
    Cancelled,
    Superseded,
}

/// Outcome of a single timer fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fire {
    Continue,
    Completed,
}

/// Knobs the per-digit callbacks read
#[derive(Debug, Clone, Copy)]
struct TickRules {
    tick_ms: u64,
    anticipation_threshold_ms: u64,
    decel_chance: f64,
}

impl From<&TimingConfig> for TickRules {
    fn from(config: &TimingConfig) -> Self {
        Self {
            tick_ms: config.tick_ms(),
            anticipation_threshold_ms: config.anticipation_threshold_ms,
            decel_chance: config.decel_chance(),
        }
    }
}

/// The single active cascade run
struct CascadeRun {
    id: RunId,
    request: ResolvedRequest,
    origin_ms: u64,
    reels: Vec<DigitReel>,
    cascade_order: Vec<usize>,
    schedule: CascadeSchedule,
    locked_count: usize,
    rng: ChaCha8Rng,
    emitter: Emitter,
}

impl CascadeRun {
    fn composed(&self) -> u64 {
        digits::compose(self.reels.iter().map(DigitReel::value))
    }

    fn emit_tick(&mut self, observer: &mut dyn ErrorObserver) {
        let value = self.composed();
        self.emitter.tick(value, observer);
    }

    fn emit_phase(&mut self, position: usize, observer: &mut dyn ErrorObserver) {
        let phase = self.reels[position].phase();
        self.emitter.phase(position, phase, observer);
    }

    fn cascade_index(&self, position: usize) -> Option<usize> {
        self.schedule
            .for_position(position)
            .map(|digit| digit.cascade_index)
    }

    fn lock_due(&self, position: usize) -> u64 {
        self.origin_ms.saturating_add(self.reels[position].lock_at_ms())
    }

    fn is_finished(&self) -> bool {
        self.locked_count == self.request.active_digits
    }

    /// Inactive digits go straight to their target
    fn snap_inactive(&mut self, observer: &mut dyn ErrorObserver) {
        for position in 0..self.reels.len() {
            if self.reels[position].is_active() {
                continue;
            }
            match self.reels[position].snap() {
                Ok(()) => self.emit_phase(position, observer),
                Err(e) => log::warn!("{} {}", self.id, e),
            }
        }
    }

    fn spin_start(
        &mut self,
        position: usize,
        due_ms: u64,
        rules: TickRules,
        queue: &mut TimerQueue,
        observer: &mut dyn ErrorObserver,
    ) -> Result<Fire, ReelError> {
        self.reels[position].begin_spin()?;
        self.emit_phase(position, observer);
        self.emit_tick(observer);

        let lock_due = self.lock_due(position);
        queue.arm(self.id, lock_due, TimerKind::Lock { position });

        let next = due_ms.saturating_add(rules.tick_ms);
        if next < lock_due {
            queue.arm(self.id, next, TimerKind::Tick { position });
        }
        Ok(Fire::Continue)
    }

    fn tick(
        &mut self,
        position: usize,
        due_ms: u64,
        rules: TickRules,
        queue: &mut TimerQueue,
        observer: &mut dyn ErrorObserver,
    ) -> Result<Fire, ReelError> {
        if !self.reels[position].phase().is_spinning() {
            return Ok(Fire::Continue);
        }

        let lock_due = self.lock_due(position);
        let remaining = lock_due.saturating_sub(due_ms);
        let mut changed = false;

        if self.reels[position].phase() == DigitPhase::Spinning
            && remaining < rules.anticipation_threshold_ms
        {
            let eligible = self
                .cascade_index(position)
                .is_some_and(|index| may_anticipate(&self.reels, &self.cascade_order, index));
            if eligible {
                self.reels[position].anticipate()?;
                self.emit_phase(position, observer);
                changed = true;
            }
        }

        let advance = match self.reels[position].phase() {
            DigitPhase::Spinning => true,
            DigitPhase::Anticipating => self.rng.random_bool(rules.decel_chance),
            _ => false,
        };
        if advance {
            self.reels[position].step()?;
            changed = true;
        }

        if changed {
            self.emit_tick(observer);
        }

        let next = due_ms.saturating_add(rules.tick_ms);
        if next < lock_due {
            queue.arm(self.id, next, TimerKind::Tick { position });
        }
        Ok(Fire::Continue)
    }

    fn lock(&mut self, position: usize, observer: &mut dyn ErrorObserver) -> Result<Fire, ReelError> {
        self.reels[position].lock()?;
        self.locked_count += 1;
        self.emit_phase(position, observer);
        self.emit_tick(observer);

        if self.is_finished() {
            self.emitter.complete(self.request.target_value, observer);
            return Ok(Fire::Completed);
        }
        Ok(Fire::Continue)
    }

    fn snapshot(&self, now_ms: u64) -> RunSnapshot {
        let value = self.composed();
        RunSnapshot {
            run_id: self.id,
            elapsed_ms: now_ms.saturating_sub(self.origin_ms),
            digits: self
                .reels
                .iter()
                .map(|reel| DigitView {
                    position: reel.position(),
                    value: reel.value(),
                    phase: reel.phase(),
                    active: reel.is_active(),
                })
                .collect(),
            locked_count: self.locked_count,
            active_digits: self.request.active_digits,
            target_value: self.request.target_value,
            value,
            display: digits::pad(value, self.request.digit_count),
        }
    }
}

/// Digit-cascade scheduler
pub struct CascadeController {
    policy: TimingPolicy,
    queue: TimerQueue,
    now_ms: u64,
    active: Option<CascadeRun>,
    observer: Box<dyn ErrorObserver>,
    stats: ControllerStats,
}

impl CascadeController {
    pub fn new(timing: TimingConfig) -> Self {
        Self {
            policy: TimingPolicy::new(timing),
            queue: TimerQueue::new(),
            now_ms: 0,
            active: None,
            observer: Box::new(LogObserver),
            stats: ControllerStats::default(),
        }
    }

    /// Replace the subscriber-fault hook (default: [`LogObserver`])
    pub fn with_error_observer(mut self, observer: impl ErrorObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn timing(&self) -> &TimingConfig {
        self.policy.config()
    }

    /// Current controller time (ms)
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn pending_timers(&self) -> usize {
        self.queue.len()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.next_deadline()
    }

    /// No run in progress
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Is `handle` the run currently in progress?
    pub fn is_active(&self, handle: RunHandle) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| run.id == handle.run_id)
    }

    pub fn active_run(&self) -> Option<RunId> {
        self.active.as_ref().map(|run| run.id)
    }

    /// Schedule of the run in progress
    pub fn active_schedule(&self) -> Option<&CascadeSchedule> {
        self.active.as_ref().map(|run| &run.schedule)
    }

    pub fn snapshot(&self) -> Option<RunSnapshot> {
        self.active.as_ref().map(|run| run.snapshot(self.now_ms))
    }

    /// Compute the schedule a request would get, without starting anything
    pub fn plan(&self, request: &CascadeRequest) -> CascadeResult<CascadeSchedule> {
        let resolved = request.resolve(self.policy.config())?;
        let seed = resolved.seed.unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Ok(self.policy.schedule(&resolved, &mut rng))
    }

    /// Start a run, superseding any run in progress
    ///
    /// Validation happens first; a rejected request leaves the current run
    /// untouched.
    pub fn start(
        &mut self,
        request: CascadeRequest,
        subscriber: Box<dyn CascadeSubscriber>,
    ) -> CascadeResult<RunHandle> {
        let resolved = request.resolve(self.policy.config())?;

        if let Some(prev) = self.active.as_ref().map(|run| run.id) {
            self.retire(prev, Retire::Superseded);
        }

        let run_id = RunId::next();
        let seed = resolved.seed.unwrap_or_else(rand::random);
        let mut emitter = Emitter::new(run_id, subscriber);
        self.stats.runs_started += 1;

        if resolved.start_value == resolved.target_value {
            log::debug!(
                "{} start == target ({}), completing immediately",
                run_id,
                digits::pad(resolved.target_value, resolved.digit_count)
            );
            emitter.tick(resolved.start_value, self.observer.as_mut());
            emitter.complete(resolved.target_value, self.observer.as_mut());
            self.stats.runs_completed += 1;
            self.stats.subscriber_faults += emitter.faults();
            return Ok(RunHandle {
                run_id,
                started_at_ms: self.now_ms,
                deadline_ms: self.now_ms,
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let schedule = self.policy.schedule(&resolved, &mut rng);
        let start_digits = digits::split(resolved.start_value, resolved.digit_count);
        let target_digits = digits::split(resolved.target_value, resolved.digit_count);

        let reels = (0..resolved.digit_count)
            .map(|position| match schedule.for_position(position) {
                Some(digit) => DigitReel::active(
                    position,
                    start_digits[position],
                    target_digits[position],
                    digit.start_offset_ms,
                    digit.spin_duration_ms,
                ),
                None => DigitReel::inactive(
                    position,
                    start_digits[position],
                    target_digits[position],
                ),
            })
            .collect();

        log::debug!(
            "{} started: {} -> {} ({} digits, {} active, {:?}, seed {}, ceiling {}ms)",
            run_id,
            digits::pad(resolved.start_value, resolved.digit_count),
            digits::pad(resolved.target_value, resolved.digit_count),
            resolved.digit_count,
            resolved.active_digits,
            resolved.direction,
            seed,
            schedule.ceiling_ms
        );

        let handle = RunHandle {
            run_id,
            started_at_ms: self.now_ms,
            deadline_ms: self.now_ms.saturating_add(schedule.ceiling_ms),
        };

        let mut run = CascadeRun {
            id: run_id,
            cascade_order: resolved.cascade_order(),
            request: resolved,
            origin_ms: self.now_ms,
            reels,
            schedule,
            locked_count: 0,
            rng,
            emitter,
        };

        run.snap_inactive(self.observer.as_mut());
        run.emit_tick(self.observer.as_mut());

        if run.is_finished() {
            // Nothing animates: every position snapped
            run.emitter
                .complete(run.request.target_value, self.observer.as_mut());
            self.stats.runs_completed += 1;
            self.stats.subscriber_faults += run.emitter.faults();
            return Ok(handle);
        }

        for digit in &run.schedule.digits {
            self.queue.arm(
                run_id,
                run.origin_ms.saturating_add(digit.start_offset_ms),
                TimerKind::SpinStart {
                    position: digit.position,
                },
            );
        }
        self.active = Some(run);
        Ok(handle)
    }

    /// Cancel `handle`'s run; a no-op if it is no longer active
    pub fn cancel(&mut self, handle: RunHandle) -> bool {
        if self.is_active(handle) {
            self.retire(handle.run_id, Retire::Cancelled);
            true
        } else {
            false
        }
    }

    /// Cancel whatever run is in progress
    pub fn cancel_active(&mut self) -> bool {
        match self.active_run() {
            Some(id) => {
                self.retire(id, Retire::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Advance the clock by `delta_ms`, firing everything that falls due
    pub fn advance_by(&mut self, delta_ms: u64) -> usize {
        self.advance_to(self.now_ms.saturating_add(delta_ms))
    }

    /// Advance the clock to `now_ms`, firing due timers in order
    ///
    /// Late calls are fine: overdue timers all fire, in due order, each one
    /// seeing its own due time. Returns the number of timers fired.
    pub fn advance_to(&mut self, now_ms: u64) -> usize {
        let target = now_ms.max(self.now_ms);
        let mut fired = 0;

        while let Some(timer) = self.queue.pop_due(target) {
            self.now_ms = self.now_ms.max(timer.due_ms);
            self.fire(timer);
            fired += 1;
        }

        self.now_ms = target;
        fired
    }

    /// Advance until the active run finishes or a bound is hit
    ///
    /// Returns `true` when the controller is idle afterwards.
    pub fn run_until_idle(&mut self, max_ms: u64) -> bool {
        let limit = self.now_ms.saturating_add(max_ms);
        while !self.is_idle() {
            match self.queue.next_deadline() {
                Some(due) if due <= limit => {
                    self.advance_to(due);
                }
                _ => break,
            }
        }
        self.is_idle()
    }

    fn fire(&mut self, timer: Timer) {
        self.stats.timers_fired += 1;

        let Some(run) = self.active.as_mut().filter(|run| run.id == timer.run_id) else {
            self.stats.stale_timers += 1;
            log::trace!("{} stale timer {:?} dropped", timer.run_id, timer.kind);
            return;
        };

        let rules = TickRules::from(self.policy.config());
        let observer = self.observer.as_mut();
        let result = match timer.kind {
            TimerKind::SpinStart { position } => {
                run.spin_start(position, timer.due_ms, rules, &mut self.queue, observer)
            }
            TimerKind::Tick { position } => {
                run.tick(position, timer.due_ms, rules, &mut self.queue, observer)
            }
            TimerKind::Lock { position } => run.lock(position, observer),
        };

        match result {
            Ok(Fire::Continue) => {}
            Ok(Fire::Completed) => self.retire(timer.run_id, Retire::Completed),
            Err(e) => log::warn!("{} {:?}: {}", timer.run_id, timer.kind, e),
        }
    }

    fn retire(&mut self, run_id: RunId, reason: Retire) {
        let Some(run) = self.active.take_if(|run| run.id == run_id) else {
            return;
        };
        let dropped = self.queue.cancel_run(run_id);
        self.stats.subscriber_faults += run.emitter.faults();

        match reason {
            Retire::Completed => {
                self.stats.runs_completed += 1;
                log::debug!(
                    "{} completed at {}ms",
                    run_id,
                    self.now_ms.saturating_sub(run.origin_ms)
                );
            }
            Retire::Cancelled | Retire::Superseded => {
                self.stats.runs_cancelled += 1;
                log::debug!("{} {:?}, {} timers dropped", run_id, reason, dropped);
            }
        }
    }
}

impl Default for CascadeController {
    fn default() -> Self {
        Self::new(TimingConfig::default())
    }
}
