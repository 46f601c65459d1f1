//! End-to-End Cascade Tests
//!
//! Drives the controller with fake time and checks the reveal contract:
//! - Completion exactly once, with the target value
//! - Snap rules for inactive digits
//! - Domino ordering of anticipation
//! - Cancellation, supersession and fault isolation

use std::sync::Arc;

use parking_lot::Mutex;
use rf_odometer::{
    CallbackResult, CascadeController, CascadeEvent, CascadeRequest, CascadeSubscriber,
    DigitPhase, Direction, EmitKind, Recorder, SubscriberFault, TimingConfig, digits,
};

const SEEDS: u64 = 25;

fn controller() -> CascadeController {
    CascadeController::new(TimingConfig::normal())
}

/// Position of the first event matching `(position, phase)`
fn phase_index(events: &[CascadeEvent], position: usize, phase: DigitPhase) -> Option<usize> {
    events.iter().position(|e| {
        *e == CascadeEvent::Phase {
            position,
            phase,
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPLETION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_seven_digit_reveal_completes_once() {
    for seed in 0..SEEDS {
        let mut ctl = controller();
        let recorder = Recorder::new();

        let handle = ctl
            .start(
                CascadeRequest::new(0, 1_234_567, 7)
                    .with_active_digits(7)
                    .with_seed(seed),
                Box::new(recorder.clone()),
            )
            .unwrap();

        assert!(ctl.run_until_idle(handle.deadline_ms()), "seed {} overran ceiling", seed);
        ctl.advance_by(10_000);

        let events = recorder.events();
        assert_eq!(recorder.completions(), vec![1_234_567]);
        assert_eq!(events.last(), Some(&CascadeEvent::Complete { value: 1_234_567 }));
        assert_eq!(ctl.pending_timers(), 0);
    }
}

#[test]
fn test_equal_start_and_target() {
    let mut ctl = controller();
    let recorder = Recorder::new();

    ctl.start(CascadeRequest::new(42, 42, 7), Box::new(recorder.clone()))
        .unwrap();

    assert_eq!(recorder.ticks(), vec![42]);
    assert_eq!(recorder.completions(), vec![42]);
    assert_eq!(ctl.pending_timers(), 0);
    assert_eq!(ctl.next_deadline(), None);
}

#[test]
fn test_late_delivery_still_completes() {
    let mut ctl = controller();
    let recorder = Recorder::new();

    ctl.start(
        CascadeRequest::new(0, 7_777_777, 7).with_seed(4),
        Box::new(recorder.clone()),
    )
    .unwrap();

    // One starved wake-up far past every deadline
    ctl.advance_to(1_000_000);

    assert_eq!(recorder.completions(), vec![7_777_777]);
    assert!(ctl.is_idle());
}

// ═══════════════════════════════════════════════════════════════════════════════
// INACTIVE DIGITS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_msb_first_trailing_positions_snap() {
    let mut ctl = controller();
    let recorder = Recorder::new();

    ctl.start(
        CascadeRequest::new(0, 9_999_999, 7)
            .with_active_digits(3)
            .with_direction(Direction::MsbFirst)
            .with_seed(12),
        Box::new(recorder.clone()),
    )
    .unwrap();
    ctl.run_until_idle(60_000);

    let ticks = recorder.ticks();
    let first = digits::split(ticks[0], 7);
    assert_eq!(&first[3..], &[9, 9, 9, 9]);

    let mut moved = [false; 7];
    for tick in &ticks {
        let shown = digits::split(*tick, 7);
        for (position, digit) in shown.iter().enumerate() {
            if *digit != 9 {
                moved[position] = true;
            }
        }
    }
    assert_eq!(&moved[3..], &[false; 4]);
    assert!(moved[..3].iter().all(|m| *m));
}

#[test]
fn test_lsb_first_leading_positions_snap() {
    let mut ctl = controller();
    let recorder = Recorder::new();

    ctl.start(
        CascadeRequest::new(1_111_111, 8_888_888, 7)
            .with_active_digits(3)
            .with_direction(Direction::LsbFirst)
            .with_seed(6),
        Box::new(recorder.clone()),
    )
    .unwrap();
    ctl.run_until_idle(60_000);

    for tick in recorder.ticks() {
        assert_eq!(tick / 1_000, 8_888, "leading digits moved in {:07}", tick);
    }
    assert_eq!(recorder.completions(), vec![8_888_888]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// CASCADE ORDERING
// ═══════════════════════════════════════════════════════════════════════════════

fn assert_domino_order(direction: Direction, active: usize) {
    for seed in 0..SEEDS {
        let mut ctl = controller();
        let recorder = Recorder::new();

        ctl.start(
            CascadeRequest::new(0, 1_234_567, 7)
                .with_active_digits(active)
                .with_direction(direction)
                .with_seed(seed),
            Box::new(recorder.clone()),
        )
        .unwrap();
        ctl.run_until_idle(60_000);

        let events = recorder.events();
        let order = direction.cascade_order(7, active);

        // The head of the cascade always gets to anticipate
        assert!(phase_index(&events, order[0], DigitPhase::Anticipating).is_some());

        for pair in order.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if let Some(anticipated) = phase_index(&events, next, DigitPhase::Anticipating) {
                let prev_locked = phase_index(&events, prev, DigitPhase::Locked)
                    .expect("predecessor never locked");
                assert!(
                    prev_locked < anticipated,
                    "seed {}: digit {} anticipated before digit {} locked",
                    seed,
                    next,
                    prev
                );
            }
        }
    }
}

#[test]
fn test_domino_order_msb_first() {
    assert_domino_order(Direction::MsbFirst, 7);
}

#[test]
fn test_domino_order_lsb_first() {
    assert_domino_order(Direction::LsbFirst, 5);
}

#[test]
fn test_phases_only_move_forward() {
    let mut ctl = controller();
    let recorder = Recorder::new();

    ctl.start(
        CascadeRequest::new(0, 2_468_024, 7).with_seed(31),
        Box::new(recorder.clone()),
    )
    .unwrap();
    ctl.run_until_idle(60_000);

    for position in 0..7 {
        let phases: Vec<DigitPhase> = recorder
            .phases()
            .into_iter()
            .filter(|(p, _)| *p == position)
            .map(|(_, phase)| phase)
            .collect();
        assert!(phases.windows(2).all(|w| w[0] < w[1]), "{:?}", phases);
        assert_eq!(phases.first(), Some(&DigitPhase::Spinning));
        assert_eq!(phases.last(), Some(&DigitPhase::Locked));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CANCELLATION & REUSE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_cancel_mid_run_is_silent() {
    let mut ctl = controller();
    let recorder = Recorder::new();

    let handle = ctl
        .start(
            CascadeRequest::new(0, 1_234_567, 7).with_seed(17),
            Box::new(recorder.clone()),
        )
        .unwrap();
    ctl.advance_by(2_500);
    let seen = recorder.len();

    ctl.cancel(handle);
    ctl.cancel(handle);
    ctl.advance_to(handle.deadline_ms() + 10_000);

    assert_eq!(recorder.len(), seen);
    assert!(recorder.completions().is_empty());
    assert!(ctl.snapshot().is_none());
}

#[test]
fn test_sequential_runs_are_reproducible() {
    let mut ctl = controller();
    let request = CascadeRequest::new(0, 3_141_592, 7).with_seed(2024);

    let first = Recorder::new();
    let a = ctl.start(request.clone(), Box::new(first.clone())).unwrap();
    ctl.run_until_idle(a.deadline_ms());
    assert_eq!(ctl.pending_timers(), 0);

    let second = Recorder::new();
    let b = ctl.start(request, Box::new(second.clone())).unwrap();
    ctl.run_until_idle(b.deadline_ms());
    assert_eq!(ctl.pending_timers(), 0);

    assert_ne!(a.run_id(), b.run_id());
    assert_eq!(first.completions(), vec![3_141_592]);
    assert_eq!(second.completions(), vec![3_141_592]);
    assert_eq!(first.events(), second.events());
}

#[test]
fn test_new_start_supersedes_old_run() {
    let mut ctl = controller();
    let old = Recorder::new();
    let new = Recorder::new();

    let first = ctl
        .start(
            CascadeRequest::new(0, 1_111_111, 7).with_seed(1),
            Box::new(old.clone()),
        )
        .unwrap();
    ctl.advance_by(1_500);
    let seen = old.len();

    let second = ctl
        .start(
            CascadeRequest::new(0, 2_222_222, 7).with_seed(2),
            Box::new(new.clone()),
        )
        .unwrap();
    assert!(!ctl.is_active(first));
    assert!(ctl.is_active(second));

    ctl.run_until_idle(60_000);

    assert_eq!(old.len(), seen);
    assert!(old.completions().is_empty());
    assert_eq!(new.completions(), vec![2_222_222]);
    assert_eq!(ctl.stats().runs_cancelled, 1);
    assert_eq!(ctl.stats().runs_completed, 1);
}

// ═══════════════════════════════════════════════════════════════════════════════
// FAULT ISOLATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Renderer that panics on every fifth frame and fails completion
struct FlakyRenderer {
    frames: u64,
    completed: Arc<Mutex<Option<u64>>>,
}

impl CascadeSubscriber for FlakyRenderer {
    fn on_tick(&mut self, _value: u64) -> CallbackResult {
        self.frames += 1;
        if self.frames % 5 == 0 {
            panic!("frame {} dropped", self.frames);
        }
        Ok(())
    }

    fn on_complete(&mut self, value: u64) -> CallbackResult {
        *self.completed.lock() = Some(value);
        Err("winner banner failed to render".into())
    }
}

#[test]
fn test_faulty_subscriber_does_not_stall_reveal() {
    let faults = Arc::new(Mutex::new(Vec::<SubscriberFault>::new()));
    let sink = faults.clone();
    let mut ctl = controller().with_error_observer(move |fault: &SubscriberFault| {
        sink.lock().push(fault.clone());
    });

    let completed = Arc::new(Mutex::new(None));
    ctl.start(
        CascadeRequest::new(0, 5_550_555, 7).with_seed(99),
        Box::new(FlakyRenderer {
            frames: 0,
            completed: completed.clone(),
        }),
    )
    .unwrap();
    assert!(ctl.run_until_idle(60_000));

    assert_eq!(*completed.lock(), Some(5_550_555));

    let faults = faults.lock();
    assert!(faults.iter().any(|f| f.event == EmitKind::Tick));
    assert_eq!(faults.last().map(|f| f.event), Some(EmitKind::Complete));
    assert_eq!(ctl.stats().subscriber_faults, faults.len() as u64);
}
