//! Event delivery to external collaborators
//!
//! Renderers, audio and confetti triggers plug in as a [`CascadeSubscriber`].
//! Each callback runs behind an isolation boundary: an `Err` or a panic is
//! reported to the [`ErrorObserver`] and the run carries on.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::reel::DigitPhase;
use crate::timer::RunId;

/// Error returned by a subscriber callback
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a subscriber callback
pub type CallbackResult = Result<(), CallbackError>;

/// Receiver of cascade events
///
/// `on_tick` values are transient display states; only `on_complete` is
/// authoritative and always equals the run's target value.
pub trait CascadeSubscriber: Send {
    /// Composed display value changed
    fn on_tick(&mut self, value: u64) -> CallbackResult;

    /// Every active digit is locked; fires once per run
    fn on_complete(&mut self, value: u64) -> CallbackResult;

    /// A digit changed phase
    fn on_phase(&mut self, _position: usize, _phase: DigitPhase) -> CallbackResult {
        Ok(())
    }
}

/// Subscriber built from two closures
pub struct CallbackSubscriber<T, C> {
    on_tick: T,
    on_complete: C,
}

impl<T, C> CallbackSubscriber<T, C>
where
    T: FnMut(u64) + Send,
    C: FnMut(u64) + Send,
{
    pub fn new(on_tick: T, on_complete: C) -> Self {
        Self {
            on_tick,
            on_complete,
        }
    }
}

impl<T, C> CascadeSubscriber for CallbackSubscriber<T, C>
where
    T: FnMut(u64) + Send,
    C: FnMut(u64) + Send,
{
    fn on_tick(&mut self, value: u64) -> CallbackResult {
        (self.on_tick)(value);
        Ok(())
    }

    fn on_complete(&mut self, value: u64) -> CallbackResult {
        (self.on_complete)(value);
        Ok(())
    }
}

/// Which callback a fault came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitKind {
    Tick,
    Phase,
    Complete,
}

/// A subscriber callback that failed or panicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFault {
    pub run_id: RunId,
    pub event: EmitKind,
    pub message: String,
}

/// Hook for subscriber faults
pub trait ErrorObserver: Send {
    fn on_fault(&mut self, fault: &SubscriberFault);
}

impl<F> ErrorObserver for F
where
    F: FnMut(&SubscriberFault) + Send,
{
    fn on_fault(&mut self, fault: &SubscriberFault) {
        self(fault)
    }
}

/// Default observer: log and move on
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ErrorObserver for LogObserver {
    fn on_fault(&mut self, fault: &SubscriberFault) {
        log::warn!(
            "{} subscriber {:?} callback failed: {}",
            fault.run_id,
            fault.event,
            fault.message
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic (unknown payload)".to_string()
    }
}

/// Subscriber of one run plus its isolation boundary
pub(crate) struct Emitter {
    run_id: RunId,
    subscriber: Box<dyn CascadeSubscriber>,
    faults: u64,
}

impl Emitter {
    pub(crate) fn new(run_id: RunId, subscriber: Box<dyn CascadeSubscriber>) -> Self {
        Self {
            run_id,
            subscriber,
            faults: 0,
        }
    }

    pub(crate) fn faults(&self) -> u64 {
        self.faults
    }

    pub(crate) fn tick(&mut self, value: u64, observer: &mut dyn ErrorObserver) {
        let subscriber = &mut self.subscriber;
        let fault = isolate(self.run_id, EmitKind::Tick, || subscriber.on_tick(value));
        self.report(fault, observer);
    }

    pub(crate) fn phase(
        &mut self,
        position: usize,
        phase: DigitPhase,
        observer: &mut dyn ErrorObserver,
    ) {
        let subscriber = &mut self.subscriber;
        let fault = isolate(self.run_id, EmitKind::Phase, || {
            subscriber.on_phase(position, phase)
        });
        self.report(fault, observer);
    }

    pub(crate) fn complete(&mut self, value: u64, observer: &mut dyn ErrorObserver) {
        let subscriber = &mut self.subscriber;
        let fault = isolate(self.run_id, EmitKind::Complete, || {
            subscriber.on_complete(value)
        });
        self.report(fault, observer);
    }

    fn report(&mut self, fault: Option<SubscriberFault>, observer: &mut dyn ErrorObserver) {
        let Some(fault) = fault else {
            return;
        };
        self.faults += 1;
        // A panicking observer must not take the scheduler down either
        if panic::catch_unwind(AssertUnwindSafe(|| observer.on_fault(&fault))).is_err() {
            log::error!("{} error observer panicked", fault.run_id);
        }
    }
}

/// Run one callback, turning an `Err` or a panic into a fault
fn isolate<F>(run_id: RunId, event: EmitKind, callback: F) -> Option<SubscriberFault>
where
    F: FnOnce() -> CallbackResult,
{
    let message = match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => return None,
        Ok(Err(e)) => e.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };
    Some(SubscriberFault {
        run_id,
        event,
        message,
    })
}

/// Recorded cascade event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CascadeEvent {
    Tick { value: u64 },
    Phase { position: usize, phase: DigitPhase },
    Complete { value: u64 },
}

/// Subscriber that records every event into a shared log
///
/// Clones share the same log, so one clone can be handed to the controller
/// while another is inspected.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<CascadeEvent>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CascadeEvent> {
        self.events.lock().clone()
    }

    pub fn ticks(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                CascadeEvent::Tick { value } => Some(*value),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                CascadeEvent::Complete { value } => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Phase transitions in delivery order
    pub fn phases(&self) -> Vec<(usize, DigitPhase)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                CascadeEvent::Phase { position, phase } => Some((*position, *phase)),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl CascadeSubscriber for Recorder {
    fn on_tick(&mut self, value: u64) -> CallbackResult {
        self.events.lock().push(CascadeEvent::Tick { value });
        Ok(())
    }

    fn on_complete(&mut self, value: u64) -> CallbackResult {
        self.events.lock().push(CascadeEvent::Complete { value });
        Ok(())
    }

    fn on_phase(&mut self, position: usize, phase: DigitPhase) -> CallbackResult {
        self.events
            .lock()
            .push(CascadeEvent::Phase { position, phase });
        Ok(())
    }
}
