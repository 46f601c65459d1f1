//! Real-time driver
//!
//! Runs a [`CascadeController`] on a dedicated timer thread. Callers talk to
//! it through a [`DriverHandle`]; every start/cancel travels down one ordered
//! command queue, so the thread is the only place a run is ever mutated and
//! subscriber callbacks always run there.
//!
//! The thread owns the controller outright. After every fire it publishes a
//! snapshot and the counters; handles only ever read that copy, so a
//! subscriber may call [`DriverHandle::snapshot`] from inside a callback.
//!
//! ```text
//!   caller threads                      rf-odometer thread
//!   ┌──────────────┐   Command queue   ┌──────────────────────────┐
//!   │ start()      │──────────────────▶│ recv_timeout(next timer) │
//!   │ cancel()     │   (crossbeam)     │ advance_to(wall clock)   │
//!   │ snapshot()   │◀─── Published ────│ CascadeController        │
//!   └──────────────┘                   └──────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use parking_lot::{Condvar, Mutex};

use crate::config::CascadeRequest;
use crate::controller::{CascadeController, ControllerStats, RunHandle, RunSnapshot};
use crate::emitter::CascadeSubscriber;
use crate::error::{CascadeError, CascadeResult};

/// Longest the thread sleeps when no timer is armed
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Commands sent to the timer thread
enum Command {
    Start {
        request: CascadeRequest,
        subscriber: Box<dyn CascadeSubscriber>,
        reply: Sender<CascadeResult<RunHandle>>,
    },
    Cancel(RunHandle),
    CancelActive,
    Shutdown,
}

/// Controller state as of the last fire
#[derive(Debug, Clone, Default)]
struct Published {
    snapshot: Option<RunSnapshot>,
    stats: ControllerStats,
    idle: bool,
}

struct Shared {
    published: Mutex<Published>,
    /// Signalled whenever the controller goes idle
    idle: Condvar,
    running: AtomicBool,
    thread_id: OnceLock<ThreadId>,
}

impl Shared {
    fn publish(&self, controller: &CascadeController) {
        let idle = controller.is_idle();
        *self.published.lock() = Published {
            snapshot: controller.snapshot(),
            stats: controller.stats(),
            idle,
        };
        if idle {
            self.idle.notify_all();
        }
    }

    fn on_driver_thread(&self) -> bool {
        self.thread_id.get() == Some(&thread::current().id())
    }
}

/// Thread-safe handle to a running driver
#[derive(Clone)]
pub struct DriverHandle {
    tx: Sender<Command>,
    shared: Arc<Shared>,
}

impl DriverHandle {
    /// Start a run on the driver thread
    ///
    /// Fails with [`CascadeError::StartFromCallback`] when called from a
    /// subscriber callback, since the thread cannot answer itself.
    pub fn start(
        &self,
        request: CascadeRequest,
        subscriber: Box<dyn CascadeSubscriber>,
    ) -> CascadeResult<RunHandle> {
        if self.shared.on_driver_thread() {
            return Err(CascadeError::StartFromCallback);
        }
        let (reply, reply_rx) = bounded(1);
        self.tx
            .send(Command::Start {
                request,
                subscriber,
                reply,
            })
            .map_err(|_| CascadeError::DriverUnavailable)?;
        reply_rx
            .recv()
            .map_err(|_| CascadeError::DriverUnavailable)?
    }

    /// Cancel a run (idempotent)
    pub fn cancel(&self, handle: RunHandle) {
        let _ = self.tx.send(Command::Cancel(handle));
    }

    pub fn cancel_active(&self) {
        let _ = self.tx.send(Command::CancelActive);
    }

    pub fn snapshot(&self) -> Option<RunSnapshot> {
        self.shared.published.lock().snapshot.clone()
    }

    pub fn stats(&self) -> ControllerStats {
        self.shared.published.lock().stats
    }

    pub fn is_idle(&self) -> bool {
        self.shared.published.lock().idle
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Block until no run is in progress; `false` on timeout
    ///
    /// Never blocks on the driver thread itself.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        if self.shared.on_driver_thread() {
            return self.is_idle();
        }
        let deadline = Instant::now() + timeout;
        let mut published = self.shared.published.lock();
        while !published.idle {
            if self
                .shared
                .idle
                .wait_until(&mut published, deadline)
                .timed_out()
            {
                return published.idle;
            }
        }
        true
    }
}

/// Owner of the timer thread; shuts it down on drop
pub struct CascadeDriver {
    handle: DriverHandle,
    thread: Option<JoinHandle<()>>,
}

impl CascadeDriver {
    /// Move `controller` onto a new timer thread
    pub fn spawn(controller: CascadeController) -> std::io::Result<Self> {
        let (tx, rx) = unbounded();
        let shared = Arc::new(Shared {
            published: Mutex::new(Published::default()),
            idle: Condvar::new(),
            running: AtomicBool::new(true),
            thread_id: OnceLock::new(),
        });
        shared.publish(&controller);

        let thread_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("rf-odometer".into())
            .spawn(move || run_loop(controller, thread_shared, rx))?;

        log::info!("Cascade driver started");
        Ok(Self {
            handle: DriverHandle { tx, shared },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> DriverHandle {
        self.handle.clone()
    }

    /// Stop the thread and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.handle.tx.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Cascade driver thread panicked");
            }
        }
    }
}

impl std::ops::Deref for CascadeDriver {
    type Target = DriverHandle;

    fn deref(&self) -> &DriverHandle {
        &self.handle
    }
}

impl Drop for CascadeDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fire everything due by `now`, publishing after each batch
fn catch_up(controller: &mut CascadeController, now: u64, shared: &Shared) {
    while let Some(due) = controller.next_deadline().filter(|due| *due <= now) {
        controller.advance_to(due);
        shared.publish(controller);
    }
    controller.advance_to(now);
    shared.publish(controller);
}

fn run_loop(mut controller: CascadeController, shared: Arc<Shared>, rx: Receiver<Command>) {
    let _ = shared.thread_id.set(thread::current().id());
    let base_ms = controller.now_ms();
    let epoch = Instant::now();
    let clock = || base_ms.saturating_add(epoch.elapsed().as_millis() as u64);

    loop {
        let now = clock();
        catch_up(&mut controller, now, &shared);
        let wait = controller
            .next_deadline()
            .map(|due| Duration::from_millis(due.saturating_sub(now)))
            .unwrap_or(IDLE_POLL);

        match rx.recv_timeout(wait) {
            Ok(Command::Start {
                request,
                subscriber,
                reply,
            }) => {
                catch_up(&mut controller, clock(), &shared);
                let result = controller.start(request, subscriber);
                shared.publish(&controller);
                if reply.send(result).is_err() {
                    log::debug!("Start caller went away before the reply");
                }
            }
            Ok(Command::Cancel(handle)) => {
                controller.cancel(handle);
                shared.publish(&controller);
            }
            Ok(Command::CancelActive) => {
                controller.cancel_active();
                shared.publish(&controller);
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    shared.idle.notify_all();
    log::info!("Cascade driver exiting");
}
