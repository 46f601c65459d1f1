//! # rf-odometer: Digit-Cascade Reveal Scheduler
//!
//! Reveals a drawn fixed-width number one digit at a time. Every digit spins
//! through transient values and locks onto its final digit; a digit may only
//! start decelerating once its neighbour in cascade order has locked, so the
//! reveal falls like dominoes.
//!
//! ## Features
//!
//! - **Timing Policy**: stagger offsets, overshoot and spin durations from a
//!   seedable generator, with a deterministic completion ceiling
//! - **Digit Reels**: forward-only `Idle → Spinning → Anticipating → Locked`
//!   phase machine per position
//! - **Cascade Controller**: one active run, one `RunId`-guarded timer queue,
//!   ordered tick/completion events
//! - **Isolated Subscribers**: a failing renderer never stalls the reveal
//! - **Cues**: tick/lock/fanfare audio triggers derived from the event stream
//! - **Driver**: real-time timer thread with a command queue
//!
//! ## Architecture
//!
//! ```text
//! CascadeController
//!     │
//!     ├── TimingPolicy (TimingConfig: Normal / Turbo / Studio)
//!     ├── TimerQueue (SpinStart / Tick / Lock, tagged by RunId)
//!     └── CascadeRun
//!           ├── DigitReel × digit_count
//!           └── Emitter ──▶ CascadeSubscriber (renderer, CueSubscriber, ...)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rf_odometer::{CascadeController, CascadeRequest, CallbackSubscriber, TimingConfig};
//!
//! let mut controller = CascadeController::new(TimingConfig::normal());
//! let handle = controller.start(
//!     CascadeRequest::new(0, 1_234_567, 7).with_seed(42),
//!     Box::new(CallbackSubscriber::new(
//!         |value| println!("{:07}", value),
//!         |value| println!("winner {:07}", value),
//!     )),
//! )?;
//!
//! // Drive with fake time (tests) or hand it to a CascadeDriver (real time)
//! controller.run_until_idle(handle.deadline_ms());
//! ```

pub mod config;
pub mod controller;
pub mod cue;
pub mod digits;
pub mod driver;
pub mod emitter;
pub mod error;
pub mod reel;
pub mod timer;
pub mod timing;

pub use config::{CascadeRequest, Direction, ResolvedRequest};
pub use controller::{CascadeController, ControllerStats, DigitView, RunHandle, RunSnapshot};
pub use cue::{Cue, CuePreferences, CueSink, CueSubscriber};
pub use driver::{CascadeDriver, DriverHandle};
pub use emitter::{
    CallbackError, CallbackResult, CallbackSubscriber, CascadeEvent, CascadeSubscriber, EmitKind,
    ErrorObserver, LogObserver, Recorder, SubscriberFault,
};
pub use error::{CascadeError, CascadeResult, ReelError};
pub use reel::{DigitPhase, DigitReel};
pub use timer::RunId;
pub use timing::{
    CascadeSchedule, DigitSchedule, OvershootRange, TimingConfig, TimingPolicy, TimingProfile,
};
