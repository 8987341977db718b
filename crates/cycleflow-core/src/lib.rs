//! # Cycleflow Core Library
//!
//! This library provides the core logic for structured focus sessions. A
//! session is prepared once, then runs a fixed number of work cycles, each
//! planned, worked, reviewed and followed by a break, and ends with a debrief.
//! The `cycleflow` CLI is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Timer**: A wall-clock-anchored countdown running on a tokio task, with a
//!   controller that adds pause/resume, manual finish and completion side
//!   effects
//! - **Cycle**: The per-cycle lifecycle state machine, its phase markers, and
//!   the flow that binds it to the timer
//! - **Session**: Records, validation and the session store interface
//! - **Storage**: SQLite persistence and TOML-based configuration
//! - **Stats**: Streaks, completion rates, energy trend and keywords
//!
//! ## Key Components
//!
//! - [`CountdownEngine`]: Drift-free countdown
//! - [`TimerController`]: Pausable timer with completion notification
//! - [`CycleLifecycle`]: Planning → Working → Reviewing → Breaking
//! - [`Database`]: Session, cycle and marker persistence
//! - [`Config`]: Application configuration management

pub mod cycle;
pub mod error;
pub mod events;
pub mod session;
pub mod stats;
pub mod storage;
pub mod timer;

pub use cycle::{CycleFlow, CycleLifecycle, CyclePhase, Handoff, TimerCommand, Trigger};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::Event;
pub use session::{
    Cycle, CyclePlan, CycleReview, DebriefAnswers, Level, PreparationAnswers, Session,
    SessionPrepare, SessionStore,
};
pub use storage::{Config, Database};
pub use timer::{CountdownEngine, TimerController};
