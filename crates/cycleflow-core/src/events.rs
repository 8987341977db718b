use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cycle::{CyclePhase, Handoff};

/// Every state change in the system produces an Event.
/// Front-ends render from them and route on `CycleHandoff`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        label: String,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    TimerProgress {
        remaining_secs: u64,
        total_secs: u64,
    },
    TimerPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerCompleted {
        label: String,
        /// Ended with `finish` before reaching zero.
        manual: bool,
        at: DateTime<Utc>,
    },
    PhaseChanged {
        session_id: String,
        cycle_number: u32,
        from: CyclePhase,
        to: CyclePhase,
        at: DateTime<Utc>,
    },
    CycleHandoff {
        session_id: String,
        cycle_number: u32,
        handoff: Handoff,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn is_timer_completed(&self) -> bool {
        matches!(self, Event::TimerCompleted { .. })
    }
}
