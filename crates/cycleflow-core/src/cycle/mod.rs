//! Per-cycle phase sequencing: plan, work, review, break.

mod flow;
mod lifecycle;
mod marker;

pub use flow::{CycleFlow, TimerCommand};
pub use lifecycle::{
    initial_phase, next_step, resume_point, CycleLifecycle, CyclePhase, Handoff, Step, Trigger,
};
pub use marker::{
    marker_key, read_phase, write_phase, MemoryMarkerStore, PhaseMarkerStore,
};
