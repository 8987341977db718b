//! Cycle lifecycle state machine.
//!
//! One cycle moves strictly forward through its phases; the last transition
//! hands the caller off to the next cycle or to the session debrief.
//!
//! ## Transitions
//!
//! ```text
//! Planning  --PlanSaved-->     Working
//! Working   --WorkFinished-->  Reviewing
//! Reviewing --ReviewSaved-->   Breaking
//! Breaking  --BreakFinished--> Handoff(NextCycle | Debrief)
//! ```
//!
//! The new phase is written to the phase marker before the transition is
//! reported, so an interruption resumes at a consistent phase.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::marker::{read_phase, write_phase, PhaseMarkerStore};
use crate::error::{CoreError, Result, ValidationError};
use crate::events::Event;
use crate::session::{Cycle, CyclePlan, CycleReview, CycleStatus, Session, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Planning,
    Working,
    Reviewing,
    Breaking,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Planning => "planning",
            CyclePhase::Working => "working",
            CyclePhase::Reviewing => "reviewing",
            CyclePhase::Breaking => "breaking",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(CyclePhase::Planning),
            "working" => Some(CyclePhase::Working),
            "reviewing" => Some(CyclePhase::Reviewing),
            "breaking" => Some(CyclePhase::Breaking),
            _ => None,
        }
    }

    /// Phases driven by a countdown.
    pub fn is_timed(&self) -> bool {
        matches!(self, CyclePhase::Working | CyclePhase::Breaking)
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    PlanSaved,
    WorkFinished,
    ReviewSaved,
    BreakFinished,
    /// A countdown ended in a phase that has none.
    TimerFinished,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trigger::PlanSaved => "plan-saved",
            Trigger::WorkFinished => "work-finished",
            Trigger::ReviewSaved => "review-saved",
            Trigger::BreakFinished => "break-finished",
            Trigger::TimerFinished => "timer-finished",
        })
    }
}

/// Outcome of a table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Enter(CyclePhase),
    Leave,
}

/// The transition table. `None` means the trigger is not accepted.
pub fn next_step(phase: CyclePhase, trigger: Trigger) -> Option<Step> {
    use CyclePhase::*;
    match (phase, trigger) {
        (Planning, Trigger::PlanSaved) => Some(Step::Enter(Working)),
        (Working, Trigger::WorkFinished) => Some(Step::Enter(Reviewing)),
        (Reviewing, Trigger::ReviewSaved) => Some(Step::Enter(Breaking)),
        (Breaking, Trigger::BreakFinished) => Some(Step::Leave),
        _ => None,
    }
}

/// Where the caller should go once a cycle's break is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", rename_all = "snake_case")]
pub enum Handoff {
    NextCycle {
        session_id: String,
        cycle_number: u32,
    },
    Debrief {
        session_id: String,
    },
}

/// Phase to show when a cycle is (re)entered.
///
/// No record means the cycle still needs a plan. An in-progress record
/// restores a post-planning marker or defaults to Working. A completed
/// record goes to the break leading into the next cycle.
pub fn initial_phase(cycle: Option<&Cycle>, marker: Option<CyclePhase>) -> CyclePhase {
    match cycle.map(|c| c.status) {
        None => CyclePhase::Planning,
        Some(CycleStatus::InProgress) => match marker {
            Some(phase @ (CyclePhase::Working | CyclePhase::Reviewing | CyclePhase::Breaking)) => {
                phase
            }
            _ => CyclePhase::Working,
        },
        Some(CycleStatus::Completed) => CyclePhase::Breaking,
    }
}

/// Cycle record and phase to (re)enter `cycle_number` at, without writing
/// anything.
pub fn resume_point<S, M>(
    store: &S,
    markers: &M,
    session: &Session,
    cycle_number: u32,
) -> Result<(Option<Cycle>, CyclePhase)>
where
    S: SessionStore + ?Sized,
    M: PhaseMarkerStore + ?Sized,
{
    if cycle_number == 0 || cycle_number > session.total_cycles {
        return Err(ValidationError::InvalidValue {
            field: "cycle_number",
            message: format!("must be between 1 and {}", session.total_cycles),
        }
        .into());
    }
    let cycle = store.find_cycle(&session.id, cycle_number)?;
    let marker = read_phase(markers, &session.id, cycle_number);
    let phase = initial_phase(cycle.as_ref(), marker);
    Ok((cycle, phase))
}

/// Drives one cycle of one session.
pub struct CycleLifecycle<S, M> {
    store: S,
    markers: M,
    session_id: String,
    total_cycles: u32,
    cycle_number: u32,
    cycle_id: Option<String>,
    phase: CyclePhase,
    handoff: Option<Handoff>,
}

impl<S: SessionStore, M: PhaseMarkerStore> CycleLifecycle<S, M> {
    /// Enter `cycle_number` of `session`, restoring the phase if possible.
    pub fn enter(store: S, markers: M, session: &Session, cycle_number: u32) -> Result<Self> {
        let (cycle, phase) = resume_point(&store, &markers, session, cycle_number)?;

        let lifecycle = Self {
            store,
            markers,
            session_id: session.id.clone(),
            total_cycles: session.total_cycles,
            cycle_number,
            cycle_id: cycle.map(|c| c.id),
            phase,
            handoff: None,
        };
        lifecycle.persist_phase(phase);
        info!(
            session_id = %lifecycle.session_id,
            cycle_number,
            %phase,
            "entered cycle"
        );
        Ok(lifecycle)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn cycle_number(&self) -> u32 {
        self.cycle_number
    }

    pub fn cycle_id(&self) -> Option<&str> {
        self.cycle_id.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Set once the break of this cycle has finished.
    pub fn handoff(&self) -> Option<&Handoff> {
        self.handoff.as_ref()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Validate and persist the plan, then start working.
    ///
    /// On a validation or store failure the phase is unchanged and the same
    /// plan can be submitted again.
    pub fn submit_plan(&mut self, plan: &CyclePlan) -> Result<Event> {
        self.guard(Trigger::PlanSaved)?;
        plan.validate()?;
        let cycle_id = self
            .store
            .save_cycle_plan(&self.session_id, self.cycle_number, plan)?;
        self.cycle_id = Some(cycle_id);
        self.fire(Trigger::PlanSaved)
    }

    /// The work countdown completed, naturally or by `finish`.
    pub fn complete_work(&mut self) -> Result<Event> {
        self.fire(Trigger::WorkFinished)
    }

    /// Validate and persist the review, then start the break.
    pub fn submit_review(&mut self, review: &CycleReview) -> Result<Event> {
        self.guard(Trigger::ReviewSaved)?;
        review.validate()?;
        let cycle_id = self.resolve_cycle_id()?;
        self.store.save_cycle_review(&cycle_id, review)?;
        self.fire(Trigger::ReviewSaved)
    }

    /// The break countdown completed. Produces the hand-off.
    pub fn complete_break(&mut self) -> Result<Event> {
        self.fire(Trigger::BreakFinished)
    }

    /// Apply the trigger matching a finished countdown in the current phase.
    pub fn complete_timer(&mut self) -> Result<Event> {
        match self.phase {
            CyclePhase::Working => self.complete_work(),
            CyclePhase::Breaking => self.complete_break(),
            phase => Err(CoreError::InvalidTransition {
                phase,
                trigger: Trigger::TimerFinished,
            }),
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn guard(&self, trigger: Trigger) -> Result<Step> {
        if self.handoff.is_some() {
            return Err(CoreError::InvalidTransition {
                phase: self.phase,
                trigger,
            });
        }
        next_step(self.phase, trigger).ok_or(CoreError::InvalidTransition {
            phase: self.phase,
            trigger,
        })
    }

    fn fire(&mut self, trigger: Trigger) -> Result<Event> {
        let step = self.guard(trigger)?;
        match step {
            Step::Enter(to) => {
                let from = self.phase;
                self.persist_phase(to);
                self.phase = to;
                info!(
                    session_id = %self.session_id,
                    cycle_number = self.cycle_number,
                    %from,
                    %to,
                    "phase changed"
                );
                Ok(Event::PhaseChanged {
                    session_id: self.session_id.clone(),
                    cycle_number: self.cycle_number,
                    from,
                    to,
                    at: Utc::now(),
                })
            }
            Step::Leave => {
                let handoff = if self.cycle_number < self.total_cycles {
                    Handoff::NextCycle {
                        session_id: self.session_id.clone(),
                        cycle_number: self.cycle_number + 1,
                    }
                } else {
                    Handoff::Debrief {
                        session_id: self.session_id.clone(),
                    }
                };
                info!(
                    session_id = %self.session_id,
                    cycle_number = self.cycle_number,
                    ?handoff,
                    "cycle handed off"
                );
                self.handoff = Some(handoff.clone());
                Ok(Event::CycleHandoff {
                    session_id: self.session_id.clone(),
                    cycle_number: self.cycle_number,
                    handoff,
                    at: Utc::now(),
                })
            }
        }
    }

    fn resolve_cycle_id(&mut self) -> Result<String> {
        if let Some(id) = &self.cycle_id {
            return Ok(id.clone());
        }
        let cycle = self
            .store
            .find_cycle(&self.session_id, self.cycle_number)?
            .ok_or_else(|| CoreError::NotFound {
                kind: "cycle",
                id: format!("{}#{}", self.session_id, self.cycle_number),
            })?;
        self.cycle_id = Some(cycle.id.clone());
        Ok(cycle.id)
    }

    fn persist_phase(&self, phase: CyclePhase) {
        if let Err(e) = write_phase(&self.markers, &self.session_id, self.cycle_number, phase) {
            warn!(
                session_id = %self.session_id,
                cycle_number = self.cycle_number,
                error = %e,
                "failed to persist phase marker"
            );
        }
    }
}
