use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use super::{
    Cycle, CyclePlan, CycleReview, CycleStatus, DebriefAnswers, Session, SessionPrepare,
    SessionStatus,
};
use crate::error::DatabaseError;

/// Authoritative storage for sessions and their cycles.
///
/// Implementations do not validate; callers go through [`super::prepare`],
/// [`super::debrief`] and the cycle lifecycle, which do.
pub trait SessionStore {
    fn create_session(&self, prepare: &SessionPrepare) -> Result<String, DatabaseError>;

    fn get_session(&self, session_id: &str) -> Result<Option<Session>, DatabaseError>;

    fn list_sessions(&self) -> Result<Vec<Session>, DatabaseError>;

    fn find_cycle(
        &self,
        session_id: &str,
        cycle_number: u32,
    ) -> Result<Option<Cycle>, DatabaseError>;

    fn list_cycles(&self, session_id: &str) -> Result<Vec<Cycle>, DatabaseError>;

    /// Create the cycle with its plan, or replace the plan of the cycle that
    /// already exists for `(session_id, cycle_number)`. Returns the cycle id.
    fn save_cycle_plan(
        &self,
        session_id: &str,
        cycle_number: u32,
        plan: &CyclePlan,
    ) -> Result<String, DatabaseError>;

    /// Store the review and mark the cycle completed.
    fn save_cycle_review(&self, cycle_id: &str, review: &CycleReview)
        -> Result<(), DatabaseError>;

    fn complete_session(
        &self,
        session_id: &str,
        debrief: &DebriefAnswers,
    ) -> Result<(), DatabaseError>;

    fn abandon_session(&self, session_id: &str) -> Result<(), DatabaseError>;
}

impl<T: SessionStore + ?Sized> SessionStore for &T {
    fn create_session(&self, prepare: &SessionPrepare) -> Result<String, DatabaseError> {
        (**self).create_session(prepare)
    }

    fn get_session(&self, session_id: &str) -> Result<Option<Session>, DatabaseError> {
        (**self).get_session(session_id)
    }

    fn list_sessions(&self) -> Result<Vec<Session>, DatabaseError> {
        (**self).list_sessions()
    }

    fn find_cycle(
        &self,
        session_id: &str,
        cycle_number: u32,
    ) -> Result<Option<Cycle>, DatabaseError> {
        (**self).find_cycle(session_id, cycle_number)
    }

    fn list_cycles(&self, session_id: &str) -> Result<Vec<Cycle>, DatabaseError> {
        (**self).list_cycles(session_id)
    }

    fn save_cycle_plan(
        &self,
        session_id: &str,
        cycle_number: u32,
        plan: &CyclePlan,
    ) -> Result<String, DatabaseError> {
        (**self).save_cycle_plan(session_id, cycle_number, plan)
    }

    fn save_cycle_review(
        &self,
        cycle_id: &str,
        review: &CycleReview,
    ) -> Result<(), DatabaseError> {
        (**self).save_cycle_review(cycle_id, review)
    }

    fn complete_session(
        &self,
        session_id: &str,
        debrief: &DebriefAnswers,
    ) -> Result<(), DatabaseError> {
        (**self).complete_session(session_id, debrief)
    }

    fn abandon_session(&self, session_id: &str) -> Result<(), DatabaseError> {
        (**self).abandon_session(session_id)
    }
}

#[derive(Default)]
struct MemoryState {
    sessions: Vec<Session>,
    cycles: Vec<Cycle>,
    /// Makes the next write fail once, for exercising retry paths.
    fail_next: bool,
}

/// In-process store, used by tests and by front-ends without a database.
#[derive(Default)]
pub struct MemorySessionStore {
    state: Mutex<MemoryState>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write call fail with [`DatabaseError::Locked`].
    pub fn fail_next_write(&self) {
        self.lock().fail_next = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, DatabaseError> {
        let mut state = self.lock();
        if std::mem::take(&mut state.fail_next) {
            return Err(DatabaseError::Locked);
        }
        Ok(state)
    }
}

fn not_found(kind: &str, id: &str) -> DatabaseError {
    DatabaseError::QueryFailed(format!("{kind} {id} does not exist"))
}

impl SessionStore for MemorySessionStore {
    fn create_session(&self, prepare: &SessionPrepare) -> Result<String, DatabaseError> {
        let mut state = self.write()?;
        let id = uuid::Uuid::new_v4().to_string();
        state.sessions.push(Session {
            id: id.clone(),
            created_at: Utc::now(),
            completed_at: None,
            cycle_duration_min: prepare.cycle_duration_min,
            break_duration_min: prepare.break_duration_min,
            total_cycles: prepare.total_cycles,
            status: SessionStatus::InProgress,
            preparation: prepare.answers.clone(),
            debrief: None,
        });
        Ok(id)
    }

    fn get_session(&self, session_id: &str) -> Result<Option<Session>, DatabaseError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned())
    }

    fn list_sessions(&self) -> Result<Vec<Session>, DatabaseError> {
        let mut sessions = self.lock().sessions.clone();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    fn find_cycle(
        &self,
        session_id: &str,
        cycle_number: u32,
    ) -> Result<Option<Cycle>, DatabaseError> {
        Ok(self
            .lock()
            .cycles
            .iter()
            .find(|c| c.session_id == session_id && c.cycle_number == cycle_number)
            .cloned())
    }

    fn list_cycles(&self, session_id: &str) -> Result<Vec<Cycle>, DatabaseError> {
        let mut cycles: Vec<Cycle> = self
            .lock()
            .cycles
            .iter()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect();
        cycles.sort_by_key(|c| c.cycle_number);
        Ok(cycles)
    }

    fn save_cycle_plan(
        &self,
        session_id: &str,
        cycle_number: u32,
        plan: &CyclePlan,
    ) -> Result<String, DatabaseError> {
        let mut state = self.write()?;
        if !state.sessions.iter().any(|s| s.id == session_id) {
            return Err(not_found("session", session_id));
        }
        if let Some(existing) = state
            .cycles
            .iter_mut()
            .find(|c| c.session_id == session_id && c.cycle_number == cycle_number)
        {
            existing.plan = Some(plan.clone());
            return Ok(existing.id.clone());
        }
        let id = uuid::Uuid::new_v4().to_string();
        state.cycles.push(Cycle {
            id: id.clone(),
            session_id: session_id.to_string(),
            cycle_number,
            status: CycleStatus::InProgress,
            created_at: Utc::now(),
            actual_end: None,
            plan: Some(plan.clone()),
            review: None,
        });
        Ok(id)
    }

    fn save_cycle_review(
        &self,
        cycle_id: &str,
        review: &CycleReview,
    ) -> Result<(), DatabaseError> {
        let mut state = self.write()?;
        let cycle = state
            .cycles
            .iter_mut()
            .find(|c| c.id == cycle_id)
            .ok_or_else(|| not_found("cycle", cycle_id))?;
        cycle.review = Some(review.clone());
        cycle.status = CycleStatus::Completed;
        cycle.actual_end = Some(Utc::now());
        Ok(())
    }

    fn complete_session(
        &self,
        session_id: &str,
        debrief: &DebriefAnswers,
    ) -> Result<(), DatabaseError> {
        let mut state = self.write()?;
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| not_found("session", session_id))?;
        session.status = SessionStatus::Completed;
        session.completed_at = Some(Utc::now());
        session.debrief = Some(debrief.clone());
        Ok(())
    }

    fn abandon_session(&self, session_id: &str) -> Result<(), DatabaseError> {
        let mut state = self.write()?;
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.status == SessionStatus::InProgress)
            .ok_or_else(|| {
                DatabaseError::QueryFailed(format!("no session {session_id} in progress"))
            })?;
        session.status = SessionStatus::Abandoned;
        Ok(())
    }
}
