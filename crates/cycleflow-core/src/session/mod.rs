//! Session, cycle, plan and review records.
//!
//! A session is prepared once (durations, cycle count, intentions), then each
//! cycle gets a plan and a review, and the session ends with a debrief.
//! Submissions are validated here before anything touches a store.

mod store;

pub use store::{MemorySessionStore, SessionStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    InProgress,
    Completed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::InProgress => "in_progress",
            CycleStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(CycleStatus::InProgress),
            "completed" => Some(CycleStatus::Completed),
            _ => None,
        }
    }
}

/// Self-reported energy or morale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Medium,
    Low,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::High => "high",
            Level::Medium => "medium",
            Level::Low => "low",
        }
    }

    /// 3 for high down to 1 for low.
    pub fn score(&self) -> u8 {
        match self {
            Level::High => 3,
            Level::Medium => 2,
            Level::Low => 1,
        }
    }
}

impl std::str::FromStr for Level {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Level::High),
            "medium" => Ok(Level::Medium),
            "low" => Ok(Level::Low),
            other => Err(ValidationError::InvalidValue {
                field: "level",
                message: format!("expected high, medium or low, got '{other}'"),
            }),
        }
    }
}

/// Answers given while preparing a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationAnswers {
    pub accomplish: String,
    pub importance: String,
    pub completion: String,
    #[serde(default)]
    pub hazards: Option<String>,
    pub concrete: String,
    #[serde(default)]
    pub noteworthy: Option<String>,
}

/// Everything needed to create a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPrepare {
    pub cycle_duration_min: u32,
    pub break_duration_min: u32,
    pub total_cycles: u32,
    pub answers: PreparationAnswers,
}

impl SessionPrepare {
    pub fn validate(&self) -> Result<(), ValidationError> {
        at_least_one("cycle_duration_min", self.cycle_duration_min)?;
        at_least_one("break_duration_min", self.break_duration_min)?;
        at_least_one("total_cycles", self.total_cycles)?;
        required("accomplish", &self.answers.accomplish)?;
        required("importance", &self.answers.importance)?;
        required("completion", &self.answers.completion)?;
        required("concrete", &self.answers.concrete)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclePlan {
    pub goal: String,
    pub how_to_start: String,
    #[serde(default)]
    pub hazards: Option<String>,
    pub energy: Level,
    pub morale: Level,
}

impl CyclePlan {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("goal", &self.goal)?;
        required("how_to_start", &self.how_to_start)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReview {
    pub completed_target: bool,
    #[serde(default)]
    pub noteworthy: Option<String>,
    #[serde(default)]
    pub distractions: Option<String>,
    #[serde(default)]
    pub improvements: Option<String>,
}

impl CycleReview {
    /// Every field is optional or a flag.
    pub fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebriefAnswers {
    pub done: String,
    pub compare: String,
    pub bogged: String,
    pub went_well: String,
    #[serde(default)]
    pub takeaways: Option<String>,
}

impl DebriefAnswers {
    pub fn validate(&self) -> Result<(), ValidationError> {
        required("done", &self.done)?;
        required("compare", &self.compare)?;
        required("bogged", &self.bogged)?;
        required("went_well", &self.went_well)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cycle_duration_min: u32,
    pub break_duration_min: u32,
    pub total_cycles: u32,
    pub status: SessionStatus,
    pub preparation: PreparationAnswers,
    pub debrief: Option<DebriefAnswers>,
}

impl Session {
    pub fn cycle_duration_secs(&self) -> u64 {
        u64::from(self.cycle_duration_min).saturating_mul(60)
    }

    pub fn break_duration_secs(&self) -> u64 {
        u64::from(self.break_duration_min).saturating_mul(60)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub id: String,
    pub session_id: String,
    pub cycle_number: u32,
    pub status: CycleStatus,
    pub created_at: DateTime<Utc>,
    pub actual_end: Option<DateTime<Utc>>,
    pub plan: Option<CyclePlan>,
    pub review: Option<CycleReview>,
}

/// Validate and create a session.
pub fn prepare<S: SessionStore + ?Sized>(store: &S, prepare: &SessionPrepare) -> Result<String> {
    prepare.validate()?;
    let id = store.create_session(prepare)?;
    tracing::info!(session_id = %id, cycles = prepare.total_cycles, "session prepared");
    Ok(id)
}

/// Start a new session with the settings and answers of the newest one.
pub fn repeat_last<S: SessionStore + ?Sized>(store: &S) -> Result<String> {
    let last = store
        .list_sessions()?
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::NotFound {
            kind: "session",
            id: "to repeat".into(),
        })?;
    let id = prepare(
        store,
        &SessionPrepare {
            cycle_duration_min: last.cycle_duration_min,
            break_duration_min: last.break_duration_min,
            total_cycles: last.total_cycles,
            answers: last.preparation,
        },
    )?;
    tracing::info!(session_id = %id, from = %last.id, "session repeated");
    Ok(id)
}

/// Validate the debrief and close the session.
pub fn debrief<S: SessionStore + ?Sized>(
    store: &S,
    session_id: &str,
    answers: &DebriefAnswers,
) -> Result<()> {
    answers.validate()?;
    store.complete_session(session_id, answers)?;
    tracing::info!(session_id, "session debriefed");
    Ok(())
}

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }
    Ok(())
}

fn at_least_one(field: &'static str, value: u32) -> Result<(), ValidationError> {
    if value < 1 {
        return Err(ValidationError::InvalidValue {
            field,
            message: "must be at least 1".into(),
        });
    }
    Ok(())
}
