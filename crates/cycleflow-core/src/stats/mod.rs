//! Dashboard statistics.
//!
//! Pure functions over session and cycle records:
//! - **Overview**: completed sessions and cycles, completion and hit rates
//! - **Streak**: consecutive local days with a completed session
//! - **Energy trend**: energy and morale of the most recent planned cycles
//! - **Keywords**: recurring words in review reflections

mod keywords;

pub use keywords::{top_keywords, KeywordCount};

use std::collections::BTreeSet;

use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{Cycle, CycleStatus, Session, SessionStatus};

/// Number of planned cycles shown in the energy trend.
pub const ENERGY_TREND_LEN: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub total_sessions: usize,
    pub completed_sessions: usize,
    pub completed_cycles: usize,
    /// Completed sessions as a rounded percentage of all sessions.
    pub completion_rate: u32,
    /// Reviews that hit their target, as a rounded percentage of all reviews.
    pub target_hit_rate: u32,
}

pub fn overview(sessions: &[Session], cycles: &[Cycle]) -> Overview {
    let completed_sessions = sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Completed)
        .count();
    let completed_cycles = cycles
        .iter()
        .filter(|c| c.status == CycleStatus::Completed)
        .count();

    let reviews: Vec<bool> = cycles
        .iter()
        .filter_map(|c| c.review.as_ref().map(|r| r.completed_target))
        .collect();
    let hits = reviews.iter().filter(|hit| **hit).count();

    Overview {
        total_sessions: sessions.len(),
        completed_sessions,
        completed_cycles,
        completion_rate: percent(completed_sessions, sessions.len()),
        target_hit_rate: percent(hits, reviews.len()),
    }
}

fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round() as u32
}

/// Streak of completed sessions ending today or yesterday, in local days.
pub fn streak(sessions: &[Session], today: NaiveDate) -> u32 {
    streak_from_days(
        sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .map(|s| local_day(s.created_at)),
        today,
    )
}

/// Count consecutive days back from the most recent of `days`.
///
/// Returns 0 when the most recent day is before yesterday. Several entries on
/// the same day count once.
pub fn streak_from_days(days: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = days.into_iter().collect();
    let Some(&latest) = days.last() else {
        return 0;
    };

    let yesterday = today.pred_opt().unwrap_or(today);
    if latest != today && latest != yesterday {
        return 0;
    }

    let mut streak = 0;
    let mut day = latest;
    while days.contains(&day) {
        streak += 1;
        match day.checked_sub_days(Days::new(1)) {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

fn local_day(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&Local).date_naive()
}

/// One point of the energy chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyPoint {
    pub date: NaiveDate,
    pub session_id: String,
    pub cycle_number: u32,
    /// 1 (low) to 3 (high).
    pub energy: u8,
    pub morale: u8,
}

/// Energy and morale of the last [`ENERGY_TREND_LEN`] planned cycles, oldest
/// first.
pub fn energy_trend(cycles: &[Cycle]) -> Vec<EnergyPoint> {
    let mut planned: Vec<&Cycle> = cycles.iter().filter(|c| c.plan.is_some()).collect();
    planned.sort_by_key(|c| (c.created_at, c.cycle_number));

    let skip = planned.len().saturating_sub(ENERGY_TREND_LEN);
    planned
        .into_iter()
        .skip(skip)
        .filter_map(|c| {
            let plan = c.plan.as_ref()?;
            Some(EnergyPoint {
                date: local_day(c.created_at),
                session_id: c.session_id.clone(),
                cycle_number: c.cycle_number,
                energy: plan.energy.score(),
                morale: plan.morale.score(),
            })
        })
        .collect()
}

/// Free-text reflections from cycle reviews (distractions and improvements).
pub fn review_reflections(cycles: &[Cycle]) -> Vec<&str> {
    cycles
        .iter()
        .filter_map(|c| c.review.as_ref())
        .flat_map(|r| [r.distractions.as_deref(), r.improvements.as_deref()])
        .flatten()
        .collect()
}
