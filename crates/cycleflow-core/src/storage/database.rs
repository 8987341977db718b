//! SQLite-based session storage.
//!
//! Provides persistent storage for:
//! - Sessions with their preparation and debrief answers
//! - Cycles with their plan and review
//! - Key-value store for phase markers and other local hints

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::data_dir;
use super::migrations;
use crate::cycle::PhaseMarkerStore;
use crate::error::{CoreError, DatabaseError};
use crate::session::{
    Cycle, CyclePlan, CycleReview, CycleStatus, DebriefAnswers, Level, PreparationAnswers,
    Session, SessionPrepare, SessionStatus, SessionStore,
};

const SESSION_COLUMNS: &str = "id, created_at, completed_at, cycle_duration_min,
    break_duration_min, total_cycles, status, preparation, debrief";

const CYCLE_SELECT: &str = "SELECT c.id, c.session_id, c.cycle_number, c.status, c.created_at,
        c.actual_end, p.goal, p.how_to_start, p.hazards, p.energy, p.morale,
        r.completed_target, r.noteworthy, r.distractions, r.improvements
     FROM cycles c
     LEFT JOIN cycle_plans p ON p.cycle_id = c.id
     LEFT JOIN cycle_reviews r ON r.cycle_id = c.id";

/// SQLite database for sessions, cycles and local markers.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/cycleflow/cycleflow.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("cycleflow.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Every cycle across all sessions, oldest first.
    pub fn all_cycles(&self) -> Result<Vec<Cycle>, DatabaseError> {
        let sql = format!("{CYCLE_SELECT} ORDER BY c.created_at ASC, c.cycle_number ASC");
        self.query_cycles(&sql, [])
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn query_cycles<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<Cycle>, DatabaseError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, CycleRow::from_row)?;
        let mut cycles = Vec::new();
        for row in rows {
            cycles.push(row?.into_cycle()?);
        }
        Ok(cycles)
    }

    fn cycle_id_for(
        conn: &Connection,
        session_id: &str,
        cycle_number: u32,
    ) -> Result<Option<String>, rusqlite::Error> {
        conn.query_row(
            "SELECT id FROM cycles WHERE session_id = ?1 AND cycle_number = ?2",
            params![session_id, cycle_number],
            |row| row.get(0),
        )
        .optional()
    }
}

impl SessionStore for Database {
    fn create_session(&self, prepare: &SessionPrepare) -> Result<String, DatabaseError> {
        let id = uuid::Uuid::new_v4().to_string();
        let preparation = to_json("sessions", &prepare.answers)?;
        self.conn.execute(
            "INSERT INTO sessions (id, created_at, cycle_duration_min, break_duration_min,
                                   total_cycles, status, preparation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                Utc::now().to_rfc3339(),
                prepare.cycle_duration_min,
                prepare.break_duration_min,
                prepare.total_cycles,
                SessionStatus::InProgress.as_str(),
                preparation,
            ],
        )?;
        Ok(id)
    }

    fn get_session(&self, session_id: &str) -> Result<Option<Session>, DatabaseError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![session_id],
                SessionRow::from_row,
            )
            .optional()?;
        row.map(SessionRow::into_session).transpose()
    }

    fn list_sessions(&self) -> Result<Vec<Session>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], SessionRow::from_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }
        Ok(sessions)
    }

    fn find_cycle(
        &self,
        session_id: &str,
        cycle_number: u32,
    ) -> Result<Option<Cycle>, DatabaseError> {
        let sql = format!("{CYCLE_SELECT} WHERE c.session_id = ?1 AND c.cycle_number = ?2");
        Ok(self
            .query_cycles(&sql, params![session_id, cycle_number])?
            .into_iter()
            .next())
    }

    fn list_cycles(&self, session_id: &str) -> Result<Vec<Cycle>, DatabaseError> {
        let sql = format!("{CYCLE_SELECT} WHERE c.session_id = ?1 ORDER BY c.cycle_number");
        self.query_cycles(&sql, params![session_id])
    }

    fn save_cycle_plan(
        &self,
        session_id: &str,
        cycle_number: u32,
        plan: &CyclePlan,
    ) -> Result<String, DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;

        let cycle_id = match Self::cycle_id_for(&tx, session_id, cycle_number)? {
            Some(id) => id,
            None => {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)",
                    params![session_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(DatabaseError::QueryFailed(format!(
                        "session {session_id} does not exist"
                    )));
                }
                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO cycles (id, session_id, cycle_number, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id,
                        session_id,
                        cycle_number,
                        CycleStatus::InProgress.as_str(),
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                id
            }
        };

        tx.execute(
            "INSERT INTO cycle_plans (cycle_id, goal, how_to_start, hazards, energy, morale)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(cycle_id) DO UPDATE SET
                 goal = excluded.goal,
                 how_to_start = excluded.how_to_start,
                 hazards = excluded.hazards,
                 energy = excluded.energy,
                 morale = excluded.morale",
            params![
                cycle_id,
                plan.goal,
                plan.how_to_start,
                plan.hazards,
                plan.energy.as_str(),
                plan.morale.as_str(),
            ],
        )?;

        tx.commit()?;
        Ok(cycle_id)
    }

    fn save_cycle_review(
        &self,
        cycle_id: &str,
        review: &CycleReview,
    ) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;

        let updated = tx.execute(
            "UPDATE cycles SET status = ?1, actual_end = ?2 WHERE id = ?3",
            params![
                CycleStatus::Completed.as_str(),
                Utc::now().to_rfc3339(),
                cycle_id
            ],
        )?;
        if updated == 0 {
            return Err(DatabaseError::QueryFailed(format!(
                "cycle {cycle_id} does not exist"
            )));
        }

        tx.execute(
            "INSERT OR REPLACE INTO cycle_reviews
                 (cycle_id, completed_target, noteworthy, distractions, improvements)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                cycle_id,
                review.completed_target,
                review.noteworthy,
                review.distractions,
                review.improvements,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn complete_session(
        &self,
        session_id: &str,
        debrief: &DebriefAnswers,
    ) -> Result<(), DatabaseError> {
        let debrief = to_json("sessions", debrief)?;
        let updated = self.conn.execute(
            "UPDATE sessions SET status = ?1, completed_at = ?2, debrief = ?3 WHERE id = ?4",
            params![
                SessionStatus::Completed.as_str(),
                Utc::now().to_rfc3339(),
                debrief,
                session_id,
            ],
        )?;
        if updated == 0 {
            return Err(DatabaseError::QueryFailed(format!(
                "session {session_id} does not exist"
            )));
        }
        Ok(())
    }

    fn abandon_session(&self, session_id: &str) -> Result<(), DatabaseError> {
        let updated = self.conn.execute(
            "UPDATE sessions SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                SessionStatus::Abandoned.as_str(),
                session_id,
                SessionStatus::InProgress.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(DatabaseError::QueryFailed(format!(
                "no session {session_id} in progress"
            )));
        }
        Ok(())
    }
}

impl PhaseMarkerStore for Database {
    fn load_marker(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self.kv_get(key)?)
    }

    fn save_marker(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        Ok(self.kv_set(key, value)?)
    }
}

// ── Row decoding ─────────────────────────────────────────────────────

struct SessionRow {
    id: String,
    created_at: String,
    completed_at: Option<String>,
    cycle_duration_min: u32,
    break_duration_min: u32,
    total_cycles: u32,
    status: String,
    preparation: String,
    debrief: Option<String>,
}

impl SessionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            completed_at: row.get(2)?,
            cycle_duration_min: row.get(3)?,
            break_duration_min: row.get(4)?,
            total_cycles: row.get(5)?,
            status: row.get(6)?,
            preparation: row.get(7)?,
            debrief: row.get(8)?,
        })
    }

    fn into_session(self) -> Result<Session, DatabaseError> {
        let status = SessionStatus::parse(&self.status)
            .ok_or_else(|| corrupt("sessions", format!("unknown status '{}'", self.status)))?;
        let preparation: PreparationAnswers = from_json("sessions", &self.preparation)?;
        let debrief: Option<DebriefAnswers> = self
            .debrief
            .as_deref()
            .map(|raw| from_json("sessions", raw))
            .transpose()?;
        Ok(Session {
            created_at: parse_ts("sessions", &self.created_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(|ts| parse_ts("sessions", ts))
                .transpose()?,
            id: self.id,
            cycle_duration_min: self.cycle_duration_min,
            break_duration_min: self.break_duration_min,
            total_cycles: self.total_cycles,
            status,
            preparation,
            debrief,
        })
    }
}

struct CycleRow {
    id: String,
    session_id: String,
    cycle_number: u32,
    status: String,
    created_at: String,
    actual_end: Option<String>,
    goal: Option<String>,
    how_to_start: Option<String>,
    hazards: Option<String>,
    energy: Option<String>,
    morale: Option<String>,
    completed_target: Option<bool>,
    noteworthy: Option<String>,
    distractions: Option<String>,
    improvements: Option<String>,
}

impl CycleRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            cycle_number: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            actual_end: row.get(5)?,
            goal: row.get(6)?,
            how_to_start: row.get(7)?,
            hazards: row.get(8)?,
            energy: row.get(9)?,
            morale: row.get(10)?,
            completed_target: row.get(11)?,
            noteworthy: row.get(12)?,
            distractions: row.get(13)?,
            improvements: row.get(14)?,
        })
    }

    fn into_cycle(self) -> Result<Cycle, DatabaseError> {
        let status = CycleStatus::parse(&self.status)
            .ok_or_else(|| corrupt("cycles", format!("unknown status '{}'", self.status)))?;

        let plan = match (self.goal, self.how_to_start, self.energy, self.morale) {
            (Some(goal), Some(how_to_start), Some(energy), Some(morale)) => Some(CyclePlan {
                goal,
                how_to_start,
                hazards: self.hazards,
                energy: parse_level(&energy)?,
                morale: parse_level(&morale)?,
            }),
            _ => None,
        };

        let review = self.completed_target.map(|completed_target| CycleReview {
            completed_target,
            noteworthy: self.noteworthy,
            distractions: self.distractions,
            improvements: self.improvements,
        });

        Ok(Cycle {
            created_at: parse_ts("cycles", &self.created_at)?,
            actual_end: self
                .actual_end
                .as_deref()
                .map(|ts| parse_ts("cycles", ts))
                .transpose()?,
            id: self.id,
            session_id: self.session_id,
            cycle_number: self.cycle_number,
            status,
            plan,
            review,
        })
    }
}

fn corrupt(table: &'static str, message: String) -> DatabaseError {
    DatabaseError::Corrupt { table, message }
}

fn parse_ts(table: &'static str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| corrupt(table, format!("bad timestamp '{raw}': {e}")))
}

fn parse_level(raw: &str) -> Result<Level, DatabaseError> {
    raw.parse()
        .map_err(|e: crate::error::ValidationError| corrupt("cycle_plans", e.to_string()))
}

fn to_json<T: serde::Serialize>(table: &'static str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| corrupt(table, e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(
    table: &'static str,
    raw: &str,
) -> Result<T, DatabaseError> {
    serde_json::from_str(raw).map_err(|e| corrupt(table, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::{read_phase, write_phase, CyclePhase};

    fn prepare() -> SessionPrepare {
        SessionPrepare {
            cycle_duration_min: 25,
            break_duration_min: 5,
            total_cycles: 3,
            answers: PreparationAnswers {
                accomplish: "Finish chapter".into(),
                importance: "Deadline".into(),
                completion: "Draft sent".into(),
                hazards: Some("Email".into()),
                concrete: "Yes".into(),
                noteworthy: None,
            },
        }
    }

    fn plan(goal: &str) -> CyclePlan {
        CyclePlan {
            goal: goal.into(),
            how_to_start: "Open the doc".into(),
            hazards: None,
            energy: Level::High,
            morale: Level::Medium,
        }
    }

    #[test]
    fn session_roundtrip() {
        let db = Database::open_memory().unwrap();
        let id = db.create_session(&prepare()).unwrap();
        let session = db.get_session(&id).unwrap().unwrap();
        assert_eq!(session.total_cycles, 3);
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.preparation.hazards.as_deref(), Some("Email"));
        assert!(db.get_session("missing").unwrap().is_none());
    }

    #[test]
    fn plan_save_is_idempotent() {
        let db = Database::open_memory().unwrap();
        let sid = db.create_session(&prepare()).unwrap();

        let first = db.save_cycle_plan(&sid, 1, &plan("First goal")).unwrap();
        let second = db.save_cycle_plan(&sid, 1, &plan("Revised goal")).unwrap();
        assert_eq!(first, second);

        let cycles = db.list_cycles(&sid).unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].plan.as_ref().unwrap().goal, "Revised goal");
        assert_eq!(cycles[0].status, CycleStatus::InProgress);
    }

    #[test]
    fn plan_for_unknown_session_fails() {
        let db = Database::open_memory().unwrap();
        assert!(db.save_cycle_plan("nope", 1, &plan("x")).is_err());
    }

    #[test]
    fn review_completes_cycle() {
        let db = Database::open_memory().unwrap();
        let sid = db.create_session(&prepare()).unwrap();
        let cid = db.save_cycle_plan(&sid, 2, &plan("Goal")).unwrap();

        db.save_cycle_review(
            &cid,
            &CycleReview {
                completed_target: true,
                distractions: Some("slack pings".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let cycle = db.find_cycle(&sid, 2).unwrap().unwrap();
        assert_eq!(cycle.status, CycleStatus::Completed);
        assert!(cycle.actual_end.is_some());
        let review = cycle.review.unwrap();
        assert!(review.completed_target);
        assert_eq!(review.distractions.as_deref(), Some("slack pings"));
        assert!(db.save_cycle_review("missing", &CycleReview::default()).is_err());
    }

    #[test]
    fn debrief_and_abandon() {
        let db = Database::open_memory().unwrap();
        let done = db.create_session(&prepare()).unwrap();
        let dropped = db.create_session(&prepare()).unwrap();

        db.complete_session(
            &done,
            &DebriefAnswers {
                done: "a".into(),
                compare: "b".into(),
                bogged: "c".into(),
                went_well: "d".into(),
                takeaways: Some("e".into()),
            },
        )
        .unwrap();
        db.abandon_session(&dropped).unwrap();
        assert!(db.abandon_session(&dropped).is_err());

        let done = db.get_session(&done).unwrap().unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(done.debrief.unwrap().takeaways.as_deref(), Some("e"));
        assert_eq!(
            db.get_session(&dropped).unwrap().unwrap().status,
            SessionStatus::Abandoned
        );
        assert_eq!(db.list_sessions().unwrap().len(), 2);
    }

    #[test]
    fn markers_live_in_kv() {
        let db = Database::open_memory().unwrap();
        write_phase(&db, "s", 1, CyclePhase::Breaking).unwrap();
        assert_eq!(read_phase(&db, "s", 1), Some(CyclePhase::Breaking));
        assert_eq!(
            db.kv_get("cycle-s-1").unwrap().as_deref(),
            Some(r#"{"phase":"breaking"}"#)
        );
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
    }
}
