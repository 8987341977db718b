//! Database schema migrations for cycleflow.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{debug, warn};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);
    debug!(current_version, target = SCHEMA_VERSION, "checking schema");

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: sessions, cycles, plans, reviews and the kv table.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id                 TEXT PRIMARY KEY,
            created_at         TEXT NOT NULL,
            completed_at       TEXT,
            cycle_duration_min INTEGER NOT NULL,
            break_duration_min INTEGER NOT NULL,
            total_cycles       INTEGER NOT NULL,
            status             TEXT NOT NULL DEFAULT 'in_progress',
            preparation        TEXT NOT NULL,
            debrief            TEXT
        );

        CREATE TABLE IF NOT EXISTS cycles (
            id           TEXT PRIMARY KEY,
            session_id   TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            cycle_number INTEGER NOT NULL,
            status       TEXT NOT NULL DEFAULT 'in_progress',
            created_at   TEXT NOT NULL,
            actual_end   TEXT
        );

        CREATE TABLE IF NOT EXISTS cycle_plans (
            cycle_id     TEXT PRIMARY KEY REFERENCES cycles(id) ON DELETE CASCADE,
            goal         TEXT NOT NULL,
            how_to_start TEXT NOT NULL,
            hazards      TEXT,
            energy       TEXT NOT NULL,
            morale       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cycle_reviews (
            cycle_id         TEXT PRIMARY KEY REFERENCES cycles(id) ON DELETE CASCADE,
            completed_target INTEGER NOT NULL,
            noteworthy       TEXT,
            distractions     TEXT,
            improvements     TEXT
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: one cycle per (session, number), plus lookup indexes.
///
/// Duplicate cycles from older databases are collapsed onto the earliest row
/// before the unique index is created.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "DELETE FROM cycles
         WHERE rowid NOT IN (
             SELECT MIN(rowid) FROM cycles GROUP BY session_id, cycle_number
         )",
        [],
    )?;

    tx.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_cycles_session_number
             ON cycles(session_id, cycle_number);
         CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at);
         CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        for table in ["sessions", "cycles", "cycle_plans", "cycle_reviews", "kv"] {
            let count: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    /// v1 databases may hold duplicate cycles from double submits.
    #[test]
    fn test_incremental_migration_dedupes_cycles() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 1);

        conn.execute_batch(
            "INSERT INTO sessions (id, created_at, cycle_duration_min, break_duration_min,
                                   total_cycles, preparation)
             VALUES ('s1', '2024-01-01T09:00:00Z', 25, 5, 3, '{}');
             INSERT INTO cycles (id, session_id, cycle_number, created_at)
             VALUES ('c1', 's1', 1, '2024-01-01T09:00:00Z');
             INSERT INTO cycles (id, session_id, cycle_number, created_at)
             VALUES ('c2', 's1', 1, '2024-01-01T09:00:05Z');",
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 2);

        let ids: Vec<String> = conn
            .prepare("SELECT id FROM cycles")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids, vec!["c1".to_string()]);

        let dup = conn.execute(
            "INSERT INTO cycles (id, session_id, cycle_number, created_at)
             VALUES ('c3', 's1', 1, '2024-01-01T09:01:00Z')",
            [],
        );
        assert!(dup.is_err());
    }
}
