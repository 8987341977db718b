pub mod config;
pub mod cycle;
pub mod session;
pub mod stats;

use cycleflow_core::{CoreError, Database, Session, SessionStore};

/// Load a session or fail with a not-found error.
pub(crate) fn load_session(db: &Database, session_id: &str) -> Result<Session, CoreError> {
    db.get_session(session_id)?.ok_or_else(|| CoreError::NotFound {
        kind: "session",
        id: session_id.to_string(),
    })
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
