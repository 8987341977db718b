//! Persisted phase markers.
//!
//! A marker remembers the last phase shown for `(session, cycle)` so a
//! restart lands back on the same step. Markers are hints: anything missing
//! or unreadable yields `None` and the caller falls back to a default.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CyclePhase;
use crate::error::DatabaseError;

/// Local key/value storage for markers.
pub trait PhaseMarkerStore {
    fn load_marker(&self, key: &str) -> Result<Option<String>, DatabaseError>;
    fn save_marker(&self, key: &str, value: &str) -> Result<(), DatabaseError>;
}

impl<T: PhaseMarkerStore + ?Sized> PhaseMarkerStore for &T {
    fn load_marker(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        (**self).load_marker(key)
    }

    fn save_marker(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        (**self).save_marker(key, value)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PhaseMarker {
    phase: String,
}

pub fn marker_key(session_id: &str, cycle_number: u32) -> String {
    format!("cycle-{session_id}-{cycle_number}")
}

/// Read the marker for `(session_id, cycle_number)`.
pub fn read_phase<M: PhaseMarkerStore + ?Sized>(
    markers: &M,
    session_id: &str,
    cycle_number: u32,
) -> Option<CyclePhase> {
    let key = marker_key(session_id, cycle_number);
    let raw = match markers.load_marker(&key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(%key, error = %e, "phase marker unreadable");
            return None;
        }
    };
    let parsed = serde_json::from_str::<PhaseMarker>(&raw)
        .ok()
        .and_then(|m| CyclePhase::parse(&m.phase));
    if parsed.is_none() {
        debug!(%key, %raw, "ignoring malformed phase marker");
    }
    parsed
}

/// Record `phase` for `(session_id, cycle_number)`.
pub fn write_phase<M: PhaseMarkerStore + ?Sized>(
    markers: &M,
    session_id: &str,
    cycle_number: u32,
    phase: CyclePhase,
) -> Result<(), DatabaseError> {
    let value = serde_json::to_string(&PhaseMarker {
        phase: phase.as_str().to_string(),
    })
    .map_err(|e| DatabaseError::Corrupt {
        table: "kv",
        message: e.to_string(),
    })?;
    markers.save_marker(&marker_key(session_id, cycle_number), &value)
}

/// Markers held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PhaseMarkerStore for MemoryMarkerStore {
    fn load_marker(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn save_marker(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
