use clap::Subcommand;
use cycleflow_core::session;
use cycleflow_core::{Config, Database, DebriefAnswers, PreparationAnswers, SessionPrepare, SessionStore};

use super::{load_session, print_json};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Prepare a new session
    New {
        /// Number of work cycles (defaults to config)
        #[arg(long)]
        cycles: Option<u32>,
        /// Work minutes per cycle (defaults to config)
        #[arg(long)]
        work: Option<u32>,
        /// Break minutes after each cycle (defaults to config)
        #[arg(long = "break")]
        break_min: Option<u32>,
        /// What am I trying to accomplish?
        #[arg(long)]
        accomplish: String,
        /// Why is this important and valuable?
        #[arg(long)]
        importance: String,
        /// How will I know this is complete?
        #[arg(long)]
        completion: String,
        /// Is this concrete and measurable?
        #[arg(long)]
        concrete: String,
        /// Any risks or hazards?
        #[arg(long)]
        hazards: Option<String>,
        /// Anything else noteworthy?
        #[arg(long)]
        noteworthy: Option<String>,
    },
    /// Start a new session with the settings of the last one
    Repeat,
    /// Show a session with its cycles
    Show {
        session_id: String,
    },
    /// List sessions, newest first
    List,
    /// Abandon a session in progress
    Abandon {
        session_id: String,
    },
    /// Record the debrief and complete the session
    Debrief {
        session_id: String,
        /// What did I get done?
        #[arg(long)]
        done: String,
        /// How did this compare to my normal work output?
        #[arg(long)]
        compare: String,
        /// Did I get bogged down? Where?
        #[arg(long)]
        bogged: String,
        /// What went well? How can I replicate this?
        #[arg(long)]
        went_well: String,
        /// Any other takeaways?
        #[arg(long)]
        takeaways: Option<String>,
    },
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        SessionAction::New {
            cycles,
            work,
            break_min,
            accomplish,
            importance,
            completion,
            concrete,
            hazards,
            noteworthy,
        } => {
            let defaults = Config::load_or_default().session;
            let prepare = SessionPrepare {
                cycle_duration_min: work.unwrap_or(defaults.cycle_duration_min),
                break_duration_min: break_min.unwrap_or(defaults.break_duration_min),
                total_cycles: cycles.unwrap_or(defaults.total_cycles),
                answers: PreparationAnswers {
                    accomplish,
                    importance,
                    completion,
                    hazards,
                    concrete,
                    noteworthy,
                },
            };
            let id = session::prepare(&db, &prepare)?;
            print_json(&load_session(&db, &id)?)?;
        }
        SessionAction::Repeat => {
            let id = session::repeat_last(&db)?;
            print_json(&load_session(&db, &id)?)?;
        }
        SessionAction::Show { session_id } => {
            let session = load_session(&db, &session_id)?;
            let cycles = db.list_cycles(&session_id)?;
            print_json(&serde_json::json!({ "session": session, "cycles": cycles }))?;
        }
        SessionAction::List => {
            print_json(&db.list_sessions()?)?;
        }
        SessionAction::Abandon { session_id } => {
            load_session(&db, &session_id)?;
            db.abandon_session(&session_id)?;
            println!("session abandoned: {session_id}");
        }
        SessionAction::Debrief {
            session_id,
            done,
            compare,
            bogged,
            went_well,
            takeaways,
        } => {
            load_session(&db, &session_id)?;
            let answers = DebriefAnswers {
                done,
                compare,
                bogged,
                went_well,
                takeaways,
            };
            session::debrief(&db, &session_id, &answers)?;
            print_json(&load_session(&db, &session_id)?)?;
        }
    }
    Ok(())
}
