use chrono::Local;
use clap::Subcommand;
use cycleflow_core::stats;
use cycleflow_core::{Database, SessionStore};

use super::print_json;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Completed sessions and cycles, completion and hit rates
    Overview,
    /// Consecutive days with a completed session
    Streak,
    /// Energy and morale of recent planned cycles
    Energy,
    /// Most frequent words in review reflections
    Keywords {
        /// Number of words to show
        #[arg(long, default_value = "5")]
        limit: usize,
    },
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        StatsAction::Overview => {
            let sessions = db.list_sessions()?;
            let cycles = db.all_cycles()?;
            print_json(&stats::overview(&sessions, &cycles))?;
        }
        StatsAction::Streak => {
            let sessions = db.list_sessions()?;
            let streak = stats::streak(&sessions, Local::now().date_naive());
            print_json(&serde_json::json!({ "streak": streak }))?;
        }
        StatsAction::Energy => {
            print_json(&stats::energy_trend(&db.all_cycles()?))?;
        }
        StatsAction::Keywords { limit } => {
            let cycles = db.all_cycles()?;
            let keywords = stats::top_keywords(stats::review_reflections(&cycles), limit);
            print_json(&keywords)?;
        }
    }
    Ok(())
}
