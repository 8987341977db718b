use std::io::{BufRead, Write};
use std::sync::Arc;

use clap::{ArgGroup, Subcommand};
use cycleflow_core::cycle::resume_point;
use cycleflow_core::timer::{SystemClock, TerminalNotifier};
use cycleflow_core::{
    Config, CoreError, CycleFlow, CycleLifecycle, CyclePhase, CyclePlan, CycleReview, Database,
    Event, Level, TimerCommand, TimerController, Trigger,
};
use tokio::sync::mpsc;

use super::{load_session, print_json};

#[derive(Subcommand)]
pub enum CycleAction {
    /// Print the phase a cycle would resume at
    Status { session_id: String, cycle: u32 },
    /// Save the plan for a cycle and move to work
    Plan {
        session_id: String,
        cycle: u32,
        /// What am I trying to accomplish this cycle?
        #[arg(long)]
        goal: String,
        /// How will I get started?
        #[arg(long)]
        how_to_start: String,
        /// Any hazards present?
        #[arg(long)]
        hazards: Option<String>,
        /// Energy level: high, medium or low
        #[arg(long, default_value = "medium")]
        energy: Level,
        /// Morale level: high, medium or low
        #[arg(long, default_value = "medium")]
        morale: Level,
    },
    /// Run the work countdown (stdin: p pause, r resume, f finish)
    Work { session_id: String, cycle: u32 },
    /// Save the review for a cycle and move to the break
    #[command(group(ArgGroup::new("outcome").required(true).args(["hit", "miss"])))]
    Review {
        session_id: String,
        cycle: u32,
        /// The cycle's target was completed
        #[arg(long)]
        hit: bool,
        /// The cycle's target was not completed
        #[arg(long)]
        miss: bool,
        /// Anything noteworthy?
        #[arg(long)]
        noteworthy: Option<String>,
        /// Any distractions?
        #[arg(long)]
        distractions: Option<String>,
        /// Things to improve for the next cycle?
        #[arg(long)]
        improvements: Option<String>,
    },
    /// Run the break countdown (stdin: p pause, r resume, f finish)
    Break { session_id: String, cycle: u32 },
}

pub fn run(action: CycleAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        CycleAction::Status { session_id, cycle } => {
            let session = load_session(&db, &session_id)?;
            let (record, phase) = resume_point(&db, &db, &session, cycle)?;
            print_json(&serde_json::json!({
                "session_id": session.id,
                "cycle_number": cycle,
                "cycle_id": record.map(|c| c.id),
                "phase": phase,
                "total_cycles": session.total_cycles,
            }))?;
        }
        CycleAction::Plan {
            session_id,
            cycle,
            goal,
            how_to_start,
            hazards,
            energy,
            morale,
        } => {
            let session = load_session(&db, &session_id)?;
            let mut lifecycle = CycleLifecycle::enter(&db, &db, &session, cycle)?;
            let event = lifecycle.submit_plan(&CyclePlan {
                goal,
                how_to_start,
                hazards,
                energy,
                morale,
            })?;
            print_json(&event)?;
        }
        CycleAction::Review {
            session_id,
            cycle,
            hit,
            miss: _,
            noteworthy,
            distractions,
            improvements,
        } => {
            let session = load_session(&db, &session_id)?;
            let mut lifecycle = CycleLifecycle::enter(&db, &db, &session, cycle)?;
            let event = lifecycle.submit_review(&CycleReview {
                completed_target: hit,
                noteworthy,
                distractions,
                improvements,
            })?;
            print_json(&event)?;
        }
        CycleAction::Work { session_id, cycle } => {
            run_countdown(&db, &session_id, cycle, CyclePhase::Working)?;
        }
        CycleAction::Break { session_id, cycle } => {
            run_countdown(&db, &session_id, cycle, CyclePhase::Breaking)?;
        }
    }
    Ok(())
}

/// Run the countdown for `expected` in the foreground and print the outcome.
fn run_countdown(
    db: &Database,
    session_id: &str,
    cycle: u32,
    expected: CyclePhase,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = load_session(db, session_id)?;
    let lifecycle = CycleLifecycle::enter(db, db, &session, cycle)?;
    if lifecycle.phase() != expected {
        let trigger = match expected {
            CyclePhase::Breaking => Trigger::BreakFinished,
            _ => Trigger::WorkFinished,
        };
        return Err(CoreError::InvalidTransition {
            phase: lifecycle.phase(),
            trigger,
        }
        .into());
    }

    let config = Config::load_or_default();
    let label = match expected {
        CyclePhase::Breaking => format!("Break after cycle {cycle}"),
        _ => format!("Cycle {cycle} of {}", session.total_cycles),
    };
    let notifier = TerminalNotifier {
        enabled: config.notifications.enabled,
        sound: config.notifications.sound,
    };
    let timer = TimerController::new(
        label,
        0,
        Arc::new(SystemClock),
        config.timer.poll_interval(),
        Arc::new(notifier),
    );
    let mut flow = CycleFlow::new(
        lifecycle,
        timer,
        session.cycle_duration_secs(),
        session.break_duration_secs(),
    );

    let commands = spawn_stdin_commands();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let outcome = runtime.block_on(flow.run_timed_phase(commands, print_timer_event))?;

    eprintln!();
    print_json(&outcome)?;
    Ok(())
}

/// Read stdin on a plain thread and forward each line as a timer command.
fn spawn_stdin_commands() -> mpsc::UnboundedReceiver<TimerCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let cmd = match line.trim() {
                "p" | "pause" => TimerCommand::Pause,
                "r" | "resume" => TimerCommand::Resume,
                "f" | "finish" => TimerCommand::Finish,
                "" => continue,
                other => {
                    eprintln!("unknown command '{other}' (p pause, r resume, f finish)");
                    continue;
                }
            };
            if tx.send(cmd).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_timer_event(event: &Event) {
    match event {
        Event::TimerProgress { remaining_secs, .. } => {
            let mut err = std::io::stderr().lock();
            let _ = write!(
                err,
                "\r{:02}:{:02} remaining ",
                remaining_secs / 60,
                remaining_secs % 60
            );
            let _ = err.flush();
        }
        other => {
            if let Ok(json) = serde_json::to_string(other) {
                eprintln!("\n{json}");
            }
        }
    }
}
