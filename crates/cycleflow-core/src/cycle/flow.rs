//! Binds a [`CycleLifecycle`] to a [`TimerController`].
//!
//! The flow configures the timer for the current timed phase, relays user
//! commands to it, and feeds its completion back into the lifecycle.

use tokio::sync::mpsc;
use tracing::debug;

use super::lifecycle::{CycleLifecycle, CyclePhase, Trigger};
use super::marker::PhaseMarkerStore;
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::session::{CyclePlan, CycleReview, SessionStore};
use crate::timer::TimerController;

/// User intent while a countdown is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Pause,
    Resume,
    Finish,
}

pub struct CycleFlow<S, M> {
    lifecycle: CycleLifecycle<S, M>,
    timer: TimerController,
    work_secs: u64,
    break_secs: u64,
}

impl<S: SessionStore, M: PhaseMarkerStore> CycleFlow<S, M> {
    pub fn new(
        lifecycle: CycleLifecycle<S, M>,
        timer: TimerController,
        work_secs: u64,
        break_secs: u64,
    ) -> Self {
        let mut flow = Self {
            lifecycle,
            timer,
            work_secs,
            break_secs,
        };
        flow.configure_timer();
        flow
    }

    pub fn lifecycle(&self) -> &CycleLifecycle<S, M> {
        &self.lifecycle
    }

    pub fn timer(&self) -> &TimerController {
        &self.timer
    }

    pub fn phase(&self) -> CyclePhase {
        self.lifecycle.phase()
    }

    pub fn submit_plan(&mut self, plan: &CyclePlan) -> Result<Event> {
        let event = self.lifecycle.submit_plan(plan)?;
        self.configure_timer();
        Ok(event)
    }

    pub fn submit_review(&mut self, review: &CycleReview) -> Result<Event> {
        let event = self.lifecycle.submit_review(review)?;
        self.configure_timer();
        Ok(event)
    }

    /// Run the countdown of the current timed phase to completion.
    ///
    /// Every timer event is passed to `on_event`. Returns the lifecycle event
    /// produced by the completion (a phase change or the hand-off). When the
    /// command channel closes the countdown keeps going on its own. If it is
    /// paused at that point nothing can resume it, so the call returns
    /// [`CoreError::Suspended`] and the phase stays where it was.
    pub async fn run_timed_phase<F>(
        &mut self,
        mut commands: mpsc::UnboundedReceiver<TimerCommand>,
        mut on_event: F,
    ) -> Result<Event>
    where
        F: FnMut(&Event),
    {
        let phase = self.lifecycle.phase();
        if !phase.is_timed() {
            return Err(CoreError::InvalidTransition {
                phase,
                trigger: Trigger::TimerFinished,
            });
        }

        if let Some(event) = self.timer.start() {
            on_event(&event);
        }

        let mut commands_open = true;
        loop {
            tokio::select! {
                cmd = commands.recv(), if commands_open => {
                    let Some(cmd) = cmd else {
                        if self.timer.is_paused() {
                            debug!(%phase, "command channel closed while paused");
                            return Err(CoreError::Suspended {
                                phase,
                                remaining_secs: self.timer.remaining_secs(),
                            });
                        }
                        commands_open = false;
                        continue;
                    };
                    debug!(?cmd, %phase, "timer command");
                    let event = match cmd {
                        TimerCommand::Pause => self.timer.pause(),
                        TimerCommand::Resume => self.timer.resume(),
                        TimerCommand::Finish => self.timer.finish(),
                    };
                    if let Some(event) = event {
                        on_event(&event);
                        if event.is_timer_completed() {
                            break;
                        }
                    }
                }
                event = self.timer.next_event() => {
                    let Some(event) = event else { break };
                    on_event(&event);
                    if event.is_timer_completed() {
                        break;
                    }
                }
            }
        }

        let event = self.lifecycle.complete_timer()?;
        self.configure_timer();
        Ok(event)
    }

    fn configure_timer(&mut self) {
        let secs = match self.lifecycle.phase() {
            CyclePhase::Working => self.work_secs,
            CyclePhase::Breaking => self.break_secs,
            _ => return,
        };
        self.timer.set_duration(secs);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::cycle::{read_phase, Handoff, MemoryMarkerStore};
    use crate::session::{Level, MemorySessionStore, PreparationAnswers, SessionPrepare};
    use crate::timer::{MonotonicClock, SilentNotifier, DEFAULT_POLL_INTERVAL};

    fn timer() -> TimerController {
        TimerController::new(
            "Cycle",
            0,
            Arc::new(MonotonicClock::new()),
            DEFAULT_POLL_INTERVAL,
            Arc::new(SilentNotifier),
        )
    }

    fn plan() -> CyclePlan {
        CyclePlan {
            goal: "Refactor loader".into(),
            how_to_start: "Write the failing test".into(),
            hazards: None,
            energy: Level::High,
            morale: Level::Medium,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn last_cycle_runs_through_to_debrief() {
        let store = MemorySessionStore::new();
        let markers = MemoryMarkerStore::new();
        let id = store
            .create_session(&SessionPrepare {
                cycle_duration_min: 1,
                break_duration_min: 1,
                total_cycles: 1,
                answers: PreparationAnswers::default(),
            })
            .unwrap();
        let session = store.get_session(&id).unwrap().unwrap();

        let lifecycle = CycleLifecycle::enter(&store, &markers, &session, 1).unwrap();
        let mut flow = CycleFlow::new(lifecycle, timer(), 60, 30);
        flow.submit_plan(&plan()).unwrap();
        assert_eq!(flow.timer().total_secs(), 60);

        let (tx, rx) = mpsc::unbounded_channel();
        drop(tx);
        let started = Instant::now();
        let mut ticks = 0;
        let event = flow.run_timed_phase(rx, |_| ticks += 1).await.unwrap();
        assert!(matches!(
            event,
            Event::PhaseChanged {
                to: CyclePhase::Reviewing,
                ..
            }
        ));
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert!(ticks > 0);

        flow.submit_review(&CycleReview::default()).unwrap();
        assert_eq!(flow.timer().total_secs(), 30);

        let (_tx, rx) = mpsc::unbounded_channel();
        let event = flow.run_timed_phase(rx, |_| {}).await.unwrap();
        match event {
            Event::CycleHandoff { handoff, .. } => {
                assert_eq!(handoff, Handoff::Debrief { session_id: id })
            }
            other => panic!("expected debrief hand-off, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finish_command_ends_work_early() {
        let store = MemorySessionStore::new();
        let markers = MemoryMarkerStore::new();
        let id = store
            .create_session(&SessionPrepare {
                cycle_duration_min: 25,
                break_duration_min: 5,
                total_cycles: 2,
                answers: PreparationAnswers::default(),
            })
            .unwrap();
        let session = store.get_session(&id).unwrap().unwrap();
        let lifecycle = CycleLifecycle::enter(&store, &markers, &session, 1).unwrap();
        let mut flow = CycleFlow::new(lifecycle, timer(), 1500, 300);
        flow.submit_plan(&plan()).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(TimerCommand::Pause).unwrap();
        tx.send(TimerCommand::Finish).unwrap();
        let started = Instant::now();
        let mut manual = None;
        flow.run_timed_phase(rx, |e| {
            if let Event::TimerCompleted { manual: m, .. } = e {
                manual = Some(*m);
            }
        })
        .await
        .unwrap();

        assert_eq!(manual, Some(true));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(flow.phase(), CyclePhase::Reviewing);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_commands_while_paused_returns_without_advancing() {
        let store = MemorySessionStore::new();
        let markers = MemoryMarkerStore::new();
        let id = store
            .create_session(&SessionPrepare {
                cycle_duration_min: 25,
                break_duration_min: 5,
                total_cycles: 2,
                answers: PreparationAnswers::default(),
            })
            .unwrap();
        let session = store.get_session(&id).unwrap().unwrap();
        let lifecycle = CycleLifecycle::enter(&store, &markers, &session, 1).unwrap();
        let mut flow = CycleFlow::new(lifecycle, timer(), 1500, 300);
        flow.submit_plan(&plan()).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(TimerCommand::Pause).unwrap();
        drop(tx);
        let outcome = tokio::time::timeout(
            Duration::from_secs(24 * 60 * 60),
            flow.run_timed_phase(rx, |_| {}),
        )
        .await
        .expect("run_timed_phase must return once nobody can resume");

        assert!(matches!(
            outcome,
            Err(CoreError::Suspended {
                phase: CyclePhase::Working,
                ..
            })
        ));
        assert_eq!(flow.phase(), CyclePhase::Working);
        assert_eq!(read_phase(&markers, &id, 1), Some(CyclePhase::Working));
        assert!(flow.timer().is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn untimed_phase_is_rejected() {
        let store = MemorySessionStore::new();
        let markers = MemoryMarkerStore::new();
        let id = store
            .create_session(&SessionPrepare {
                cycle_duration_min: 25,
                break_duration_min: 5,
                total_cycles: 1,
                answers: PreparationAnswers::default(),
            })
            .unwrap();
        let session = store.get_session(&id).unwrap().unwrap();
        let lifecycle = CycleLifecycle::enter(&store, &markers, &session, 1).unwrap();
        let mut flow = CycleFlow::new(lifecycle, timer(), 1500, 300);

        let (_tx, rx) = mpsc::unbounded_channel();
        let err = flow.run_timed_phase(rx, |_| {}).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot apply timer-finished while planning");
        assert_eq!(flow.phase(), CyclePhase::Planning);
    }
}
