//! Timer controller.
//!
//! Owns one [`CountdownEngine`] and the observable `remaining_secs` /
//! `running` pair. Commands return immediately; state only moves forward when
//! [`TimerController::next_event`] receives a message from the engine.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused
//!            |          |
//!            +----------+--> Completed -> (start) Running
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::countdown::{Clock, CountdownEngine, CountdownEvent, RunId};
use super::notify::Notifier;
use crate::events::Event;

pub struct TimerController {
    label: String,
    engine: CountdownEngine,
    events: mpsc::UnboundedReceiver<CountdownEvent>,
    notifier: Arc<dyn Notifier>,
    total_secs: u64,
    remaining_secs: u64,
    running: bool,
    started: bool,
    completed: bool,
    /// Run whose messages are currently accepted.
    active_run: Option<RunId>,
    permission_requested: bool,
}

impl TimerController {
    pub fn new(
        label: impl Into<String>,
        duration_secs: u64,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (engine, events) = CountdownEngine::new(clock, poll_interval);
        Self {
            label: label.into(),
            engine,
            events,
            notifier,
            total_secs: duration_secs,
            remaining_secs: duration_secs,
            running: false,
            started: false,
            completed: false,
            active_run: None,
            permission_requested: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn total_secs(&self) -> u64 {
        self.total_secs
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Started at least once and currently paused.
    pub fn is_paused(&self) -> bool {
        self.started && !self.running && !self.completed
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start from the full duration. A paused timer resumes instead.
    pub fn start(&mut self) -> Option<Event> {
        if self.running {
            return None;
        }
        if self.is_paused() {
            return self.resume();
        }

        self.request_permission_once();
        self.remaining_secs = self.total_secs;
        self.active_run = Some(self.engine.start(self.total_secs, None));
        self.running = true;
        self.started = true;
        self.completed = false;
        Some(Event::TimerStarted {
            label: self.label.clone(),
            duration_secs: self.total_secs,
            at: Utc::now(),
        })
    }

    /// Stop counting, keeping the last observed remaining time.
    pub fn pause(&mut self) -> Option<Event> {
        if !self.running {
            return None;
        }
        self.engine.stop();
        self.active_run = None;
        self.running = false;
        Some(Event::TimerPaused {
            remaining_secs: self.remaining_secs,
            at: Utc::now(),
        })
    }

    /// Continue from the last observed remaining time with a fresh end time.
    pub fn resume(&mut self) -> Option<Event> {
        if !self.is_paused() {
            return None;
        }
        self.active_run = Some(self.engine.start(self.total_secs, Some(self.remaining_secs)));
        self.running = true;
        Some(Event::TimerResumed {
            remaining_secs: self.remaining_secs,
            at: Utc::now(),
        })
    }

    /// End the countdown early through the normal completion path.
    pub fn finish(&mut self) -> Option<Event> {
        if self.completed {
            return None;
        }
        self.engine.stop();
        self.active_run = None;
        self.started = true;
        Some(self.complete(true))
    }

    /// Replace the configured duration. Ignored while running.
    pub fn set_duration(&mut self, duration_secs: u64) -> bool {
        if self.running {
            debug!(label = %self.label, "ignoring duration change while running");
            return false;
        }
        self.engine.stop();
        self.active_run = None;
        self.total_secs = duration_secs;
        self.remaining_secs = duration_secs;
        self.started = false;
        self.completed = false;
        true
    }

    /// Wait for the next accepted engine message.
    ///
    /// Messages from cancelled runs are dropped here. While nothing is
    /// running this stays pending, so use it inside `select!` alongside the
    /// command source. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            let msg = self.events.recv().await?;
            if !self.running || Some(msg.run()) != self.active_run {
                debug!(?msg, "discarding message from inactive run");
                continue;
            }
            match msg {
                CountdownEvent::Progress { remaining_secs, .. } => {
                    self.remaining_secs = remaining_secs.min(self.total_secs);
                    return Some(Event::TimerProgress {
                        remaining_secs: self.remaining_secs,
                        total_secs: self.total_secs,
                    });
                }
                CountdownEvent::Completed { .. } => {
                    self.active_run = None;
                    self.remaining_secs = 0;
                    return Some(self.complete(false));
                }
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn complete(&mut self, manual: bool) -> Event {
        self.running = false;
        self.completed = true;

        if let Err(e) = self.notifier.play_tone() {
            debug!(error = %e, "completion tone skipped");
        }
        let title = format!("{} complete", self.label);
        if let Err(e) = self.notifier.notify(&title, "Time for the next step.") {
            debug!(error = %e, "completion notification skipped");
        }

        Event::TimerCompleted {
            label: self.label.clone(),
            manual,
            at: Utc::now(),
        }
    }

    fn request_permission_once(&mut self) {
        if self.permission_requested {
            return;
        }
        self.permission_requested = true;
        match self.notifier.request_permission() {
            Ok(permission) => debug!(?permission, "notification permission"),
            Err(e) => warn!(error = %e, "notification permission request failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::countdown::{MonotonicClock, DEFAULT_POLL_INTERVAL};
    use crate::timer::notify::{NotifyError, Permission};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[derive(Default)]
    struct CountingNotifier {
        permission_requests: AtomicUsize,
        notifications: AtomicUsize,
        tones: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn request_permission(&self) -> Result<Permission, NotifyError> {
            self.permission_requests.fetch_add(1, Ordering::SeqCst);
            Ok(Permission::Granted)
        }

        fn notify(&self, _title: &str, _body: &str) -> Result<(), NotifyError> {
            self.notifications.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::Denied)
        }

        fn play_tone(&self) -> Result<(), NotifyError> {
            self.tones.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::Unavailable)
        }
    }

    fn controller(secs: u64, notifier: Arc<CountingNotifier>) -> TimerController {
        TimerController::new(
            "Work Cycle",
            secs,
            Arc::new(MonotonicClock::new()),
            DEFAULT_POLL_INTERVAL,
            notifier,
        )
    }

    async fn run_until(timer: &mut TimerController, remaining: u64) {
        while let Some(event) = timer.next_event().await {
            if timer.remaining_secs() <= remaining || event.is_timer_completed() {
                return;
            }
        }
    }

    async fn run_to_completion(timer: &mut TimerController) -> Event {
        loop {
            let event = timer.next_event().await.expect("engine channel open");
            let remaining = timer.remaining_secs();
            assert!(remaining <= timer.total_secs());
            if event.is_timer_completed() {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn natural_completion_runs_side_effects_once() {
        let notifier = Arc::new(CountingNotifier::default());
        let mut timer = controller(2, notifier.clone());
        assert!(timer.start().is_some());

        let event = run_to_completion(&mut timer).await;
        assert!(matches!(event, Event::TimerCompleted { manual: false, .. }));
        assert_eq!(timer.remaining_secs(), 0);
        assert!(!timer.is_running());
        assert!(timer.is_completed());
        assert_eq!(notifier.tones.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.notifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permission_requested_only_once() {
        let notifier = Arc::new(CountingNotifier::default());
        let mut timer = controller(1, notifier.clone());
        timer.start();
        run_to_completion(&mut timer).await;
        timer.start();
        run_to_completion(&mut timer).await;
        assert_eq!(notifier.permission_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_completes_after_remaining() {
        let notifier = Arc::new(CountingNotifier::default());
        let mut timer = controller(10, notifier);
        timer.start();
        run_until(&mut timer, 6).await;
        assert_eq!(timer.remaining_secs(), 6);

        assert!(matches!(
            timer.pause(),
            Some(Event::TimerPaused { remaining_secs: 6, .. })
        ));
        assert!(timer.is_paused());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(timer.remaining_secs(), 6);

        let resumed_at = Instant::now();
        assert!(timer.resume().is_some());
        run_to_completion(&mut timer).await;
        assert_eq!(resumed_at.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn long_cycle_paused_midway_takes_duration_plus_pause() {
        let notifier = Arc::new(CountingNotifier::default());
        let mut timer = controller(1500, notifier);
        let started = Instant::now();
        timer.start();
        run_until(&mut timer, 900).await;

        timer.pause();
        tokio::time::sleep(Duration::from_secs(120)).await;
        timer.resume();
        run_to_completion(&mut timer).await;

        assert_eq!(started.elapsed(), Duration::from_secs(1500 + 120));
    }

    #[tokio::test(start_paused = true)]
    async fn finish_completes_early() {
        let notifier = Arc::new(CountingNotifier::default());
        let mut timer = controller(600, notifier.clone());
        timer.start();
        run_until(&mut timer, 599).await;

        let event = timer.finish();
        assert!(matches!(event, Some(Event::TimerCompleted { manual: true, .. })));
        assert!(timer.is_completed());
        assert!(!timer.is_running());
        assert_eq!(notifier.tones.load(Ordering::SeqCst), 1);
        assert!(timer.finish().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stray_messages_after_pause_are_discarded() {
        let notifier = Arc::new(CountingNotifier::default());
        let mut timer = controller(5, notifier);
        timer.start();
        timer.next_event().await;
        timer.pause();
        let frozen = timer.remaining_secs();

        let waited = tokio::time::timeout(Duration::from_secs(10), timer.next_event()).await;
        assert!(waited.is_err());
        assert_eq!(timer.remaining_secs(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_change_only_applies_when_idle() {
        let notifier = Arc::new(CountingNotifier::default());
        let mut timer = controller(60, notifier);
        assert!(timer.set_duration(120));
        assert_eq!(timer.remaining_secs(), 120);

        timer.start();
        assert!(!timer.set_duration(30));
        assert_eq!(timer.total_secs(), 120);

        timer.pause();
        assert!(timer.set_duration(30));
        assert_eq!(timer.remaining_secs(), 30);
        assert!(!timer.is_paused());
    }
}
