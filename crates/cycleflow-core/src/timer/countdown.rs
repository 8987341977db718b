//! Wall-clock-anchored countdown engine.
//!
//! Each run fixes an absolute end time and spawns a tokio task that polls it.
//! Remaining time is recomputed from the clock on every poll instead of being
//! decremented, so a late or skipped poll never accumulates drift and the
//! countdown cannot run past its true end.
//!
//! ## Messages
//!
//! ```text
//! Progress(n) ... Progress(n - k) ... Progress(0) -> Completed
//! ```
//!
//! Progress values for one run never increase and `Completed` is always the
//! last message of its run. Every message carries the [`RunId`] it belongs to
//! so a receiver can drop leftovers from a cancelled run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Default recompute period. Display granularity is whole seconds regardless.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Identifies one `start` of a [`CountdownEngine`].
pub type RunId = u64;

/// Source of "now" for the engine, in milliseconds.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> u64;
}

/// Wall clock (ms since the Unix epoch).
///
/// Keeps counting across process suspension, so a countdown resumed after
/// sleep reports the true remaining time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Monotonic clock backed by tokio's `Instant`.
///
/// Follows tokio's paused/advanced time, which makes countdowns testable
/// without real waiting.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Whole seconds left until `target_end_ms`, rounded up, never negative.
pub fn remaining_secs(target_end_ms: u64, now_ms: u64) -> u64 {
    target_end_ms.saturating_sub(now_ms).div_ceil(1000)
}

/// Message from a running countdown task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    Progress { run: RunId, remaining_secs: u64 },
    Completed { run: RunId },
}

impl CountdownEvent {
    pub fn run(&self) -> RunId {
        match self {
            CountdownEvent::Progress { run, .. } | CountdownEvent::Completed { run } => *run,
        }
    }
}

/// Drives at most one countdown task at a time.
///
/// Must be used from inside a tokio runtime; `start` spawns onto it.
pub struct CountdownEngine {
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    tx: mpsc::UnboundedSender<CountdownEvent>,
    task: Option<JoinHandle<()>>,
    last_run: RunId,
}

impl CountdownEngine {
    /// Create an engine and the receiver its messages arrive on.
    pub fn new(
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<CountdownEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let poll_interval = if poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            poll_interval
        };
        let engine = Self {
            clock,
            poll_interval,
            tx,
            task: None,
            last_run: 0,
        };
        (engine, rx)
    }

    /// Start a countdown ending `resume_from.unwrap_or(duration_secs)` seconds
    /// from now. Any previous run of this engine is cancelled first.
    ///
    /// A zero length completes on the first poll.
    pub fn start(&mut self, duration_secs: u64, resume_from: Option<u64>) -> RunId {
        self.stop();

        let secs = resume_from.unwrap_or(duration_secs);
        let target_end_ms = self
            .clock
            .now_ms()
            .saturating_add(secs.saturating_mul(1000));

        self.last_run += 1;
        let run = self.last_run;
        debug!(run, secs, target_end_ms, "countdown started");

        self.task = Some(tokio::spawn(poll_countdown(
            run,
            target_end_ms,
            Arc::clone(&self.clock),
            self.poll_interval,
            self.tx.clone(),
        )));
        run
    }

    /// Cancel the active run, if any. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(run = self.last_run, "countdown stopped");
        }
    }

    /// True while a run is still polling.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Drop for CountdownEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_countdown(
    run: RunId,
    target_end_ms: u64,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    tx: mpsc::UnboundedSender<CountdownEvent>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let remaining = remaining_secs(target_end_ms, clock.now_ms());
        if tx
            .send(CountdownEvent::Progress {
                run,
                remaining_secs: remaining,
            })
            .is_err()
        {
            return;
        }
        if remaining == 0 {
            let _ = tx.send(CountdownEvent::Completed { run });
            debug!(run, "countdown completed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine() -> (CountdownEngine, mpsc::UnboundedReceiver<CountdownEvent>) {
        CountdownEngine::new(Arc::new(MonotonicClock::new()), DEFAULT_POLL_INTERVAL)
    }

    /// Drain one run until its completion, returning every progress value.
    async fn drain(rx: &mut mpsc::UnboundedReceiver<CountdownEvent>, run: RunId) -> Vec<u64> {
        let mut seen = Vec::new();
        while let Some(msg) = rx.recv().await {
            match msg {
                CountdownEvent::Progress { run: r, remaining_secs } if r == run => {
                    seen.push(remaining_secs)
                }
                CountdownEvent::Completed { run: r } if r == run => break,
                _ => {}
            }
        }
        seen
    }

    #[test]
    fn remaining_rounds_up_to_whole_seconds() {
        assert_eq!(remaining_secs(10_000, 0), 10);
        assert_eq!(remaining_secs(10_000, 1), 10);
        assert_eq!(remaining_secs(10_000, 999), 10);
        assert_eq!(remaining_secs(10_000, 1_000), 9);
        assert_eq!(remaining_secs(10_000, 9_999), 1);
        assert_eq!(remaining_secs(10_000, 10_000), 0);
        assert_eq!(remaining_secs(10_000, 60_000), 0);
    }

    proptest! {
        #[test]
        fn remaining_is_bounded_and_non_increasing(
            duration in 0u64..100_000,
            a in 0u64..200_000_000,
            b in 0u64..200_000_000,
        ) {
            let target = duration * 1000;
            let (early, late) = if a <= b { (a, b) } else { (b, a) };
            let r_early = remaining_secs(target, early);
            let r_late = remaining_secs(target, late);
            prop_assert!(r_early <= duration);
            prop_assert!(r_late <= r_early);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_once_after_full_duration() {
        let (mut engine, mut rx) = engine();
        let started = Instant::now();
        let run = engine.start(3, None);

        let progress = drain(&mut rx, run).await;

        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(progress.first(), Some(&3));
        assert_eq!(progress.last(), Some(&0));
        assert!(progress.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(progress.iter().filter(|r| **r == 0).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_follows_completion() {
        let (mut engine, mut rx) = engine();
        let run = engine.start(1, None);
        drain(&mut rx, run).await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert!(!engine.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_from_uses_remaining_not_duration() {
        let (mut engine, mut rx) = engine();
        let started = Instant::now();
        let run = engine.start(1500, Some(2));
        let progress = drain(&mut rx, run).await;

        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(progress.first(), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_completes_immediately() {
        let (mut engine, mut rx) = engine();
        let run = engine.start(0, None);
        assert_eq!(
            rx.recv().await,
            Some(CountdownEvent::Progress {
                run,
                remaining_secs: 0
            })
        );
        assert_eq!(rx.recv().await, Some(CountdownEvent::Completed { run }));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_cancels_previous_run() {
        let (mut engine, mut rx) = engine();
        let first = engine.start(60, None);
        let second = engine.start(2, None);
        assert_ne!(first, second);

        let progress = drain(&mut rx, second).await;
        assert!(progress.iter().all(|r| *r <= 2));

        tokio::time::sleep(Duration::from_secs(120)).await;
        while let Ok(msg) = rx.try_recv() {
            assert_ne!(msg, CountdownEvent::Completed { run: first });
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let (mut engine, mut rx) = engine();
        engine.stop();
        let run = engine.start(10, None);
        engine.stop();
        engine.stop();

        tokio::time::sleep(Duration::from_secs(20)).await;
        while let Ok(msg) = rx.try_recv() {
            assert_ne!(msg, CountdownEvent::Completed { run });
        }
        assert!(!engine.is_active());
    }
}
