mod controller;
mod countdown;
mod notify;

pub use controller::TimerController;
pub use countdown::{
    remaining_secs, Clock, CountdownEngine, CountdownEvent, MonotonicClock, RunId, SystemClock,
    DEFAULT_POLL_INTERVAL,
};
pub use notify::{Notifier, NotifyError, Permission, SilentNotifier, TerminalNotifier};
