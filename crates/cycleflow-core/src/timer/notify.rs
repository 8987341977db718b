//! Best-effort completion side effects.
//!
//! Nothing here is allowed to block a phase change: callers log and drop
//! every [`NotifyError`].

use std::io::Write;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notifications are not available")]
    Unavailable,
    #[error("notification permission denied")]
    Denied,
    #[error("notification output failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Permission state for OS-level notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Default,
    Granted,
    Denied,
}

pub trait Notifier: Send + Sync {
    /// Ask for notification permission. Must be a no-op once decided.
    fn request_permission(&self) -> Result<Permission, NotifyError>;

    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError>;

    /// Short audible cue.
    fn play_tone(&self) -> Result<(), NotifyError>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn request_permission(&self) -> Result<Permission, NotifyError> {
        Ok(Permission::Denied)
    }

    fn notify(&self, _title: &str, _body: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Denied)
    }

    fn play_tone(&self) -> Result<(), NotifyError> {
        Err(NotifyError::Unavailable)
    }
}

/// Writes notifications to stderr and rings the terminal bell.
#[derive(Debug, Clone, Copy)]
pub struct TerminalNotifier {
    pub enabled: bool,
    pub sound: bool,
}

impl Notifier for TerminalNotifier {
    fn request_permission(&self) -> Result<Permission, NotifyError> {
        Ok(if self.enabled {
            Permission::Granted
        } else {
            Permission::Denied
        })
    }

    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        if !self.enabled {
            return Err(NotifyError::Denied);
        }
        let mut err = std::io::stderr().lock();
        writeln!(err, "\n*** {title} ***\n{body}")?;
        Ok(())
    }

    fn play_tone(&self) -> Result<(), NotifyError> {
        if !self.sound {
            return Err(NotifyError::Unavailable);
        }
        let mut err = std::io::stderr().lock();
        err.write_all(b"\x07")?;
        err.flush()?;
        Ok(())
    }
}
