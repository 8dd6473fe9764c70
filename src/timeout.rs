//! Bounded waits around blocking work.
//!
//! [`with_timeout`] runs its body on the calling thread with a deadline
//! installed for that thread. [`SystemExecutor`](crate::exec::SystemExecutor)
//! honours the deadline while it waits on a child: once it passes, the
//! child's process group is killed and reaped, and the spawn fails. Work
//! that never waits on a child is not interrupted; it is reported as timed
//! out when it returns late.
use std::cell::Cell;
#[cfg(unix)]
use std::time::Duration;
use std::time::Instant;

use crate::error::ProvisionError;
#[cfg(not(unix))]
use crate::platform::Os;

thread_local! {
    static DEADLINE: Cell<Option<Instant>> = const { Cell::new(None) };
    static EXPIRED: Cell<bool> = const { Cell::new(false) };
}

/// The deadline of the innermost active [`with_timeout`] on this thread.
#[must_use]
pub fn current_deadline() -> Option<Instant> {
    DEADLINE.with(Cell::get)
}

/// Record that a child was killed because the current deadline passed.
pub(crate) fn note_expired() {
    EXPIRED.with(|e| e.set(true));
}

/// Installs a deadline for the current thread and restores the previous
/// one on drop, including during unwinding.
struct DeadlineScope {
    previous: Option<Instant>,
    previous_expired: bool,
}

impl DeadlineScope {
    fn enter(deadline: Instant) -> Self {
        let previous = current_deadline();
        let effective = previous.map_or(deadline, |p| p.min(deadline));
        DEADLINE.with(|d| d.set(Some(effective)));
        let previous_expired = EXPIRED.with(|e| e.replace(false));
        Self {
            previous,
            previous_expired,
        }
    }

    fn expired(&self) -> bool {
        EXPIRED.with(Cell::get)
    }
}

impl Drop for DeadlineScope {
    fn drop(&mut self) {
        DEADLINE.with(|d| d.set(self.previous));
        EXPIRED.with(|e| e.set(self.previous_expired));
    }
}

/// Run `body` with a deadline `seconds` from now.
///
/// A child process still running at the deadline is killed before this
/// returns, and any working-directory scope inside `body` has already been
/// restored. A body that finishes in time has its value returned unchanged.
///
/// # Errors
///
/// Returns [`ProvisionError::TimeoutExceeded`] when a child was killed at
/// the deadline or `body` returned after it.
#[cfg(unix)]
pub fn with_timeout<T>(seconds: u64, body: impl FnOnce() -> T) -> Result<T, ProvisionError> {
    let deadline = Instant::now() + Duration::from_secs(seconds);
    let scope = DeadlineScope::enter(deadline);
    let value = body();
    let expired = scope.expired() || Instant::now() >= deadline;
    drop(scope);

    if expired {
        Err(ProvisionError::TimeoutExceeded { seconds })
    } else {
        Ok(value)
    }
}

/// Bounded waits are only available on Unix hosts.
///
/// # Errors
///
/// Always returns [`ProvisionError::UnsupportedPlatform`].
#[cfg(not(unix))]
pub fn with_timeout<T>(_seconds: u64, _body: impl FnOnce() -> T) -> Result<T, ProvisionError> {
    Err(ProvisionError::UnsupportedPlatform { os: Os::discover() })
}
